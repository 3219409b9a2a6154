//! Diff rendering: path-level change lists with unified-text hunks,
//! between two commits or between the index and the working tree. Only
//! the surface commit, merge, and status need.

use std::collections::BTreeSet;

use similar::TextDiff;

use crate::{errors::GitError, hash::ObjectHash, repo::Repository};

/// How one path changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

/// One changed path with a rendered unified diff of its content.
#[derive(Debug, Clone)]
pub struct FileDiff {
    pub path: String,
    pub kind: ChangeKind,
    /// Unified diff text; empty for binary-looking content.
    pub unified: String,
}

fn render_unified(path: &str, old: &[u8], new: &[u8]) -> String {
    // Refuse to render content that is not mostly text.
    if old.contains(&0) || new.contains(&0) {
        return String::new();
    }
    let old_text = String::from_utf8_lossy(old).to_string();
    let new_text = String::from_utf8_lossy(new).to_string();
    TextDiff::from_lines(&old_text, &new_text)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

impl Repository {
    /// Paths that differ between two commits' trees, with content hunks.
    pub async fn diff_commits(
        &self,
        old: ObjectHash,
        new: ObjectHash,
    ) -> Result<Vec<FileDiff>, GitError> {
        let old_commit = self.odb.get_commit(old).await?;
        let new_commit = self.odb.get_commit(new).await?;
        let old_flat = self.flatten_tree(old_commit.tree_id).await?;
        let new_flat = self.flatten_tree(new_commit.tree_id).await?;

        let mut paths: BTreeSet<&String> = old_flat.keys().collect();
        paths.extend(new_flat.keys());

        let mut out = Vec::new();
        for path in paths {
            self.check_cancelled()?;
            match (old_flat.get(path), new_flat.get(path)) {
                (Some(a), Some(b)) if a == b => {}
                (Some((_, old_id)), Some((_, new_id))) => {
                    let old_blob = self.odb.get_blob(*old_id).await?;
                    let new_blob = self.odb.get_blob(*new_id).await?;
                    out.push(FileDiff {
                        path: path.clone(),
                        kind: ChangeKind::Modified,
                        unified: render_unified(path, &old_blob.data, &new_blob.data),
                    });
                }
                (None, Some((_, new_id))) => {
                    let new_blob = self.odb.get_blob(*new_id).await?;
                    out.push(FileDiff {
                        path: path.clone(),
                        kind: ChangeKind::Added,
                        unified: render_unified(path, b"", &new_blob.data),
                    });
                }
                (Some((_, old_id)), None) => {
                    let old_blob = self.odb.get_blob(*old_id).await?;
                    out.push(FileDiff {
                        path: path.clone(),
                        kind: ChangeKind::Deleted,
                        unified: render_unified(path, &old_blob.data, b""),
                    });
                }
                (None, None) => unreachable!("path came from one of the trees"),
            }
        }
        Ok(out)
    }

    /// Unstaged changes: index blob versus working-tree content.
    pub async fn diff_worktree(&self) -> Result<Vec<FileDiff>, GitError> {
        let index = self.read_index().await?;
        let mut out = Vec::new();
        for entry in index.entries() {
            if entry.stage != 0 {
                continue;
            }
            self.check_cancelled()?;
            let staged = self.odb.get_blob(entry.id).await?;
            match self.vfs.read_file(&entry.path).await {
                Ok(current) => {
                    if current != staged.data {
                        out.push(FileDiff {
                            path: entry.path.clone(),
                            kind: ChangeKind::Modified,
                            unified: render_unified(&entry.path, &staged.data, &current),
                        });
                    }
                }
                Err(GitError::NotFound(_)) => {
                    out.push(FileDiff {
                        path: entry.path.clone(),
                        kind: ChangeKind::Deleted,
                        unified: render_unified(&entry.path, &staged.data, b""),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        repo::{InitOptions, Repository, commit::CommitOptions, stage::AddOptions},
        store::MemoryStore,
        vfs::{MemVfs, VirtualFileSystem},
    };

    async fn two_commits() -> (Repository, ObjectHash, ObjectHash) {
        let vfs = Arc::new(MemVfs::new());
        let repo = Repository::init(
            Arc::new(MemoryStore::new()),
            vfs.clone(),
            InitOptions::default(),
        )
        .await
        .unwrap();
        repo.set_user("Ada", "a@x").await.unwrap();

        vfs.write_file("kept.txt", b"same\n").await.unwrap();
        vfs.write_file("changed.txt", b"old line\n").await.unwrap();
        vfs.write_file("removed.txt", b"bye\n").await.unwrap();
        repo.add(&[], AddOptions::default()).await.unwrap();
        let first = repo.commit("one", CommitOptions::default()).await.unwrap();

        vfs.write_file("changed.txt", b"new line\n").await.unwrap();
        vfs.unlink("removed.txt").await.unwrap();
        vfs.write_file("added.txt", b"hi\n").await.unwrap();
        repo.add(&[], AddOptions::default()).await.unwrap();
        repo.unstage(&["removed.txt".to_string()]).await.unwrap();
        let second = repo.commit("two", CommitOptions::default()).await.unwrap();

        (repo, first.id, second.id)
    }

    /// Commit-to-commit diff classifies adds, deletes, and edits, and
    /// leaves untouched paths out.
    #[tokio::test]
    async fn commit_diff() {
        let (repo, first, second) = two_commits().await;
        let diffs = repo.diff_commits(first, second).await.unwrap();

        let by_path: std::collections::BTreeMap<&str, &FileDiff> =
            diffs.iter().map(|d| (d.path.as_str(), d)).collect();
        assert_eq!(by_path["added.txt"].kind, ChangeKind::Added);
        assert_eq!(by_path["removed.txt"].kind, ChangeKind::Deleted);
        assert_eq!(by_path["changed.txt"].kind, ChangeKind::Modified);
        assert!(!by_path.contains_key("kept.txt"));

        assert!(by_path["changed.txt"].unified.contains("-old line"));
        assert!(by_path["changed.txt"].unified.contains("+new line"));
    }

    /// Worktree diff reports unstaged edits only.
    #[tokio::test]
    async fn worktree_diff() {
        let (repo, _first, _second) = two_commits().await;
        assert!(repo.diff_worktree().await.unwrap().is_empty());

        repo.vfs
            .write_file("changed.txt", b"dirty edit\n")
            .await
            .unwrap();
        let diffs = repo.diff_worktree().await.unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "changed.txt");
        assert_eq!(diffs[0].kind, ChangeKind::Modified);
    }
}
