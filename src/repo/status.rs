//! Status: classify every path across the working tree, the index, and
//! the `HEAD` tree.

use std::collections::BTreeMap;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::types::ObjectType,
    repo::Repository,
};

/// Classification of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// In the working tree only, and not ignored.
    Untracked,
    /// Identical across working tree, index, and `HEAD`.
    Unmodified,
    /// Working tree differs from the index.
    ModifiedNotStaged,
    /// Index differs from `HEAD` for an existing path.
    Staged,
    /// In the index but not in `HEAD`.
    Added,
    /// Gone from the index (or working tree) but present in `HEAD`.
    Deleted,
    /// Staged delete + staged add of identical content.
    Renamed { from: String },
    /// Carrying conflict stage entries from an unresolved merge.
    Conflicted,
}

/// Full status report keyed by path.
#[derive(Debug, Default)]
pub struct StatusReport {
    pub entries: BTreeMap<String, FileStatus>,
}

impl StatusReport {
    /// True when nothing differs and nothing is untracked.
    pub fn is_clean(&self) -> bool {
        self.entries
            .values()
            .all(|s| matches!(s, FileStatus::Unmodified))
    }

    pub fn of(&self, path: &str) -> Option<&FileStatus> {
        self.entries.get(path)
    }
}

impl Repository {
    /// Walk worktree, index, and `HEAD` tree and classify each path.
    /// Size and mtime are the fast path; on disagreement the file is
    /// re-hashed before being called modified.
    pub async fn status(&self) -> Result<StatusReport, GitError> {
        let index = self.read_index().await?;
        let head_flat = match self.head_commit().await? {
            Some(commit) => self.flatten_tree(commit.tree_id).await?,
            None => BTreeMap::new(),
        };
        let matcher = self.ignore_matcher().await?;
        let worktree = self.walk_worktree(&matcher, false).await?;
        let worktree_set: std::collections::BTreeSet<String> = worktree.into_iter().collect();

        let mut report = StatusReport::default();

        for path in index.conflicted_paths() {
            report.entries.insert(path, FileStatus::Conflicted);
        }

        // Index versus HEAD (staged changes) and versus worktree.
        for entry in index.entries() {
            if entry.stage != 0 || report.entries.contains_key(&entry.path) {
                continue;
            }
            let staged_vs_head = match head_flat.get(&entry.path) {
                None => Some(FileStatus::Added),
                Some((_, head_id)) if *head_id != entry.id => Some(FileStatus::Staged),
                Some(_) => None,
            };

            // The walk prunes ignored paths, but a tracked file stays
            // tracked even when an ignore rule later matches it.
            let on_disk = worktree_set.contains(&entry.path)
                || self.vfs.stat(&entry.path).await?.is_some();
            let wt_differs = if on_disk {
                self.worktree_differs(&entry.path, entry).await?
            } else {
                // Tracked file deleted from the working tree.
                report.entries.insert(entry.path.clone(), FileStatus::Deleted);
                continue;
            };

            let status = if wt_differs {
                FileStatus::ModifiedNotStaged
            } else {
                staged_vs_head.unwrap_or(FileStatus::Unmodified)
            };
            report.entries.insert(entry.path.clone(), status);
        }

        // HEAD paths missing from the index: staged deletions.
        for path in head_flat.keys() {
            if index.get(path, 0).is_none() && !report.entries.contains_key(path) {
                report.entries.insert(path.clone(), FileStatus::Deleted);
            }
        }

        // Worktree files the index knows nothing about.
        for path in &worktree_set {
            if index.get(path, 0).is_none()
                && !index.entries().iter().any(|e| &e.path == path)
                && !report.entries.contains_key(path)
            {
                report.entries.insert(path.clone(), FileStatus::Untracked);
            }
        }

        // Rename detection: a staged add whose blob matches a staged
        // delete is one move.
        let added: Vec<(String, ObjectHash)> = report
            .entries
            .iter()
            .filter(|(_, s)| matches!(s, FileStatus::Added))
            .filter_map(|(p, _)| index.get(p, 0).map(|e| (p.clone(), e.id)))
            .collect();
        for (new_path, id) in added {
            let moved_from = report
                .entries
                .iter()
                .filter(|(_, s)| matches!(s, FileStatus::Deleted))
                .find(|(old, _)| head_flat.get(*old).is_some_and(|(_, hid)| *hid == id))
                .map(|(old, _)| old.clone());
            if let Some(from) = moved_from {
                report.entries.remove(&from);
                report
                    .entries
                    .insert(new_path, FileStatus::Renamed { from });
            }
        }

        Ok(report)
    }

    /// Does the working-tree file differ from its index entry? Cheap
    /// size/mtime comparison first; re-hash content only on suspicion.
    async fn worktree_differs(
        &self,
        path: &str,
        entry: &crate::internal::index::IndexEntry,
    ) -> Result<bool, GitError> {
        let stat = self
            .vfs
            .stat(path)
            .await?
            .ok_or_else(|| GitError::NotFound(path.to_string()))?;
        if stat.size as u32 == entry.size && stat.mtime == entry.mtime {
            return Ok(false);
        }
        let content = self.vfs.read_file(path).await?;
        let actual = ObjectHash::from_type_and_data(self.kind, ObjectType::Blob, &content);
        Ok(actual != entry.id)
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

    async fn repo_with_commit() -> (Repository, Arc<MemVfs>) {
        let vfs = Arc::new(MemVfs::new());
        let repo = Repository::init(
            Arc::new(MemoryStore::new()),
            vfs.clone(),
            InitOptions::default(),
        )
        .await
        .unwrap();
        repo.set_user("Ada", "a@x").await.unwrap();
        vfs.write_file("README", b"hello\n").await.unwrap();
        repo.add(&[], AddOptions::default()).await.unwrap();
        repo.commit("init", CommitOptions::default()).await.unwrap();
        (repo, vfs)
    }

    /// After committing everything the status is clean.
    #[tokio::test]
    async fn clean_after_commit() {
        let (repo, _vfs) = repo_with_commit().await;
        let report = repo.status().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.of("README"), Some(&FileStatus::Unmodified));
    }

    /// The full classification spread.
    #[tokio::test]
    async fn classifications() {
        let (repo, vfs) = repo_with_commit().await;

        vfs.write_file("untracked.txt", b"new").await.unwrap();
        vfs.write_file("README", b"hello\nworld\n").await.unwrap();

        vfs.write_file("staged-new", b"staged").await.unwrap();
        repo.add(&["staged-new".to_string()], AddOptions::default())
            .await
            .unwrap();

        let report = repo.status().await.unwrap();
        assert_eq!(report.of("untracked.txt"), Some(&FileStatus::Untracked));
        assert_eq!(report.of("README"), Some(&FileStatus::ModifiedNotStaged));
        assert_eq!(report.of("staged-new"), Some(&FileStatus::Added));
        assert!(!report.is_clean());
    }

    /// Staged modification reports Staged; deleting the worktree file
    /// of a tracked path reports Deleted.
    #[tokio::test]
    async fn staged_and_deleted() {
        let (repo, vfs) = repo_with_commit().await;

        vfs.write_file("README", b"restaged\n").await.unwrap();
        repo.add(&[], AddOptions::default()).await.unwrap();
        let report = repo.status().await.unwrap();
        assert_eq!(report.of("README"), Some(&FileStatus::Staged));

        vfs.unlink("README").await.unwrap();
        let report = repo.status().await.unwrap();
        assert_eq!(report.of("README"), Some(&FileStatus::Deleted));
    }

    /// A same-content move shows up as one rename.
    #[tokio::test]
    async fn rename_detection() {
        let (repo, vfs) = repo_with_commit().await;
        let content = vfs.read_file("README").await.unwrap();
        vfs.unlink("README").await.unwrap();
        vfs.write_file("README.md", &content).await.unwrap();
        repo.add(&[], AddOptions::default()).await.unwrap();
        repo.unstage(&["README".to_string()]).await.unwrap();

        let report = repo.status().await.unwrap();
        assert_eq!(
            report.of("README.md"),
            Some(&FileStatus::Renamed {
                from: "README".to_string()
            })
        );
        assert_eq!(report.of("README"), None);
    }

    /// mtime-equal files skip re-hashing but hash catches real changes
    /// behind a same-size rewrite.
    #[tokio::test]
    async fn rehash_on_metadata_mismatch() {
        let (repo, vfs) = repo_with_commit().await;
        // Same size, new mtime → re-hash → different content detected.
        vfs.write_file("README", b"hellp\n").await.unwrap();
        let report = repo.status().await.unwrap();
        assert_eq!(report.of("README"), Some(&FileStatus::ModifiedNotStaged));
    }
}
