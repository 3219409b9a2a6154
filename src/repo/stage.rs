//! Staging: walk the working tree, apply ignore rules, store blobs, and
//! upsert index entries with canonical metadata.

use crate::{
    errors::GitError,
    internal::{
        index::{IndexEntry, ignore::IgnoreMatcher},
        object::{tree::TreeMode, types::ObjectType},
    },
    repo::Repository,
    vfs::{FileKind, FileStat},
};

/// Options for [`Repository::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Stage even paths the ignore rules would skip.
    pub force: bool,
    /// Only refresh paths that are already indexed.
    pub update_only: bool,
}

/// A path pattern matches itself, anything below it as a directory, or
/// everything for `.` / empty.
fn pattern_matches(patterns: &[String], path: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| {
        let p = p.trim_end_matches('/');
        p.is_empty() || p == "." || path == p || path.starts_with(&format!("{p}/"))
    })
}

impl Repository {
    /// Compile the repository's ignore rules from `.gitignore` at the
    /// working-tree root (absent file → only the built-in `.git` rule).
    pub(crate) async fn ignore_matcher(&self) -> Result<IgnoreMatcher, GitError> {
        match self.vfs.read_file(".gitignore").await {
            Ok(bytes) => Ok(IgnoreMatcher::from_content(&String::from_utf8_lossy(&bytes))),
            Err(GitError::NotFound(_)) => Ok(IgnoreMatcher::from_content("")),
            Err(err) => Err(err),
        }
    }

    /// Recursively collect every file path under the working tree,
    /// pruning ignored directories unless `force` is set.
    pub(crate) async fn walk_worktree(
        &self,
        matcher: &IgnoreMatcher,
        force: bool,
    ) -> Result<Vec<String>, GitError> {
        let mut files = Vec::new();
        let mut stack: Vec<String> = vec![String::new()];
        let mut visited = 0usize;

        while let Some(dir) = stack.pop() {
            self.check_cancelled()?;
            let names = self.vfs.read_dir(&dir).await?;
            for name in names {
                let path = if dir.is_empty() {
                    name.clone()
                } else {
                    format!("{dir}/{name}")
                };
                let stat = self
                    .vfs
                    .stat(&path)
                    .await?
                    .ok_or_else(|| GitError::NotFound(path.clone()))?;
                match stat.kind {
                    FileKind::Dir => {
                        if force || !matcher.is_ignored(&path, true) {
                            stack.push(path);
                        }
                    }
                    FileKind::File | FileKind::Symlink => {
                        if force || !matcher.is_ignored(&path, false) {
                            files.push(path);
                        }
                    }
                }
            }
            visited += 1;
            if visited % self.engine.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
        files.sort();
        Ok(files)
    }

    /// Build an index entry for one working-tree file, storing its blob
    /// if the object database does not hold it yet.
    pub(crate) async fn stage_file(
        &self,
        path: &str,
        stat: &FileStat,
    ) -> Result<IndexEntry, GitError> {
        let content = self.vfs.read_file(path).await?;
        let id = self.odb.put_raw(ObjectType::Blob, &content).await?;
        let mode = if stat.executable {
            TreeMode::Executable
        } else {
            TreeMode::Normal
        };
        let mut entry = IndexEntry::new(path.to_string(), mode.to_index_mode(), id);
        entry.ctime = stat.ctime;
        entry.mtime = stat.mtime;
        entry.size = stat.size as u32;
        Ok(entry)
    }

    /// Stage the files selected by `patterns`. Returns the paths staged.
    pub async fn add(
        &self,
        patterns: &[String],
        options: AddOptions,
    ) -> Result<Vec<String>, GitError> {
        let _guard = self.index_lock.lock().await;
        let matcher = self.ignore_matcher().await?;
        let mut index = self.read_index().await?;

        let mut staged = Vec::new();
        for path in self.walk_worktree(&matcher, options.force).await? {
            if !pattern_matches(patterns, &path) {
                continue;
            }
            if options.update_only && index.get(&path, 0).is_none() {
                continue;
            }
            let stat = self
                .vfs
                .stat(&path)
                .await?
                .ok_or_else(|| GitError::NotFound(path.clone()))?;
            let entry = self.stage_file(&path, &stat).await?;
            index.upsert(entry);
            staged.push(path);
        }

        self.write_index(&index).await?;
        tracing::debug!(count = staged.len(), "staged paths");
        Ok(staged)
    }

    /// Drop paths from the index without touching the working tree.
    pub async fn unstage(&self, paths: &[String]) -> Result<(), GitError> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        for path in paths {
            if !index.remove(path) {
                return Err(GitError::NotFound(format!("staged path {path}")));
            }
        }
        self.write_index(&index).await
    }
}
