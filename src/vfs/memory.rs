//! In-memory virtual filesystem used by unit and integration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{FileKind, FileStat, VirtualFileSystem, normalize_path};
use crate::errors::GitError;

struct MemFile {
    data: Vec<u8>,
    ctime: (u32, u32),
    mtime: (u32, u32),
}

/// Map-backed [`VirtualFileSystem`]. Directories are implicit: a
/// directory exists when any file lives under it, mirroring how the
/// engine itself never stores empty directories.
#[derive(Default)]
pub struct MemVfs {
    files: RwLock<BTreeMap<String, MemFile>>,
    clock: AtomicU32,
}

impl MemVfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic fake clock so successive writes get distinct mtimes.
    fn tick(&self) -> (u32, u32) {
        (self.clock.fetch_add(1, Ordering::Relaxed) + 1, 0)
    }

    fn is_dir(files: &BTreeMap<String, MemFile>, path: &str) -> bool {
        let prefix = format!("{path}/");
        files.keys().any(|k| k.starts_with(&prefix))
    }
}

#[async_trait]
impl VirtualFileSystem for MemVfs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, GitError> {
        let path = normalize_path(path)?;
        self.files
            .read()
            .await
            .get(&path)
            .map(|f| f.data.clone())
            .ok_or(GitError::NotFound(path))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), GitError> {
        let path = normalize_path(path)?;
        let now = self.tick();
        let mut files = self.files.write().await;
        match files.get_mut(&path) {
            Some(file) => {
                file.data = data.to_vec();
                file.mtime = now;
            }
            None => {
                files.insert(
                    path,
                    MemFile {
                        data: data.to_vec(),
                        ctime: now,
                        mtime: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn mkdir(&self, _path: &str, _recursive: bool) -> Result<(), GitError> {
        // Directories materialize with their first file.
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>, GitError> {
        let files = self.files.read().await;
        let prefix = if path.is_empty() || path == "." {
            String::new()
        } else {
            format!("{}/", normalize_path(path)?)
        };
        let mut names: Vec<String> = files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|rest| match rest.split_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => rest.to_string(),
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn unlink(&self, path: &str) -> Result<(), GitError> {
        let path = normalize_path(path)?;
        self.files.write().await.remove(&path);
        Ok(())
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> Result<(), GitError> {
        let path = normalize_path(path)?;
        let mut files = self.files.write().await;
        let prefix = format!("{path}/");
        if !recursive && files.keys().any(|k| k.starts_with(&prefix)) {
            return Err(GitError::InvalidArgument(format!(
                "directory `{path}` not empty"
            )));
        }
        files.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>, GitError> {
        let path = normalize_path(path)?;
        let files = self.files.read().await;
        if let Some(file) = files.get(&path) {
            return Ok(Some(FileStat {
                kind: FileKind::File,
                size: file.data.len() as u64,
                ctime: file.ctime,
                mtime: file.mtime,
                executable: false,
            }));
        }
        if Self::is_dir(&files, &path) {
            return Ok(Some(FileStat {
                kind: FileKind::Dir,
                size: 0,
                ctime: (0, 0),
                mtime: (0, 0),
                executable: false,
            }));
        }
        Ok(None)
    }
}
