//! In-memory storage backend used by unit and integration tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobStore, StoreQuota};
use crate::errors::GitError;

/// `BlobStore` over a `BTreeMap`; the sorted map keeps `list` output
/// stable, which the tests rely on for determinism.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    /// Optional byte budget; writes past it fail with `QuotaExceeded`.
    capacity: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once `capacity` bytes are held.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity: Some(capacity),
        }
    }

    async fn used(&self) -> u64 {
        self.entries
            .read()
            .await
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GitError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), GitError> {
        if let Some(capacity) = self.capacity {
            let used = self.used().await;
            if used + value.len() as u64 > capacity {
                return Err(GitError::QuotaExceeded(format!(
                    "{} of {} bytes used",
                    used, capacity
                )));
            }
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), GitError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, GitError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<(), GitError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn quota(&self) -> Result<StoreQuota, GitError> {
        match self.capacity {
            Some(total) => Ok(StoreQuota {
                used: self.used().await,
                total,
            }),
            None => Err(GitError::NotSupported("quota".to_string())),
        }
    }
}
