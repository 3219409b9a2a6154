//! Storage contract: the only persistence primitive the engine uses.
//!
//! Every byte the repository owns (objects, refs, index, config, state
//! markers) flows through [`BlobStore`]. Keys are opaque UTF-8 strings
//! chosen by the engine; backends make no ordering guarantees across
//! concurrent operations.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::errors::GitError;

/// Space accounting for backends that can report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreQuota {
    pub used: u64,
    pub total: u64,
}

/// Abstract mapping from opaque keys to byte blobs.
///
/// All operations are asynchronous and may fail with `NotFound`,
/// `QuotaExceeded`, `NotSupported`, or `Backend`. Implementations
/// (in-memory, browser key/value database, origin-private filesystem)
/// live outside the engine; [`MemoryStore`] ships for tests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the value at `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GitError>;

    /// Store `value` at `key`, replacing any existing value.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), GitError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), GitError>;

    /// Existence check without fetching the value.
    async fn exists(&self, key: &str) -> Result<bool, GitError>;

    /// All keys starting with `prefix`, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, GitError>;

    /// Drop every key. Used by pack round-trip tooling and tests.
    async fn clear(&self) -> Result<(), GitError>;

    /// Space accounting; backends without it report `NotSupported`.
    async fn quota(&self) -> Result<StoreQuota, GitError> {
        Err(GitError::NotSupported("quota".to_string()))
    }
}
