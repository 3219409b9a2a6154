//! Reference namespace over the storage contract: branches, tags,
//! remote-tracking refs, and a symbolic or detached `HEAD`.
//!
//! Updates take an expected current value and fail with `RefRaceLost`
//! when the observed value differs, giving callers optimistic
//! concurrency even though no cross-process locking exists. A ref update
//! is a single storage put, so observers never see partial states.

use std::str::FromStr;
use std::sync::Arc;

use crate::{errors::GitError, hash::ObjectHash, store::BlobStore};

pub const HEAD: &str = "HEAD";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";

/// What `HEAD` points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// `ref: refs/heads/<name>`; the target ref may not exist yet in the
    /// initial-commit state.
    Symbolic(String),
    /// Detached at a commit id.
    Detached(ObjectHash),
}

/// Expectation for a compare-and-set update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefExpect {
    /// The ref must not exist yet.
    MustNotExist,
    /// The ref must currently hold exactly this id.
    Value(ObjectHash),
    /// No check; used by forced updates and remote-tracking overwrites.
    Any,
}

/// Reference store bound to one repository's storage.
pub struct RefStore {
    store: Arc<dyn BlobStore>,
}

/// Reject names that cannot be valid refs: empty segments, `..`, control
/// or space characters, or a leading dash.
pub fn validate_ref_name(name: &str) -> Result<(), GitError> {
    let bad = name.is_empty()
        || name.starts_with('-')
        || name.ends_with('/')
        || name.ends_with(".lock")
        || name.contains("..")
        || name.split('/').any(|seg| seg.is_empty())
        || name
            .chars()
            .any(|c| c.is_ascii_control() || c == ' ' || c == '~' || c == '^' || c == ':');
    if bad {
        return Err(GitError::InvalidRef(name.to_string()));
    }
    Ok(())
}

impl RefStore {
    pub fn new(store: Arc<dyn BlobStore>) -> RefStore {
        RefStore { store }
    }

    /// Raw value of a ref, or `None` when absent.
    pub async fn read(&self, name: &str) -> Result<Option<ObjectHash>, GitError> {
        match self.store.get(name).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| GitError::ConversionError(e.to_string()))?;
                let id = ObjectHash::from_str(text.trim())
                    .map_err(|_| GitError::InvalidRef(format!("{name}: `{}`", text.trim())))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Compare-and-set update. `new = None` deletes the ref. The check
    /// and write are not a kernel transaction; the convention is that
    /// racing writers re-read and the loser observes `RefRaceLost` on
    /// its next attempt.
    pub async fn update(
        &self,
        name: &str,
        expect: RefExpect,
        new: Option<ObjectHash>,
    ) -> Result<(), GitError> {
        validate_ref_name(name)?;
        let current = self.read(name).await?;
        match (expect, current) {
            (RefExpect::MustNotExist, Some(_)) => {
                return Err(GitError::RefRaceLost(name.to_string()));
            }
            (RefExpect::Value(expected), Some(actual)) if expected != actual => {
                return Err(GitError::RefRaceLost(name.to_string()));
            }
            (RefExpect::Value(_), None) => {
                return Err(GitError::RefRaceLost(name.to_string()));
            }
            _ => {}
        }
        match new {
            Some(id) => {
                self.store
                    .put(name, format!("{id}\n").as_bytes())
                    .await?;
            }
            None => self.store.delete(name).await?,
        }
        Ok(())
    }

    /// All refs under `prefix` as (name, id) pairs, sorted by name.
    pub async fn list(&self, prefix: &str) -> Result<Vec<(String, ObjectHash)>, GitError> {
        let mut out = Vec::new();
        let mut keys = self.store.list(prefix).await?;
        keys.sort();
        for key in keys {
            if let Some(id) = self.read(&key).await? {
                out.push((key, id));
            }
        }
        Ok(out)
    }

    /// Current `HEAD` state. A missing `HEAD` is a corrupt repository.
    pub async fn head(&self) -> Result<HeadState, GitError> {
        let bytes = self
            .store
            .get(HEAD)
            .await?
            .ok_or_else(|| GitError::Corrupt("repository has no HEAD".to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| GitError::ConversionError(e.to_string()))?;
        let text = text.trim();
        match text.strip_prefix("ref: ") {
            Some(target) => Ok(HeadState::Symbolic(target.to_string())),
            None => Ok(HeadState::Detached(ObjectHash::from_str(text).map_err(
                |_| GitError::InvalidRef(format!("HEAD: `{text}`")),
            )?)),
        }
    }

    /// Point `HEAD` at a branch ref symbolically.
    pub async fn set_head_symbolic(&self, target: &str) -> Result<(), GitError> {
        validate_ref_name(target)?;
        self.store
            .put(HEAD, format!("ref: {target}\n").as_bytes())
            .await
    }

    /// Detach `HEAD` at a commit.
    pub async fn set_head_detached(&self, id: ObjectHash) -> Result<(), GitError> {
        self.store.put(HEAD, format!("{id}\n").as_bytes()).await
    }

    /// Resolve `HEAD` (following one symbolic hop) to a commit id.
    /// `None` in the initial-commit state where the branch has no tip.
    pub async fn resolve_head(&self) -> Result<Option<ObjectHash>, GitError> {
        match self.head().await? {
            HeadState::Symbolic(target) => self.read(&target).await,
            HeadState::Detached(id) => Ok(Some(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{hash::HashKind, store::MemoryStore};

    fn id(n: u8) -> ObjectHash {
        ObjectHash::compute(HashKind::Sha1, &[n])
    }

    /// Create, read, update with expected value, delete.
    #[tokio::test]
    async fn cas_lifecycle() {
        let refs = RefStore::new(Arc::new(MemoryStore::new()));
        refs.update("refs/heads/main", RefExpect::MustNotExist, Some(id(1)))
            .await
            .unwrap();
        assert_eq!(refs.read("refs/heads/main").await.unwrap(), Some(id(1)));

        refs.update("refs/heads/main", RefExpect::Value(id(1)), Some(id(2)))
            .await
            .unwrap();
        assert_eq!(refs.read("refs/heads/main").await.unwrap(), Some(id(2)));

        refs.update("refs/heads/main", RefExpect::Any, None)
            .await
            .unwrap();
        assert_eq!(refs.read("refs/heads/main").await.unwrap(), None);
    }

    /// Stale expectations lose the race.
    #[tokio::test]
    async fn stale_expectation_loses() {
        let refs = RefStore::new(Arc::new(MemoryStore::new()));
        refs.update("refs/heads/main", RefExpect::MustNotExist, Some(id(1)))
            .await
            .unwrap();

        let err = refs
            .update("refs/heads/main", RefExpect::MustNotExist, Some(id(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::RefRaceLost(_)));

        let err = refs
            .update("refs/heads/main", RefExpect::Value(id(9)), Some(id(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::RefRaceLost(_)));

        let err = refs
            .update("refs/heads/gone", RefExpect::Value(id(1)), Some(id(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::RefRaceLost(_)));
    }

    /// HEAD round-trips through symbolic and detached states.
    #[tokio::test]
    async fn head_states() {
        let refs = RefStore::new(Arc::new(MemoryStore::new()));
        refs.set_head_symbolic("refs/heads/main").await.unwrap();
        assert_eq!(
            refs.head().await.unwrap(),
            HeadState::Symbolic("refs/heads/main".to_string())
        );
        // Initial-commit state: symbolic target absent.
        assert_eq!(refs.resolve_head().await.unwrap(), None);

        refs.update("refs/heads/main", RefExpect::MustNotExist, Some(id(3)))
            .await
            .unwrap();
        assert_eq!(refs.resolve_head().await.unwrap(), Some(id(3)));

        refs.set_head_detached(id(4)).await.unwrap();
        assert_eq!(refs.head().await.unwrap(), HeadState::Detached(id(4)));
    }

    /// Prefix listing sees only the requested namespace.
    #[tokio::test]
    async fn prefix_listing() {
        let refs = RefStore::new(Arc::new(MemoryStore::new()));
        for (name, n) in [
            ("refs/heads/main", 1u8),
            ("refs/heads/topic", 2),
            ("refs/tags/v1", 3),
        ] {
            refs.update(name, RefExpect::MustNotExist, Some(id(n)))
                .await
                .unwrap();
        }
        let heads = refs.list(HEADS_PREFIX).await.unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].0, "refs/heads/main");
        assert_eq!(refs.list(TAGS_PREFIX).await.unwrap().len(), 1);
    }

    /// Malformed names are rejected before touching storage.
    #[tokio::test]
    async fn name_validation() {
        let refs = RefStore::new(Arc::new(MemoryStore::new()));
        for bad in ["", "refs/heads/a b", "refs//x", "refs/heads/..", "-lead"] {
            let err = refs
                .update(bad, RefExpect::Any, Some(id(1)))
                .await
                .unwrap_err();
            assert!(matches!(err, GitError::InvalidRef(_)), "{bad}");
        }
    }
}
