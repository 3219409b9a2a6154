//! The repository handle: storage adapter, virtual filesystem, hash
//! width, object database, refs, and configuration, with the operation
//! surface (init, add, commit, status, log, diff, branch, checkout,
//! merge, remotes) spread over the submodules.
//!
//! There is no global mutable state; everything an operation needs
//! hangs off this handle.

pub mod checkout;
pub mod commit;
pub mod diff;
pub mod merge;
pub mod remote;
pub mod stage;
pub mod status;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, EngineConfig},
    errors::GitError,
    hash::{HashKind, ObjectHash},
    internal::{
        index::Index,
        object::{
            GitObject, ObjectTrait,
            commit::Commit,
            signature::{Signature, SignatureRole},
            tag::Tag,
            tree::TreeMode,
            types::ObjectType,
        },
    },
    odb::ObjectDatabase,
    refs::{HEADS_PREFIX, HeadState, RefExpect, RefStore, TAGS_PREFIX, validate_ref_name},
    store::BlobStore,
    vfs::VirtualFileSystem,
};

/// Storage keys for repository state beyond objects and refs.
pub(crate) const KEY_CONFIG: &str = "config";
pub(crate) const KEY_INDEX: &str = "index";
pub(crate) const KEY_MERGE_HEAD: &str = "MERGE_HEAD";
pub(crate) const KEY_MERGE_MSG: &str = "MERGE_MSG";
pub(crate) const KEY_ORIG_HEAD: &str = "ORIG_HEAD";
pub(crate) const KEY_SHALLOW: &str = "shallow";

/// Options for creating a fresh repository.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub default_branch: String,
    pub hash: HashKind,
    pub bare: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            hash: HashKind::Sha1,
            bare: false,
        }
    }
}

/// A repository bound to one storage backend and one working tree.
pub struct Repository {
    pub(crate) store: Arc<dyn BlobStore>,
    pub(crate) vfs: Arc<dyn VirtualFileSystem>,
    pub(crate) kind: HashKind,
    pub(crate) odb: ObjectDatabase,
    pub(crate) refs: RefStore,
    pub(crate) engine: EngineConfig,
    config: tokio::sync::RwLock<Config>,
    /// Advisory serialization of index-mutating operations. A software
    /// convention, not a kernel lock.
    pub(crate) index_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("kind", &self.kind)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Initialize a new repository: `HEAD` pointing at the default
    /// branch and a `config` recording hash algorithm and bareness.
    pub async fn init(
        store: Arc<dyn BlobStore>,
        vfs: Arc<dyn VirtualFileSystem>,
        options: InitOptions,
    ) -> Result<Repository, GitError> {
        if store.exists("HEAD").await? {
            return Err(GitError::AlreadyExists("repository".to_string()));
        }
        validate_ref_name(&options.default_branch)?;

        let mut config = Config::new();
        config.set("core", None, "hashAlgorithm", options.hash.as_str());
        config.set("core", None, "bare", if options.bare { "true" } else { "false" });
        store.put(KEY_CONFIG, config.serialize().as_bytes()).await?;
        store
            .put(
                "HEAD",
                format!("ref: {HEADS_PREFIX}{}\n", options.default_branch).as_bytes(),
            )
            .await?;

        tracing::debug!(branch = %options.default_branch, hash = %options.hash, "initialized repository");
        Self::open(store, vfs).await
    }

    /// Open an existing repository, reading the hash width from config.
    pub async fn open(
        store: Arc<dyn BlobStore>,
        vfs: Arc<dyn VirtualFileSystem>,
    ) -> Result<Repository, GitError> {
        let config_bytes = store
            .get(KEY_CONFIG)
            .await?
            .ok_or_else(|| GitError::NotFound("repository config".to_string()))?;
        let config_text = String::from_utf8(config_bytes)
            .map_err(|e| GitError::ConversionError(e.to_string()))?;
        let config = Config::parse(&config_text)?;
        let kind = config.hash_kind()?;
        let engine = EngineConfig::default();

        Ok(Repository {
            odb: ObjectDatabase::new(
                store.clone(),
                kind,
                engine.object_cache_entries,
                engine.yield_every,
            ),
            refs: RefStore::new(store.clone()),
            kind,
            vfs,
            engine,
            config: tokio::sync::RwLock::new(config),
            index_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            store,
        })
    }

    pub fn hash_kind(&self) -> HashKind {
        self.kind
    }

    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    /// Token observed at every suspension point; cancelling it aborts
    /// in-flight operations with `Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), GitError> {
        if self.cancel.is_cancelled() {
            return Err(GitError::Cancelled);
        }
        Ok(())
    }

    // ---- configuration -------------------------------------------------

    /// Run a closure over a mutable config and persist the result.
    pub async fn update_config<F>(&self, mutate: F) -> Result<(), GitError>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.config.write().await;
        mutate(&mut config);
        self.store
            .put(KEY_CONFIG, config.serialize().as_bytes())
            .await
    }

    /// Read a snapshot of the current config.
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Convenience for the `user.*` keys commit signatures fall back to.
    pub async fn set_user(&self, name: &str, email: &str) -> Result<(), GitError> {
        self.update_config(|c| {
            c.set("user", None, "name", name);
            c.set("user", None, "email", email);
        })
        .await
    }

    /// Signature from explicit values or `user.*` config.
    pub(crate) async fn signature(
        &self,
        role: SignatureRole,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Signature, GitError> {
        let config = self.config.read().await;
        let (cfg_name, cfg_email) = config.user();
        let name = name
            .or(cfg_name)
            .ok_or_else(|| GitError::InvalidConfig("user.name not set".to_string()))?;
        let email = email
            .or(cfg_email)
            .ok_or_else(|| GitError::InvalidConfig("user.email not set".to_string()))?;
        Ok(Signature::now(role, name.to_string(), email.to_string()))
    }

    // ---- index ---------------------------------------------------------

    /// Current staging index; empty before the first `add`.
    pub async fn read_index(&self) -> Result<Index, GitError> {
        match self.store.get(KEY_INDEX).await? {
            Some(bytes) => Index::parse(self.kind, &bytes),
            None => Ok(Index::new()),
        }
    }

    pub(crate) async fn write_index(&self, index: &Index) -> Result<(), GitError> {
        self.store
            .put(KEY_INDEX, &index.serialize(self.kind)?)
            .await
    }

    // ---- HEAD and branches ---------------------------------------------

    /// Branch name `HEAD` points at, or `None` when detached.
    pub async fn current_branch(&self) -> Result<Option<String>, GitError> {
        match self.refs.head().await? {
            HeadState::Symbolic(target) => {
                Ok(target.strip_prefix(HEADS_PREFIX).map(|s| s.to_string()))
            }
            HeadState::Detached(_) => Ok(None),
        }
    }

    /// The commit `HEAD` resolves to; `None` before the first commit.
    pub async fn head_commit(&self) -> Result<Option<Commit>, GitError> {
        match self.refs.resolve_head().await? {
            Some(id) => Ok(Some(self.odb.get_commit(id).await?)),
            None => Ok(None),
        }
    }

    /// Create a branch at `target` (default: current HEAD commit).
    pub async fn create_branch(
        &self,
        name: &str,
        target: Option<ObjectHash>,
    ) -> Result<(), GitError> {
        let full = format!("{HEADS_PREFIX}{name}");
        let target = match target {
            Some(id) => id,
            None => self
                .refs
                .resolve_head()
                .await?
                .ok_or_else(|| GitError::NotFound("HEAD has no commit yet".to_string()))?,
        };
        // Creation must not clobber an existing branch.
        self.refs
            .update(&full, RefExpect::MustNotExist, Some(target))
            .await
            .map_err(|e| match e {
                GitError::RefRaceLost(_) => GitError::AlreadyExists(format!("branch {name}")),
                other => other,
            })
    }

    /// Delete a branch; refuses to delete the checked-out one.
    pub async fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        if self.current_branch().await?.as_deref() == Some(name) {
            return Err(GitError::InvalidArgument(format!(
                "cannot delete checked-out branch {name}"
            )));
        }
        let full = format!("{HEADS_PREFIX}{name}");
        if self.refs.read(&full).await?.is_none() {
            return Err(GitError::NotFound(format!("branch {name}")));
        }
        self.refs.update(&full, RefExpect::Any, None).await
    }

    /// All local branches as (short name, tip).
    pub async fn list_branches(&self) -> Result<Vec<(String, ObjectHash)>, GitError> {
        Ok(self
            .refs
            .list(HEADS_PREFIX)
            .await?
            .into_iter()
            .map(|(name, id)| (name[HEADS_PREFIX.len()..].to_string(), id))
            .collect())
    }

    /// Create a tag: lightweight when `message` is `None`, otherwise an
    /// annotated tag object.
    pub async fn create_tag(
        &self,
        name: &str,
        message: Option<&str>,
    ) -> Result<ObjectHash, GitError> {
        let full = format!("{TAGS_PREFIX}{name}");
        let target = self
            .refs
            .resolve_head()
            .await?
            .ok_or_else(|| GitError::NotFound("HEAD has no commit yet".to_string()))?;

        let ref_target = match message {
            None => target,
            Some(message) => {
                let tagger = self.signature(SignatureRole::Tagger, None, None).await?;
                let tag = Tag::new(
                    self.kind,
                    target,
                    ObjectType::Commit,
                    name.to_string(),
                    tagger,
                    message,
                )?;
                self.odb.put_raw(ObjectType::Tag, &tag.to_data()?).await?
            }
        };
        self.refs
            .update(&full, RefExpect::MustNotExist, Some(ref_target))
            .await
            .map_err(|e| match e {
                GitError::RefRaceLost(_) => GitError::AlreadyExists(format!("tag {name}")),
                other => other,
            })?;
        Ok(ref_target)
    }

    // ---- history -------------------------------------------------------

    /// Shallow boundary ids recorded by depth-limited fetches.
    pub(crate) async fn shallow_boundary(&self) -> Result<HashSet<ObjectHash>, GitError> {
        match self.store.get(KEY_SHALLOW).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| GitError::ConversionError(e.to_string()))?;
                let mut set = HashSet::new();
                for line in text.lines().filter(|l| !l.is_empty()) {
                    set.insert(ObjectHash::from_str(line)?);
                }
                Ok(set)
            }
            None => Ok(HashSet::new()),
        }
    }

    pub(crate) async fn write_shallow_boundary(
        &self,
        boundary: &HashSet<ObjectHash>,
    ) -> Result<(), GitError> {
        if boundary.is_empty() {
            self.store.delete(KEY_SHALLOW).await
        } else {
            let mut lines: Vec<String> = boundary.iter().map(|id| id.to_string()).collect();
            lines.sort();
            self.store
                .put(KEY_SHALLOW, (lines.join("\n") + "\n").as_bytes())
                .await
        }
    }

    /// Commit history from `from` (default HEAD), newest first by
    /// committer timestamp, bounded by `limit` and the shallow boundary.
    pub async fn log(
        &self,
        from: Option<ObjectHash>,
        limit: Option<usize>,
    ) -> Result<Vec<Commit>, GitError> {
        let start = match from {
            Some(id) => Some(id),
            None => self.refs.resolve_head().await?,
        };
        let Some(start) = start else {
            return Ok(Vec::new());
        };
        let shallow = self.shallow_boundary().await?;

        let mut out = Vec::new();
        let mut seen: HashSet<ObjectHash> = HashSet::new();
        // (timestamp, id) max-heap gives reverse-chronological order
        // across branchy history.
        let mut heap: std::collections::BinaryHeap<(i64, ObjectHash)> =
            std::collections::BinaryHeap::new();

        let first = self.odb.get_commit(start).await?;
        heap.push((first.committer.timestamp, start));
        seen.insert(start);

        let mut visited = 0usize;
        while let Some((_, id)) = heap.pop() {
            self.check_cancelled()?;
            let commit = self.odb.get_commit(id).await?;
            let at_boundary = shallow.contains(&id);
            if !at_boundary {
                for &parent in &commit.parent_ids {
                    if seen.insert(parent) {
                        let parent_commit = self.odb.get_commit(parent).await?;
                        heap.push((parent_commit.committer.timestamp, parent));
                    }
                }
            }
            out.push(commit);
            visited += 1;
            if let Some(limit) = limit
                && out.len() >= limit
            {
                break;
            }
            if visited % self.engine.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(out)
    }

    /// Every object reachable from `tips`, stopping at `known` ids.
    /// Used by pack export for push and local packing.
    pub async fn reachable_objects(
        &self,
        tips: &[ObjectHash],
        known: &HashSet<ObjectHash>,
    ) -> Result<Vec<ObjectHash>, GitError> {
        let mut out = Vec::new();
        let mut seen: HashSet<ObjectHash> = HashSet::new();
        let mut queue: Vec<ObjectHash> = tips.to_vec();
        let shallow = self.shallow_boundary().await?;

        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            self.check_cancelled()?;
            if known.contains(&id) || !seen.insert(id) {
                continue;
            }
            match self.odb.get_object(id).await? {
                GitObject::Commit(commit) => {
                    queue.push(commit.tree_id);
                    if !shallow.contains(&id) {
                        queue.extend(commit.parent_ids.iter().copied());
                    }
                }
                GitObject::Tree(tree) => {
                    for entry in &tree.entries {
                        // Submodule rows point outside this repository.
                        if entry.mode != TreeMode::Submodule {
                            queue.push(entry.id);
                        }
                    }
                }
                GitObject::Tag(tag) => queue.push(tag.object_id),
                GitObject::Blob(_) => {}
            }
            out.push(id);
            visited += 1;
            if visited % self.engine.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(out)
    }
}
