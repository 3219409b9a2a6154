//! Content-addressed object database over the storage contract: loose
//! object codec, a bounded LRU cache of recently touched objects, and
//! pack ingest/export glue.
//!
//! Writes are idempotent (same key, same bytes) and therefore safe to
//! race; reads verify the stored bytes still hash to the id they were
//! filed under.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bstr::ByteSlice;
use clru::CLruCache;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::GitError,
    hash::{HashKind, ObjectHash},
    internal::{
        object::{
            GitObject, blob::Blob, commit::Commit, tag::Tag, tree::Tree,
            types::ObjectType,
        },
        pack::{
            Pack,
            decode::{BaseProvider, PackReader},
            encode::PackWriter,
            entry::Entry,
        },
        zlib::{deflate, inflate},
    },
    store::BlobStore,
};

/// Storage key for a loose object: two hex chars as a logical directory,
/// the rest as the file name.
fn loose_key(id: &ObjectHash) -> String {
    let hex = id.to_string();
    format!("objects/{}/{}", &hex[..2], &hex[2..])
}

/// The object database for one repository handle. The cache is private
/// to the handle; concurrent handles over the same storage are not
/// supported.
pub struct ObjectDatabase {
    store: Arc<dyn BlobStore>,
    kind: HashKind,
    cache: Mutex<CLruCache<ObjectHash, (ObjectType, Vec<u8>)>>,
    yield_every: usize,
}

impl ObjectDatabase {
    pub fn new(
        store: Arc<dyn BlobStore>,
        kind: HashKind,
        cache_entries: usize,
        yield_every: usize,
    ) -> ObjectDatabase {
        let capacity = NonZeroUsize::new(cache_entries.max(1)).expect("max(1) is nonzero");
        ObjectDatabase {
            store,
            kind,
            cache: Mutex::new(CLruCache::new(capacity)),
            yield_every,
        }
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    /// Store a payload of the given kind, returning its id. Existing
    /// objects are left untouched.
    pub async fn put_raw(
        &self,
        obj_type: ObjectType,
        data: &[u8],
    ) -> Result<ObjectHash, GitError> {
        let id = ObjectHash::from_type_and_data(self.kind, obj_type, data);
        let key = loose_key(&id);
        if !self.store.exists(&key).await? {
            let mut loose = Vec::with_capacity(data.len() + 16);
            loose.extend(obj_type.to_bytes());
            loose.push(b' ');
            loose.extend(data.len().to_string().as_bytes());
            loose.push(b'\0');
            loose.extend(data);
            self.store.put(&key, &deflate(&loose)?).await?;
        }
        self.cache
            .lock()
            .expect("odb cache lock poisoned")
            .put(id, (obj_type, data.to_vec()));
        Ok(id)
    }

    /// Store a typed object.
    pub async fn put_object(&self, object: &GitObject) -> Result<ObjectHash, GitError> {
        self.put_raw(object.get_type(), &object.to_data()?).await
    }

    pub async fn has(&self, id: ObjectHash) -> Result<bool, GitError> {
        if self
            .cache
            .lock()
            .expect("odb cache lock poisoned")
            .get(&id)
            .is_some()
        {
            return Ok(true);
        }
        self.store.exists(&loose_key(&id)).await
    }

    /// Fetch kind and payload for `id`. Cache first, then loose storage
    /// with header validation and hash verification.
    pub async fn get_raw(&self, id: ObjectHash) -> Result<(ObjectType, Vec<u8>), GitError> {
        if let Some(hit) = self
            .cache
            .lock()
            .expect("odb cache lock poisoned")
            .get(&id)
        {
            return Ok(hit.clone());
        }

        let key = loose_key(&id);
        let compressed = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| GitError::NotFound(format!("object {id}")))?;
        let loose = inflate(&compressed)?;

        let header_end = loose
            .find_byte(b'\0')
            .ok_or_else(|| GitError::Corrupt(format!("object {id} missing header")))?;
        let header = std::str::from_utf8(&loose[..header_end])
            .map_err(|e| GitError::ConversionError(e.to_string()))?;
        let (type_name, size_text) = header
            .split_once(' ')
            .ok_or_else(|| GitError::Corrupt(format!("object {id} malformed header")))?;
        let obj_type = ObjectType::from_object_name(type_name)?;
        let declared: usize = size_text
            .parse()
            .map_err(|_| GitError::Corrupt(format!("object {id} bad size `{size_text}`")))?;

        let payload = loose[header_end + 1..].to_vec();
        if payload.len() != declared {
            return Err(GitError::Corrupt(format!(
                "object {id} declared {declared} bytes, holds {}",
                payload.len()
            )));
        }
        let actual = ObjectHash::from_type_and_data(self.kind, obj_type, &payload);
        if actual != id {
            return Err(GitError::HashMismatch {
                expected: id.to_string(),
                actual: actual.to_string(),
            });
        }

        self.cache
            .lock()
            .expect("odb cache lock poisoned")
            .put(id, (obj_type, payload.clone()));
        Ok((obj_type, payload))
    }

    /// Typed fetch dispatching on the stored kind.
    pub async fn get_object(&self, id: ObjectHash) -> Result<GitObject, GitError> {
        let (obj_type, payload) = self.get_raw(id).await?;
        GitObject::parse(obj_type, &payload, id)
    }

    pub async fn get_blob(&self, id: ObjectHash) -> Result<Blob, GitError> {
        match self.get_object(id).await? {
            GitObject::Blob(blob) => Ok(blob),
            other => Err(GitError::Corrupt(format!(
                "object {id} is a {}, expected blob",
                other.get_type()
            ))),
        }
    }

    pub async fn get_tree(&self, id: ObjectHash) -> Result<Tree, GitError> {
        match self.get_object(id).await? {
            GitObject::Tree(tree) => Ok(tree),
            other => Err(GitError::Corrupt(format!(
                "object {id} is a {}, expected tree",
                other.get_type()
            ))),
        }
    }

    pub async fn get_commit(&self, id: ObjectHash) -> Result<Commit, GitError> {
        match self.get_object(id).await? {
            GitObject::Commit(commit) => Ok(commit),
            other => Err(GitError::Corrupt(format!(
                "object {id} is a {}, expected commit",
                other.get_type()
            ))),
        }
    }

    pub async fn get_tag(&self, id: ObjectHash) -> Result<Tag, GitError> {
        match self.get_object(id).await? {
            GitObject::Tag(tag) => Ok(tag),
            other => Err(GitError::Corrupt(format!(
                "object {id} is a {}, expected tag",
                other.get_type()
            ))),
        }
    }

    /// Decode a pack stream and explode every resolved entry into loose
    /// storage. Thin-pack bases are looked up in this database.
    pub async fn ingest_pack(
        &self,
        pack_data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Pack, GitError> {
        let reader = PackReader::new(self.kind, self.yield_every);
        let pack = reader.decode(pack_data, self, cancel).await?;
        for entry in &pack.entries {
            let stored = self.put_raw(entry.obj_type, &entry.data).await?;
            if stored != entry.hash {
                return Err(GitError::HashMismatch {
                    expected: entry.hash.to_string(),
                    actual: stored.to_string(),
                });
            }
        }
        tracing::debug!(objects = pack.entries.len(), "ingested pack");
        Ok(pack)
    }

    /// Serialize the given objects into a pack stream.
    pub async fn export_pack(
        &self,
        ids: &[ObjectHash],
        compute_deltas: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, GitError> {
        let mut entries = Vec::with_capacity(ids.len());
        for &id in ids {
            let (obj_type, data) = self.get_raw(id).await?;
            entries.push(Entry::new(obj_type, data, id));
        }
        let writer = PackWriter::new(self.kind, compute_deltas, self.yield_every);
        writer.encode(entries, cancel).await
    }
}

#[async_trait]
impl BaseProvider for ObjectDatabase {
    async fn base(&self, id: ObjectHash) -> Result<Option<(ObjectType, Vec<u8>)>, GitError> {
        match self.get_raw(id).await {
            Ok(found) => Ok(Some(found)),
            Err(GitError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
