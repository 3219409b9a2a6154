//! Pack stream decoder: reads the header, inflates entries, resolves
//! delta chains base-first, and verifies the trailing hash.
//!
//! Thin packs may reference bases that never appear in the stream; those
//! are fetched through a [`BaseProvider`] backed by the object database.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Cursor, Read};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    delta::apply_delta,
    errors::GitError,
    hash::{HashKind, ObjectHash},
    internal::{
        object::types::ObjectType,
        pack::{PACK_VERSION, Pack, entry::Entry, wrapper::Wrapper},
        zlib::stream::inflate::ReadBoxed,
    },
};

/// Source of delta bases that live outside the pack being decoded.
#[async_trait]
pub trait BaseProvider: Send + Sync {
    /// Payload and kind for `id`, or `None` when unknown.
    async fn base(&self, id: ObjectHash) -> Result<Option<(ObjectType, Vec<u8>)>, GitError>;
}

/// Provider for self-contained packs: every ref-delta base must be an
/// earlier entry of the same stream.
pub struct NoBases;

#[async_trait]
impl BaseProvider for NoBases {
    async fn base(&self, _id: ObjectHash) -> Result<Option<(ObjectType, Vec<u8>)>, GitError> {
        Ok(None)
    }
}

/// How a delta entry names its base.
#[derive(Debug, Clone, Copy)]
enum BaseRef {
    /// Absolute offset of an earlier entry in this pack.
    Offset(usize),
    /// Object id, possibly outside the pack (thin pack).
    Id(ObjectHash),
}

/// A delta entry awaiting its base.
struct PendingDelta {
    index: usize,
    offset: usize,
    base: BaseRef,
    data: Vec<u8>,
}

/// Streaming pack decoder for one repository hash width.
pub struct PackReader {
    kind: HashKind,
    /// Cooperative yield interval over entries and resolution steps.
    yield_every: usize,
}

fn read_byte(reader: &mut impl Read) -> Result<u8, GitError> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .map_err(|e| GitError::InvalidPackfile(format!("truncated pack: {e}")))?;
    Ok(byte[0])
}

/// Entry header: bits 4-6 of the first byte are the type, the low nibble
/// starts the size, and continuation bytes add 7 bits each.
fn read_type_and_size(reader: &mut impl Read) -> Result<(u8, usize), GitError> {
    let mut byte = read_byte(reader)?;
    let type_bits = (byte >> 4) & 0x7;
    let mut size = (byte & 0x0f) as usize;
    let mut shift = 4;
    while byte & 0x80 != 0 {
        byte = read_byte(reader)?;
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
    }
    Ok((type_bits, size))
}

/// Negative ofs-delta distance: most-significant-first 7-bit groups with
/// an off-by-one fold per continuation.
fn read_offset_encoding(reader: &mut impl Read) -> Result<usize, GitError> {
    let mut byte = read_byte(reader)?;
    let mut value = (byte & 0x7f) as usize;
    while byte & 0x80 != 0 {
        byte = read_byte(reader)?;
        value = ((value + 1) << 7) | (byte & 0x7f) as usize;
    }
    Ok(value)
}

impl PackReader {
    pub fn new(kind: HashKind, yield_every: usize) -> Self {
        Self {
            kind,
            yield_every: yield_every.max(1),
        }
    }

    /// Decode a complete pack held in memory, resolving every delta.
    pub async fn decode(
        &self,
        data: &[u8],
        provider: &dyn BaseProvider,
        cancel: &CancellationToken,
    ) -> Result<Pack, GitError> {
        let mut wrapper = Wrapper::new(BufReader::new(Cursor::new(data)), self.kind);

        let mut magic = [0u8; 4];
        wrapper
            .read_exact(&mut magic)
            .map_err(|e| GitError::InvalidPackfile(format!("missing header: {e}")))?;
        if &magic != b"PACK" {
            return Err(GitError::InvalidPackfile(format!(
                "bad magic {:02x?}",
                magic
            )));
        }
        let version = read_u32(&mut wrapper)?;
        if version != PACK_VERSION {
            return Err(GitError::InvalidPackfile(format!(
                "unsupported version {version}"
            )));
        }
        let count = read_u32(&mut wrapper)? as usize;
        tracing::debug!(count, "decoding pack stream");

        let mut resolved: Vec<Option<Entry>> = (0..count).map(|_| None).collect();
        let mut pending: Vec<PendingDelta> = Vec::new();
        let mut by_offset: HashMap<usize, usize> = HashMap::new();

        for index in 0..count {
            if cancel.is_cancelled() {
                return Err(GitError::Cancelled);
            }
            let offset = wrapper.bytes_read();
            let (type_bits, size) = read_type_and_size(&mut wrapper)?;
            let obj_type = ObjectType::from_pack_type(type_bits)?;
            by_offset.insert(offset, index);

            match obj_type {
                ObjectType::OfsDelta => {
                    let distance = read_offset_encoding(&mut wrapper)?;
                    if distance > offset {
                        return Err(GitError::InvalidPackfile(format!(
                            "ofs-delta at {offset} reaches before the pack start"
                        )));
                    }
                    let payload = inflate_entry(&mut wrapper, self.kind, size, None)?;
                    pending.push(PendingDelta {
                        index,
                        offset,
                        base: BaseRef::Offset(offset - distance),
                        data: payload.0,
                    });
                }
                ObjectType::RefDelta => {
                    let base_id = ObjectHash::from_stream(self.kind, &mut wrapper)
                        .map_err(|e| GitError::InvalidPackfile(format!("truncated base id: {e}")))?;
                    let payload = inflate_entry(&mut wrapper, self.kind, size, None)?;
                    pending.push(PendingDelta {
                        index,
                        offset,
                        base: BaseRef::Id(base_id),
                        data: payload.0,
                    });
                }
                base_kind => {
                    let (payload, id) =
                        inflate_entry(&mut wrapper, self.kind, size, Some(base_kind))?;
                    resolved[index] = Some(Entry::new(
                        base_kind,
                        payload,
                        id.expect("base entries always digest an id"),
                    ));
                }
            }

            if (index + 1) % self.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }

        // The trailer covers every byte before itself.
        let computed = wrapper.current_hash();
        let signature = ObjectHash::from_stream(self.kind, &mut wrapper)
            .map_err(|e| GitError::InvalidPackfile(format!("truncated trailer: {e}")))?;
        if signature != computed {
            return Err(GitError::InvalidPackfile(format!(
                "trailer mismatch: stream says {signature}, content hashes to {computed}"
            )));
        }

        self.resolve_deltas(&mut resolved, pending, &by_offset, provider, cancel)
            .await?;

        let entries = resolved
            .into_iter()
            .map(|e| e.expect("all entries resolved"))
            .collect();
        Ok(Pack {
            number: count,
            signature,
            entries,
        })
    }

    /// Base-first resolution: loop over outstanding deltas, applying any
    /// whose base has materialized, until the list drains or stalls.
    async fn resolve_deltas(
        &self,
        resolved: &mut [Option<Entry>],
        mut pending: Vec<PendingDelta>,
        by_offset: &HashMap<usize, usize>,
        provider: &dyn BaseProvider,
        cancel: &CancellationToken,
    ) -> Result<(), GitError> {
        let mut steps = 0usize;
        while !pending.is_empty() {
            if cancel.is_cancelled() {
                return Err(GitError::Cancelled);
            }
            let mut progressed = false;
            let mut still_pending = Vec::with_capacity(pending.len());

            for delta in pending {
                let base = match delta.base {
                    BaseRef::Offset(offset) => match by_offset.get(&offset) {
                        Some(&idx) => resolved[idx]
                            .as_ref()
                            .map(|e| (e.obj_type, e.data.clone())),
                        None => {
                            return Err(GitError::InvalidPackfile(format!(
                                "ofs-delta at {} points at offset {} which is not an entry",
                                delta.offset, offset
                            )));
                        }
                    },
                    BaseRef::Id(id) => {
                        let in_pack = resolved
                            .iter()
                            .flatten()
                            .find(|e| e.hash == id)
                            .map(|e| (e.obj_type, e.data.clone()));
                        match in_pack {
                            Some(found) => Some(found),
                            // Thin pack: the base must already live in
                            // the object database.
                            None => provider.base(id).await?,
                        }
                    }
                };

                match base {
                    Some((base_type, base_data)) => {
                        let mut cursor = Cursor::new(&delta.data);
                        let target = apply_delta(&mut cursor, &base_data)?;
                        let id = ObjectHash::from_type_and_data(self.kind, base_type, &target);
                        resolved[delta.index] = Some(Entry::new(base_type, target, id));
                        progressed = true;
                    }
                    None => still_pending.push(delta),
                }

                steps += 1;
                if steps % self.yield_every == 0 {
                    tokio::task::yield_now().await;
                }
            }

            if !progressed {
                let first = &still_pending[0];
                return Err(match first.base {
                    BaseRef::Id(id) => GitError::MissingBase(id.to_string()),
                    BaseRef::Offset(offset) => {
                        GitError::MissingBase(format!("pack offset {offset}"))
                    }
                });
            }
            pending = still_pending;
        }
        Ok(())
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32, GitError> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| GitError::InvalidPackfile(format!("truncated pack: {e}")))?;
    Ok(u32::from_be_bytes(buf))
}

/// Inflate one entry payload in place. For base entries the digest over
/// `<kind> <len>\0` + body is returned alongside the bytes.
fn inflate_entry<R: BufRead>(
    wrapper: &mut R,
    kind: HashKind,
    declared_size: usize,
    base_kind: Option<ObjectType>,
) -> Result<(Vec<u8>, Option<ObjectHash>), GitError> {
    let mut payload = Vec::with_capacity(declared_size);
    let id = match base_kind {
        Some(obj_type) => {
            let mut reader = ReadBoxed::new(&mut *wrapper, kind, obj_type, declared_size);
            reader
                .read_to_end(&mut payload)
                .map_err(|e| GitError::InvalidPackfile(format!("entry payload: {e}")))?;
            Some(reader.hash.finalize_hash())
        }
        None => {
            let mut reader = ReadBoxed::new_for_delta(&mut *wrapper, kind);
            reader
                .read_to_end(&mut payload)
                .map_err(|e| GitError::InvalidPackfile(format!("delta payload: {e}")))?;
            None
        }
    };
    if payload.len() != declared_size {
        return Err(GitError::InvalidPackfile(format!(
            "entry declared {declared_size} bytes but inflated to {}",
            payload.len()
        )));
    }
    Ok((payload, id))
}
