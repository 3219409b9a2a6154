//! The staging index: an ordered file list with cached metadata, blob
//! ids, and conflict stage slots, serialized in the `DIRC` version 2
//! binary layout with a trailing integrity hash.

pub mod ignore;

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    errors::GitError,
    hash::{HashKind, ObjectHash},
    utils::HashAlgorithm,
};

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";
const INDEX_VERSION: u32 = 2;

/// Conflict stage slot: 0 for a normally staged entry, 1..=3 for the
/// base / ours / theirs sides of an unresolved merge.
pub const STAGE_NORMAL: u8 = 0;
pub const STAGE_BASE: u8 = 1;
pub const STAGE_OURS: u8 = 2;
pub const STAGE_THEIRS: u8 = 3;

/// One staged path. Paths use forward slashes and sort ascending;
/// dev/ino/uid/gid are informational and may be zero when the host
/// filesystem has nothing to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime: (u32, u32),
    pub mtime: (u32, u32),
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub id: ObjectHash,
    pub stage: u8,
    pub path: String,
}

impl IndexEntry {
    /// A minimal entry carrying just what the engine itself produces.
    pub fn new(path: String, mode: u32, id: ObjectHash) -> IndexEntry {
        IndexEntry {
            ctime: (0, 0),
            mtime: (0, 0),
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            size: 0,
            id,
            stage: STAGE_NORMAL,
            path,
        }
    }

    fn sort_key(&self) -> (&[u8], u8) {
        (self.path.as_bytes(), self.stage)
    }
}

/// The staging area. Entries are always held sorted by (path, stage);
/// duplicates in the same slot are forbidden.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Index {
        Index::default()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up one (path, stage) slot.
    pub fn get(&self, path: &str, stage: u8) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|e| e.path == path && e.stage == stage)
    }

    /// Insert or replace the entry in its (path, stage) slot. Staging a
    /// normal entry clears any conflict slots left at the same path.
    pub fn upsert(&mut self, entry: IndexEntry) {
        if entry.stage == STAGE_NORMAL {
            self.entries
                .retain(|e| !(e.path == entry.path && e.stage != STAGE_NORMAL));
        }
        match self
            .entries
            .iter_mut()
            .find(|e| e.path == entry.path && e.stage == entry.stage)
        {
            Some(slot) => *slot = entry,
            None => {
                self.entries.push(entry);
                self.entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            }
        }
    }

    /// Remove every slot at `path`. Returns whether anything was there.
    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.path != path);
        before != self.entries.len()
    }

    /// Replace any slots at `path` with conflict stages 1..=3. `None`
    /// sides (add/add or delete conflicts) simply leave that slot empty.
    pub fn set_conflict(
        &mut self,
        path: &str,
        base: Option<IndexEntry>,
        ours: Option<IndexEntry>,
        theirs: Option<IndexEntry>,
    ) {
        self.entries.retain(|e| e.path != path);
        for (stage, entry) in [(STAGE_BASE, base), (STAGE_OURS, ours), (STAGE_THEIRS, theirs)] {
            if let Some(mut entry) = entry {
                entry.stage = stage;
                entry.path = path.to_string();
                self.entries.push(entry);
            }
        }
        self.entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    /// Paths that still carry conflict slots.
    pub fn conflicted_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.stage != STAGE_NORMAL)
            .map(|e| e.path.clone())
            .collect();
        paths.dedup();
        paths
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != STAGE_NORMAL)
    }

    /// Serialize to `DIRC` v2 bytes with the trailing hash. The object-id
    /// field width follows the repository hash kind.
    pub fn serialize(&self, kind: HashKind) -> Result<Vec<u8>, GitError> {
        let mut out = Vec::new();
        out.extend(INDEX_SIGNATURE);
        out.write_u32::<BigEndian>(INDEX_VERSION)?;
        out.write_u32::<BigEndian>(self.entries.len() as u32)?;

        for entry in &self.entries {
            let start = out.len();
            out.write_u32::<BigEndian>(entry.ctime.0)?;
            out.write_u32::<BigEndian>(entry.ctime.1)?;
            out.write_u32::<BigEndian>(entry.mtime.0)?;
            out.write_u32::<BigEndian>(entry.mtime.1)?;
            out.write_u32::<BigEndian>(entry.dev)?;
            out.write_u32::<BigEndian>(entry.ino)?;
            out.write_u32::<BigEndian>(entry.mode)?;
            out.write_u32::<BigEndian>(entry.uid)?;
            out.write_u32::<BigEndian>(entry.gid)?;
            out.write_u32::<BigEndian>(entry.size)?;
            out.extend(entry.id.as_ref());

            // 0xFFF in the flags is an "at least this long" sentinel;
            // readers recover the real length from the NUL terminator.
            let name_len = entry.path.len().min(0xFFF) as u16;
            let flags = ((entry.stage as u16) << 12) | name_len;
            out.write_u16::<BigEndian>(flags)?;
            out.extend(entry.path.as_bytes());

            // NUL terminator folded into the zero padding that brings the
            // entry to an 8-byte boundary.
            let entry_len = out.len() - start;
            let padding = 8 - (entry_len % 8);
            out.extend(std::iter::repeat_n(0u8, padding));
        }

        let mut hasher = HashAlgorithm::new(kind);
        hasher.update(&out);
        out.extend(hasher.finalize());
        Ok(out)
    }

    /// Parse `DIRC` v2 bytes, verifying the header, entry order, slot
    /// uniqueness, and the trailing hash.
    pub fn parse(kind: HashKind, data: &[u8]) -> Result<Index, GitError> {
        let trailer_len = kind.size();
        if data.len() < 12 + trailer_len {
            return Err(GitError::InvalidIndex("truncated index".to_string()));
        }

        let (body, trailer) = data.split_at(data.len() - trailer_len);
        let mut hasher = HashAlgorithm::new(kind);
        hasher.update(body);
        if hasher.finalize() != trailer {
            return Err(GitError::Corrupt("index trailer mismatch".to_string()));
        }

        let mut cursor = Cursor::new(body);
        let mut signature = [0u8; 4];
        cursor.read_exact(&mut signature)?;
        if &signature != INDEX_SIGNATURE {
            return Err(GitError::InvalidIndex(format!(
                "bad signature {:02x?}",
                signature
            )));
        }
        let version = cursor.read_u32::<BigEndian>()?;
        if version != INDEX_VERSION {
            return Err(GitError::InvalidIndex(format!(
                "unsupported version {version}"
            )));
        }
        let count = cursor.read_u32::<BigEndian>()? as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let start = cursor.position() as usize;
            let ctime = (
                cursor.read_u32::<BigEndian>()?,
                cursor.read_u32::<BigEndian>()?,
            );
            let mtime = (
                cursor.read_u32::<BigEndian>()?,
                cursor.read_u32::<BigEndian>()?,
            );
            let dev = cursor.read_u32::<BigEndian>()?;
            let ino = cursor.read_u32::<BigEndian>()?;
            let mode = cursor.read_u32::<BigEndian>()?;
            let uid = cursor.read_u32::<BigEndian>()?;
            let gid = cursor.read_u32::<BigEndian>()?;
            let size = cursor.read_u32::<BigEndian>()?;
            let id = ObjectHash::from_stream(kind, &mut cursor)?;
            let flags = cursor.read_u16::<BigEndian>()?;
            let stage = ((flags >> 12) & 0x3) as u8;
            let name_len = (flags & 0xFFF) as usize;

            let path_bytes = if name_len < 0xFFF {
                let mut bytes = vec![0u8; name_len];
                cursor.read_exact(&mut bytes)?;
                bytes
            } else {
                // Sentinel: the path is at least 0xFFF bytes long and
                // runs up to its NUL terminator.
                let position = cursor.position() as usize;
                let rest = &cursor.get_ref()[position..];
                let nul = rest.iter().position(|b| *b == 0).ok_or_else(|| {
                    GitError::InvalidIndex("unterminated long path".to_string())
                })?;
                if nul < 0xFFF {
                    return Err(GitError::InvalidIndex(format!(
                        "long-path sentinel on a {nul}-byte path"
                    )));
                }
                let bytes = rest[..nul].to_vec();
                // Leave the NUL for the shared padding check below.
                cursor.set_position((position + nul) as u64);
                bytes
            };
            let path = String::from_utf8(path_bytes)
                .map_err(|e| GitError::ConversionError(e.to_string()))?;

            let entry_len = cursor.position() as usize - start;
            let padding = 8 - (entry_len % 8);
            let mut pad = vec![0u8; padding];
            cursor.read_exact(&mut pad)?;
            if pad.iter().any(|b| *b != 0) {
                return Err(GitError::InvalidIndex(format!(
                    "nonzero padding after `{path}`"
                )));
            }

            entries.push(IndexEntry {
                ctime,
                mtime,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
                id,
                stage,
                path,
            });
        }

        for pair in entries.windows(2) {
            if pair[0].sort_key() >= pair[1].sort_key() {
                return Err(GitError::InvalidIndex(format!(
                    "entries out of order at `{}`",
                    pair[1].path
                )));
            }
        }

        Ok(Index { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::blob::Blob;

    fn entry(path: &str, content: &[u8]) -> IndexEntry {
        let blob = Blob::from_content(HashKind::Sha1, content);
        let mut e = IndexEntry::new(path.to_string(), 0o100644, blob.id);
        e.size = content.len() as u32;
        e.mtime = (1700000000, 500);
        e.ctime = (1700000000, 500);
        e
    }

    /// serialize → parse is structurally identical, for both widths.
    #[test]
    fn round_trip() {
        for kind in [HashKind::Sha1, HashKind::Sha256] {
            let mut index = Index::new();
            let blob = Blob::from_content(kind, b"hello\n");
            let mut e = IndexEntry::new("README".to_string(), 0o100644, blob.id);
            e.size = 6;
            index.upsert(e);
            index.upsert(IndexEntry::new(
                "src/lib.rs".to_string(),
                0o100644,
                Blob::from_content(kind, b"lib").id,
            ));

            let data = index.serialize(kind).unwrap();
            let parsed = Index::parse(kind, &data).unwrap();
            assert_eq!(parsed, index);
        }
    }

    /// Entries stay sorted by path, and re-upserting replaces in place.
    #[test]
    fn sorted_and_deduplicated() {
        let mut index = Index::new();
        index.upsert(entry("b.txt", b"b"));
        index.upsert(entry("a.txt", b"a"));
        index.upsert(entry("a.txt", b"a2"));

        let paths: Vec<&str> = index.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
        assert_eq!(
            index.get("a.txt", STAGE_NORMAL).unwrap().id,
            Blob::from_content(HashKind::Sha1, b"a2").id
        );
    }

    /// Conflict slots serialize with their stage bits and read back.
    #[test]
    fn conflict_stages_round_trip() {
        let mut index = Index::new();
        index.upsert(entry("other", b"x"));
        index.set_conflict(
            "README",
            Some(entry("README", b"base")),
            Some(entry("README", b"ours")),
            Some(entry("README", b"theirs")),
        );
        assert!(index.has_conflicts());
        assert_eq!(index.conflicted_paths(), vec!["README".to_string()]);

        let data = index.serialize(HashKind::Sha1).unwrap();
        let parsed = Index::parse(HashKind::Sha1, &data).unwrap();
        assert_eq!(parsed.get("README", STAGE_BASE).unwrap().id, entry("README", b"base").id);
        assert_eq!(parsed.get("README", STAGE_OURS).unwrap().id, entry("README", b"ours").id);
        assert_eq!(parsed.get("README", STAGE_THEIRS).unwrap().id, entry("README", b"theirs").id);
        assert!(parsed.get("README", STAGE_NORMAL).is_none());

        // A normal re-stage resolves the conflict.
        let mut resolved = parsed;
        resolved.upsert(entry("README", b"resolved"));
        assert!(!resolved.has_conflicts());
    }

    /// Paths past the 12-bit flags field round-trip through the 0xFFF
    /// sentinel, and entries after them stay in sync.
    #[test]
    fn long_path_round_trip() {
        let long_path = format!("deep/{}", "x".repeat(4200));
        let boundary_path = "b/".to_string() + &"y".repeat(4093); // exactly 0xFFF bytes
        let mut index = Index::new();
        index.upsert(entry(&long_path, b"long"));
        index.upsert(entry(&boundary_path, b"edge"));
        index.upsert(entry("zzz-after", b"tail"));

        let data = index.serialize(HashKind::Sha1).unwrap();
        let parsed = Index::parse(HashKind::Sha1, &data).unwrap();
        assert_eq!(parsed, index);
        assert_eq!(
            parsed.get(&long_path, STAGE_NORMAL).unwrap().id,
            entry(&long_path, b"long").id
        );
        assert_eq!(
            parsed.get(&boundary_path, STAGE_NORMAL).unwrap().id,
            entry(&boundary_path, b"edge").id
        );
        assert_eq!(
            parsed.get("zzz-after", STAGE_NORMAL).unwrap().id,
            entry("zzz-after", b"tail").id
        );
    }

    /// A flipped byte breaks the trailer check.
    #[test]
    fn corrupt_trailer_rejected() {
        let mut index = Index::new();
        index.upsert(entry("a", b"a"));
        let mut data = index.serialize(HashKind::Sha1).unwrap();
        data[14] ^= 0x01;
        assert!(matches!(
            Index::parse(HashKind::Sha1, &data),
            Err(GitError::Corrupt(_))
        ));
    }

    /// Entry byte layout: fixed prefix is 62 bytes for SHA-1 ids and the
    /// whole entry pads to an 8-byte boundary.
    #[test]
    fn v2_entry_layout() {
        let mut index = Index::new();
        index.upsert(entry("README", b"hello\n"));
        let data = index.serialize(HashKind::Sha1).unwrap();

        // fixed(62) + path(6) = 68 → 4 padding bytes reach the 8-byte
        // boundary; header adds 12 and the trailer 20.
        assert_eq!(data.len(), 12 + 62 + 6 + 4 + 20);
        assert_eq!(&data[..4], b"DIRC");
        assert_eq!(u32::from_be_bytes(data[4..8].try_into().unwrap()), 2);
        assert_eq!(u32::from_be_bytes(data[8..12].try_into().unwrap()), 1);
    }
}
