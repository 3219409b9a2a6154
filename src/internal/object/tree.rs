//! The Tree object represents one directory snapshot: an ordered list of
//! (mode, name, object id) entries. Entry order is load-bearing for
//! byte-identical hashes — names compare as if subdirectories carried a
//! trailing `/` — so construction sorts and parsing verifies.

use std::cmp::Ordering;
use std::fmt::Display;

use bstr::ByteSlice;

use crate::{
    errors::GitError,
    hash::{HashKind, ObjectHash},
    internal::object::{ObjectTrait, types::ObjectType},
};

/// The closed set of entry modes a tree may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeMode {
    /// `100644` regular file.
    Normal,
    /// `100755` executable file.
    Executable,
    /// `120000` symbolic link; the blob holds the target path.
    Symlink,
    /// `160000` submodule link; the id names a commit elsewhere.
    Submodule,
    /// `40000` subdirectory.
    Directory,
}

impl TreeMode {
    /// Canonical serialized form (no leading zero for directories).
    pub fn to_bytes(&self) -> &'static [u8] {
        match self {
            TreeMode::Normal => b"100644",
            TreeMode::Executable => b"100755",
            TreeMode::Symlink => b"120000",
            TreeMode::Submodule => b"160000",
            TreeMode::Directory => b"40000",
        }
    }

    pub fn from_bytes(mode: &[u8]) -> Result<TreeMode, GitError> {
        match mode {
            b"100644" | b"100664" => Ok(TreeMode::Normal),
            b"100755" => Ok(TreeMode::Executable),
            b"120000" => Ok(TreeMode::Symlink),
            b"160000" => Ok(TreeMode::Submodule),
            b"40000" | b"040000" => Ok(TreeMode::Directory),
            _ => Err(GitError::InvalidTreeEntry(
                String::from_utf8_lossy(mode).to_string(),
            )),
        }
    }

    /// The index file-mode word for this entry kind.
    pub fn to_index_mode(&self) -> u32 {
        match self {
            TreeMode::Normal => 0o100644,
            TreeMode::Executable => 0o100755,
            TreeMode::Symlink => 0o120000,
            TreeMode::Submodule => 0o160000,
            TreeMode::Directory => 0o040000,
        }
    }

    pub fn from_index_mode(mode: u32) -> Result<TreeMode, GitError> {
        match mode {
            0o100644 | 0o100664 => Ok(TreeMode::Normal),
            0o100755 => Ok(TreeMode::Executable),
            0o120000 => Ok(TreeMode::Symlink),
            0o160000 => Ok(TreeMode::Submodule),
            0o040000 => Ok(TreeMode::Directory),
            _ => Err(GitError::InvalidTreeEntry(format!("mode {mode:o}"))),
        }
    }
}

/// One (mode, name, id) row of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: TreeMode,
    pub id: ObjectHash,
    pub name: String,
}

impl TreeEntry {
    pub fn new(mode: TreeMode, id: ObjectHash, name: String) -> TreeEntry {
        TreeEntry { mode, id, name }
    }

    pub fn is_tree(&self) -> bool {
        self.mode == TreeMode::Directory
    }

    /// The byte sequence this entry sorts by: its name, with a virtual
    /// trailing `/` for subdirectories.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.is_tree() {
            key.push(b'/');
        }
        key
    }
}

fn entry_order(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

/// A directory snapshot; `entries` is always held in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub id: ObjectHash,
    pub entries: Vec<TreeEntry>,
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "tree {}", self.id)?;
        for entry in &self.entries {
            writeln!(
                f,
                "{} {} {}",
                String::from_utf8_lossy(entry.mode.to_bytes()),
                entry.id,
                entry.name
            )?;
        }
        Ok(())
    }
}

impl Tree {
    /// Build a tree from entries, sorting them into canonical order and
    /// computing the id under the given hash kind. An empty entry list is
    /// legal only for the empty root tree.
    pub fn from_entries(kind: HashKind, mut entries: Vec<TreeEntry>) -> Result<Tree, GitError> {
        entries.sort_by(entry_order);
        entries.dedup_by(|a, b| a.name == b.name);
        let mut tree = Tree {
            id: ObjectHash::zero(kind),
            entries,
        };
        tree.id = tree.object_hash(kind)?;
        Ok(tree)
    }

    /// Look up an immediate child by name.
    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl ObjectTrait for Tree {
    /// Parse `<mode> <name>\0<raw id>` rows. The id width comes from the
    /// width of the hash the payload was stored under. Out-of-order rows
    /// mean the bytes cannot be canonical for their id, so they are
    /// rejected as corrupt.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let id_len = hash.size();
        let mut entries = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let mode_end = rest
                .find_byte(b' ')
                .ok_or_else(|| GitError::InvalidTreeObject("entry missing mode".to_string()))?;
            let mode = TreeMode::from_bytes(&rest[..mode_end])?;

            let name_end = rest[mode_end + 1..]
                .find_byte(b'\0')
                .map(|p| p + mode_end + 1)
                .ok_or_else(|| GitError::InvalidTreeObject("entry missing name".to_string()))?;
            let name = String::from_utf8(rest[mode_end + 1..name_end].to_vec())
                .map_err(|e| GitError::ConversionError(e.to_string()))?;
            if name.is_empty() || name.contains('/') {
                return Err(GitError::InvalidTreeEntry(name));
            }

            if rest.len() < name_end + 1 + id_len {
                return Err(GitError::InvalidTreeObject(
                    "entry truncated before id".to_string(),
                ));
            }
            let id = ObjectHash::from_bytes(&rest[name_end + 1..name_end + 1 + id_len])?;
            entries.push(TreeEntry { mode, id, name });
            rest = &rest[name_end + 1 + id_len..];
        }

        if entries.windows(2).any(|w| entry_order(&w[0], &w[1]) != Ordering::Less) {
            return Err(GitError::Corrupt(format!(
                "tree {hash} entries out of canonical order"
            )));
        }

        Ok(Tree { id: hash, entries })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        for entry in &self.entries {
            data.extend(entry.mode.to_bytes());
            data.push(b' ');
            data.extend(entry.name.as_bytes());
            data.push(b'\0');
            data.extend(entry.id.as_ref());
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::blob::Blob;

    fn blob_id(content: &[u8]) -> ObjectHash {
        Blob::from_content(HashKind::Sha1, content).id
    }

    /// The directory-slash tie-break: `foo` (dir) sorts after `foo.txt`
    /// because it compares as `foo/`.
    #[test]
    fn directory_slash_ordering() {
        let dir_id = blob_id(b"placeholder");
        let tree = Tree::from_entries(
            HashKind::Sha1,
            vec![
                TreeEntry::new(TreeMode::Directory, dir_id, "foo".to_string()),
                TreeEntry::new(TreeMode::Normal, blob_id(b"a"), "foo.txt".to_string()),
                TreeEntry::new(TreeMode::Normal, blob_id(b"b"), "foo-bar".to_string()),
            ],
        )
        .unwrap();
        let names: Vec<&str> = tree.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["foo-bar", "foo.txt", "foo"]);
    }

    /// Round-trip through bytes preserves structure and id.
    #[test]
    fn round_trip() {
        let tree = Tree::from_entries(
            HashKind::Sha1,
            vec![
                TreeEntry::new(TreeMode::Normal, blob_id(b"hello\n"), "README".to_string()),
                TreeEntry::new(TreeMode::Executable, blob_id(b"#!/bin/sh\n"), "run".to_string()),
            ],
        )
        .unwrap();
        let data = tree.to_data().unwrap();
        let parsed = Tree::from_bytes(&data, tree.id).unwrap();
        assert_eq!(parsed, tree);
        assert_eq!(parsed.object_hash(HashKind::Sha1).unwrap(), tree.id);
    }

    /// Known vector: a tree with the single entry README → blob of
    /// `hello\n` must match the id real tooling produces.
    #[test]
    fn known_tree_id() {
        let tree = Tree::from_entries(
            HashKind::Sha1,
            vec![TreeEntry::new(
                TreeMode::Normal,
                blob_id(b"hello\n"),
                "README".to_string(),
            )],
        )
        .unwrap();
        assert_eq!(
            tree.id.to_string(),
            "7d4a466af82cd6857c85c0296d5c23fc68cba887"
        );
    }

    /// Out-of-order payloads are rejected on load.
    #[test]
    fn unsorted_payload_is_corrupt() {
        let b = TreeEntry::new(TreeMode::Normal, blob_id(b"b"), "b".to_string());
        let a = TreeEntry::new(TreeMode::Normal, blob_id(b"a"), "a".to_string());
        let mut data = Vec::new();
        for entry in [&b, &a] {
            data.extend(entry.mode.to_bytes());
            data.push(b' ');
            data.extend(entry.name.as_bytes());
            data.push(b'\0');
            data.extend(entry.id.as_ref());
        }
        let fake_id = ObjectHash::from_type_and_data(HashKind::Sha1, ObjectType::Tree, &data);
        let err = Tree::from_bytes(&data, fake_id).unwrap_err();
        assert!(matches!(err, GitError::Corrupt(_)));
    }

    /// SHA-256 trees embed 32-byte ids and parse back under that width.
    #[test]
    fn sha256_width() {
        let blob = Blob::from_content(HashKind::Sha256, b"wide");
        let tree = Tree::from_entries(
            HashKind::Sha256,
            vec![TreeEntry::new(TreeMode::Normal, blob.id, "w".to_string())],
        )
        .unwrap();
        let data = tree.to_data().unwrap();
        assert_eq!(data.len(), "100644 w\0".len() + 32);
        let parsed = Tree::from_bytes(&data, tree.id).unwrap();
        assert_eq!(parsed.entries[0].id, blob.id);
    }
}
