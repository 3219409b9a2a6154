//! Hash utilities for Git objects with selectable algorithms (SHA-1 and
//! SHA-256). The hash kind is fixed per repository at creation time and
//! carried explicitly by callers; there is no process-global selection.

use std::{fmt::Display, io, str::FromStr};

use serde::{Deserialize, Serialize};
use sha1::Digest;

use crate::{errors::GitError, internal::object::types::ObjectType};

/// Supported hash algorithms for object ids (selector only, no data
/// attached). Recorded in `core.hashAlgorithm` at repository creation;
/// every id in one repository shares this kind.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    #[default]
    Sha1,
    Sha256,
}

impl HashKind {
    /// Byte length of the hash output.
    pub const fn size(&self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Sha256 => 32,
        }
    }

    /// Hex string length of the hash output.
    pub const fn hex_len(&self) -> usize {
        match self {
            HashKind::Sha1 => 40,
            HashKind::Sha256 => 64,
        }
    }

    /// Lowercase name of the hash algorithm, as written to config and the
    /// `object-format` capability.
    pub const fn as_str(&self) -> &'static str {
        match self {
            HashKind::Sha1 => "sha1",
            HashKind::Sha256 => "sha256",
        }
    }
}

impl Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashKind::Sha1),
            "sha256" => Ok(HashKind::Sha256),
            _ => Err(GitError::InvalidConfig(format!("unknown hash kind `{s}`"))),
        }
    }
}

/// Concrete object id value carrying the bytes for the selected algorithm.
/// Canonically displayed as lowercase hexadecimal. Supports conversion
/// to/from hex strings, byte slices, and stream reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum ObjectHash {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}

impl AsRef<[u8]> for ObjectHash {
    fn as_ref(&self) -> &[u8] {
        match self {
            ObjectHash::Sha1(bytes) => bytes.as_slice(),
            ObjectHash::Sha256(bytes) => bytes.as_slice(),
        }
    }
}

/// Parse hex (40 chars for SHA-1, 64 for SHA-256) into `ObjectHash`.
/// The width is unambiguous, so the kind is inferred from the length.
impl FromStr for ObjectHash {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| GitError::InvalidHashValue(s.to_string()))?;
        ObjectHash::from_bytes(&bytes)
    }
}

impl ObjectHash {
    /// All-zero id for a given hash kind, used on the wire for ref
    /// creation and deletion.
    pub fn zero(kind: HashKind) -> ObjectHash {
        match kind {
            HashKind::Sha1 => ObjectHash::Sha1([0u8; 20]),
            HashKind::Sha256 => ObjectHash::Sha256([0u8; 32]),
        }
    }

    /// Zero-filled hex string for a given hash kind.
    pub fn zero_str(kind: HashKind) -> String {
        ObjectHash::zero(kind).to_string()
    }

    /// Return the hash kind for this value.
    pub fn kind(&self) -> HashKind {
        match self {
            ObjectHash::Sha1(_) => HashKind::Sha1,
            ObjectHash::Sha256(_) => HashKind::Sha256,
        }
    }

    /// Return the hash size in bytes.
    pub fn size(&self) -> usize {
        self.kind().size()
    }

    /// True for the all-zero id of either width.
    pub fn is_zero(&self) -> bool {
        self.as_ref().iter().all(|b| *b == 0)
    }

    /// Compute the hash of raw data under the given kind.
    pub fn compute(kind: HashKind, data: &[u8]) -> ObjectHash {
        match kind {
            HashKind::Sha1 => {
                let digest = sha1::Sha1::digest(data);
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(digest.as_ref());
                ObjectHash::Sha1(bytes)
            }
            HashKind::Sha256 => {
                let digest = sha2::Sha256::digest(data);
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(digest.as_ref());
                ObjectHash::Sha256(bytes)
            }
        }
    }

    /// Compute an object id from its type and payload, prepending the
    /// canonical `<kind> <len>\0` header so callers never rebuild it.
    pub fn from_type_and_data(kind: HashKind, object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let mut buf: Vec<u8> = Vec::with_capacity(data.len() + 16);
        buf.extend(object_type.to_bytes());
        buf.push(b' ');
        buf.extend(data.len().to_string().as_bytes());
        buf.push(b'\x00');
        buf.extend(data);
        ObjectHash::compute(kind, &buf)
    }

    /// Create `ObjectHash` from raw bytes; the kind is inferred from the
    /// slice length (20 → SHA-1, 32 → SHA-256).
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectHash, GitError> {
        match bytes.len() {
            20 => {
                let mut h = [0u8; 20];
                h.copy_from_slice(bytes);
                Ok(ObjectHash::Sha1(h))
            }
            32 => {
                let mut h = [0u8; 32];
                h.copy_from_slice(bytes);
                Ok(ObjectHash::Sha256(h))
            }
            n => Err(GitError::InvalidHashValue(format!(
                "invalid id length {n}, expected 20 or 32 bytes"
            ))),
        }
    }

    /// Read hash bytes from a stream according to the given kind's size.
    pub fn from_stream(kind: HashKind, data: &mut impl io::Read) -> io::Result<ObjectHash> {
        match kind {
            HashKind::Sha1 => {
                let mut h = [0u8; 20];
                data.read_exact(&mut h)?;
                Ok(ObjectHash::Sha1(h))
            }
            HashKind::Sha256 => {
                let mut h = [0u8; 32];
                data.read_exact(&mut h)?;
                Ok(ObjectHash::Sha256(h))
            }
        }
    }

    /// Return raw bytes of the hash.
    pub fn to_data(self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}
