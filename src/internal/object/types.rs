//! Object type enumeration shared by the object database, pack codec,
//! and wire layers.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// The object kinds a pack entry can carry. Base kinds (`Blob`, `Tree`,
/// `Commit`, `Tag`) are content-addressed values; the two delta kinds
/// exist only inside packs and are resolved away during decode.
///
/// Pack headers assign each kind a 3-bit type id: commit 1, tree 2,
/// blob 3, tag 4, ofs-delta 6, ref-delta 7 (5 is reserved).
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tag => write!(f, "tag"),
            ObjectType::OfsDelta => write!(f, "ofs-delta"),
            ObjectType::RefDelta => write!(f, "ref-delta"),
        }
    }
}

impl ObjectType {
    /// True for the four content-addressed kinds.
    pub fn is_base(&self) -> bool {
        !matches!(self, ObjectType::OfsDelta | ObjectType::RefDelta)
    }

    /// The ASCII name written into loose-object headers. Delta kinds have
    /// no header form; calling this for one is a programming error caught
    /// by the pack encoder beforehand.
    pub fn to_bytes(&self) -> &'static [u8] {
        match self {
            ObjectType::Commit => COMMIT_OBJECT_TYPE,
            ObjectType::Tree => TREE_OBJECT_TYPE,
            ObjectType::Blob => BLOB_OBJECT_TYPE,
            ObjectType::Tag => TAG_OBJECT_TYPE,
            ObjectType::OfsDelta | ObjectType::RefDelta => {
                panic!("delta kinds have no canonical header name")
            }
        }
    }

    /// Parse a loose-object header name.
    pub fn from_object_name(name: &str) -> Result<ObjectType, GitError> {
        match name {
            "commit" => Ok(ObjectType::Commit),
            "tree" => Ok(ObjectType::Tree),
            "blob" => Ok(ObjectType::Blob),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(name.to_string())),
        }
    }

    /// Convert to the 3-bit pack header type id.
    pub fn to_pack_type(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
            ObjectType::OfsDelta => 6,
            ObjectType::RefDelta => 7,
        }
    }

    /// Decode a 3-bit pack header type id.
    pub fn from_pack_type(number: u8) -> Result<ObjectType, GitError> {
        match number {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OfsDelta),
            7 => Ok(ObjectType::RefDelta),
            _ => Err(GitError::InvalidObjectType(format!(
                "invalid pack object type number: {number}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectType;

    /// Pack type ids round-trip for every encodable kind.
    #[test]
    fn pack_type_round_trip() {
        for ty in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
            ObjectType::OfsDelta,
            ObjectType::RefDelta,
        ] {
            assert_eq!(ObjectType::from_pack_type(ty.to_pack_type()).unwrap(), ty);
        }
        assert!(ObjectType::from_pack_type(5).is_err());
        assert!(ObjectType::from_pack_type(0).is_err());
    }

    /// Header names match the canonical ASCII forms.
    #[test]
    fn header_names() {
        assert_eq!(ObjectType::Blob.to_bytes(), b"blob");
        assert_eq!(
            ObjectType::from_object_name("commit").unwrap(),
            ObjectType::Commit
        );
        assert!(ObjectType::from_object_name("snapshot").is_err());
    }
}
