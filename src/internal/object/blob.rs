//! The Blob object stores opaque file content. Its identity is the hash
//! of `blob <len>\0` concatenated with the content; the payload itself is
//! the content, untouched.

use std::fmt::Display;

use crate::{
    errors::GitError,
    hash::{HashKind, ObjectHash},
    internal::object::{ObjectTrait, types::ObjectType},
};

#[derive(Eq, Debug, Clone)]
pub struct Blob {
    pub id: ObjectHash,
    pub data: Vec<u8>,
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "blob {}", self.id)
    }
}

impl Blob {
    /// Hash content under the given kind and wrap it as a blob.
    pub fn from_content(kind: HashKind, content: &[u8]) -> Blob {
        Blob {
            id: ObjectHash::from_type_and_data(kind, ObjectType::Blob, content),
            data: content.to_vec(),
        }
    }

    /// Content as UTF-8 when it is valid text.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        Ok(Blob {
            id: hash,
            data: data.to_vec(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(self.data.clone())
    }
}
