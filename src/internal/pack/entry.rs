//! Lightweight representation of a decoded Git object coming out of a
//! pack stream, with helpers to convert to and from strongly typed
//! objects.

use std::hash::{Hash, Hasher};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{GitObject, ObjectTrait, types::ObjectType},
};

/// One resolved pack object: kind, payload bytes, and id.
#[derive(Eq, Clone, Debug)]
pub struct Entry {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
    pub hash: ObjectHash,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.obj_type == other.obj_type && self.hash == other.hash
    }
}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.obj_type.hash(state);
        self.hash.hash(state);
    }
}

impl Entry {
    pub fn new(obj_type: ObjectType, data: Vec<u8>, hash: ObjectHash) -> Entry {
        Entry {
            obj_type,
            data,
            hash,
        }
    }

    /// Serialize a typed object into pack-entry form.
    pub fn from_object(object: &GitObject) -> Result<Entry, GitError> {
        Ok(Entry {
            obj_type: object.get_type(),
            data: object.to_data()?,
            hash: object.id(),
        })
    }

    /// Parse the payload back into a typed object.
    pub fn to_object(&self) -> Result<GitObject, GitError> {
        GitObject::parse(self.obj_type, &self.data, self.hash)
    }
}
