//! The Tag object is an annotated pointer: target object id and kind,
//! tag name, tagger signature, and a message.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::{
    errors::GitError,
    hash::{HashKind, ObjectHash},
    internal::object::{ObjectTrait, signature::Signature, types::ObjectType},
};

#[derive(Eq, Debug, Clone)]
pub struct Tag {
    pub id: ObjectHash,
    pub object_id: ObjectHash,
    pub object_type: ObjectType,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "object {}", self.object_id)?;
        writeln!(f, "type {}", self.object_type)?;
        writeln!(f, "tag {}", self.tag_name)?;
        writeln!(f, "tagger {}", self.tagger)?;
        writeln!(f)?;
        write!(f, "{}", self.message)
    }
}

impl Tag {
    pub fn new(
        kind: HashKind,
        object_id: ObjectHash,
        object_type: ObjectType,
        tag_name: String,
        tagger: Signature,
        message: &str,
    ) -> Result<Tag, GitError> {
        let mut message = message.to_string();
        if !message.ends_with('\n') {
            message.push('\n');
        }
        let mut tag = Tag {
            id: ObjectHash::zero(kind),
            object_id,
            object_type,
            tag_name,
            tagger,
            message,
        };
        tag.id = tag.object_hash(kind)?;
        Ok(tag)
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let mut object_id: Option<ObjectHash> = None;
        let mut object_type: Option<ObjectType> = None;
        let mut tag_name: Option<String> = None;
        let mut tagger: Option<Signature> = None;

        let mut rest = data;
        loop {
            let line_end = rest
                .find_byte(b'\n')
                .ok_or_else(|| GitError::InvalidTagObject("missing message separator".into()))?;
            let line = &rest[..line_end];
            rest = &rest[line_end + 1..];
            if line.is_empty() {
                break;
            }

            let key_end = line.find_byte(b' ').unwrap_or(line.len());
            let value = std::str::from_utf8(&line[(key_end + 1).min(line.len())..])
                .map_err(|e| GitError::ConversionError(e.to_string()))?;
            match &line[..key_end] {
                b"object" => object_id = Some(ObjectHash::from_str(value)?),
                b"type" => object_type = Some(ObjectType::from_object_name(value)?),
                b"tag" => tag_name = Some(value.to_string()),
                b"tagger" => tagger = Some(Signature::from_data(line.to_vec())?),
                _ => {}
            }
        }

        Ok(Tag {
            id: hash,
            object_id: object_id
                .ok_or_else(|| GitError::InvalidTagObject("missing object header".into()))?,
            object_type: object_type
                .ok_or_else(|| GitError::InvalidTagObject("missing type header".into()))?,
            tag_name: tag_name
                .ok_or_else(|| GitError::InvalidTagObject("missing tag header".into()))?,
            tagger: tagger
                .ok_or_else(|| GitError::InvalidTagObject("missing tagger header".into()))?,
            message: String::from_utf8_lossy(rest).to_string(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(b"object ");
        data.extend(self.object_id.to_string().as_bytes());
        data.push(b'\n');
        data.extend(b"type ");
        data.extend(self.object_type.to_bytes());
        data.push(b'\n');
        data.extend(b"tag ");
        data.extend(self.tag_name.as_bytes());
        data.push(b'\n');
        data.extend(self.tagger.to_data()?);
        data.push(b'\n');
        data.push(b'\n');
        data.extend(self.message.as_bytes());
        Ok(data)
    }
}
