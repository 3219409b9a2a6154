//! The Commit object records one version of the project: a root tree,
//! zero or more parents (zero for a root commit, two or more for a
//! merge), author and committer signatures, and a UTF-8 message that
//! always ends in a newline.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::{
    errors::GitError,
    hash::{HashKind, ObjectHash},
    internal::object::{
        ObjectTrait,
        signature::{Signature, SignatureRole},
        types::ObjectType,
    },
};

#[derive(Eq, Debug, Clone)]
pub struct Commit {
    pub id: ObjectHash,
    pub tree_id: ObjectHash,
    pub parent_ids: Vec<ObjectHash>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "commit {}", self.id)?;
        writeln!(f, "tree {}", self.tree_id)?;
        for parent in &self.parent_ids {
            writeln!(f, "parent {parent}")?;
        }
        writeln!(f, "author {}", self.author)?;
        writeln!(f, "committer {}", self.committer)?;
        writeln!(f)?;
        write!(f, "{}", self.message)
    }
}

impl Commit {
    /// Assemble and hash a commit. A trailing newline is appended to the
    /// message if absent so serialized commits always end in one.
    pub fn new(
        kind: HashKind,
        author: Signature,
        committer: Signature,
        tree_id: ObjectHash,
        parent_ids: Vec<ObjectHash>,
        message: &str,
    ) -> Result<Commit, GitError> {
        let mut message = message.to_string();
        if !message.ends_with('\n') {
            message.push('\n');
        }
        let mut commit = Commit {
            id: ObjectHash::zero(kind),
            tree_id,
            parent_ids,
            author,
            committer,
            message,
        };
        commit.id = commit.object_hash(kind)?;
        Ok(commit)
    }

    /// First non-empty message line, for log rendering.
    pub fn summary(&self) -> &str {
        self.message
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
    }

    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

impl ObjectTrait for Commit {
    /// Parse the header block (`tree`, `parent`*, `author`, `committer`,
    /// then any headers we do not model, such as signatures with their
    /// space-continued lines) up to the first blank line; the rest is
    /// the message.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let mut tree_id: Option<ObjectHash> = None;
        let mut parent_ids: Vec<ObjectHash> = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;

        let mut rest = data;
        loop {
            let line_end = rest
                .find_byte(b'\n')
                .ok_or_else(|| GitError::InvalidCommitObject("missing message separator".into()))?;
            let line = &rest[..line_end];
            rest = &rest[line_end + 1..];

            if line.is_empty() {
                break;
            }
            if line[0] == b' ' {
                // Continuation of a header we do not model.
                continue;
            }

            let key_end = line.len().min(line.find_byte(b' ').unwrap_or(line.len()));
            let value = &line[(key_end + 1).min(line.len())..];
            match &line[..key_end] {
                b"tree" => {
                    let hex = std::str::from_utf8(value)
                        .map_err(|e| GitError::ConversionError(e.to_string()))?;
                    tree_id = Some(ObjectHash::from_str(hex)?);
                }
                b"parent" => {
                    let hex = std::str::from_utf8(value)
                        .map_err(|e| GitError::ConversionError(e.to_string()))?;
                    parent_ids.push(ObjectHash::from_str(hex)?);
                }
                b"author" => author = Some(Signature::from_data(line.to_vec())?),
                b"committer" => committer = Some(Signature::from_data(line.to_vec())?),
                _ => {} // gpgsig, encoding, … — preserved only as raw bytes
            }
        }

        let message = String::from_utf8_lossy(rest).to_string();
        Ok(Commit {
            id: hash,
            tree_id: tree_id
                .ok_or_else(|| GitError::InvalidCommitObject("missing tree header".into()))?,
            parent_ids,
            author: author
                .ok_or_else(|| GitError::InvalidCommitObject("missing author header".into()))?,
            committer: committer
                .ok_or_else(|| GitError::InvalidCommitObject("missing committer header".into()))?,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(b"tree ");
        data.extend(self.tree_id.to_string().as_bytes());
        data.push(b'\n');
        for parent in &self.parent_ids {
            data.extend(b"parent ");
            data.extend(parent.to_string().as_bytes());
            data.push(b'\n');
        }
        data.extend(self.author.to_data()?);
        data.push(b'\n');
        data.extend(self.committer.to_data()?);
        data.push(b'\n');
        data.push(b'\n');
        data.extend(self.message.as_bytes());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(role: SignatureRole) -> Signature {
        Signature::new(role, "Ada".to_string(), "a@x".to_string(), 1700000000, 0)
    }

    fn tree_id() -> ObjectHash {
        ObjectHash::from_str("7d4a466af82cd6857c85c0296d5c23fc68cba887").unwrap()
    }

    /// Round-trip: serialize then parse reproduces every field, and the
    /// stored id matches the recomputed one.
    #[test]
    fn round_trip() {
        let commit = Commit::new(
            HashKind::Sha1,
            sig(SignatureRole::Author),
            sig(SignatureRole::Committer),
            tree_id(),
            vec![],
            "init",
        )
        .unwrap();
        assert!(commit.message.ends_with('\n'));

        let data = commit.to_data().unwrap();
        let parsed = Commit::from_bytes(&data, commit.id).unwrap();
        assert_eq!(parsed.tree_id, commit.tree_id);
        assert_eq!(parsed.parent_ids, commit.parent_ids);
        assert_eq!(parsed.author, commit.author);
        assert_eq!(parsed.message, "init\n");
        assert_eq!(parsed.object_hash(HashKind::Sha1).unwrap(), commit.id);
    }

    /// Merge commits keep both parents in order.
    #[test]
    fn merge_parents_preserved() {
        let p1 = ObjectHash::compute(HashKind::Sha1, b"p1");
        let p2 = ObjectHash::compute(HashKind::Sha1, b"p2");
        let commit = Commit::new(
            HashKind::Sha1,
            sig(SignatureRole::Author),
            sig(SignatureRole::Committer),
            tree_id(),
            vec![p1, p2],
            "merge topic into main\n",
        )
        .unwrap();
        assert!(commit.is_merge());
        let parsed = Commit::from_bytes(&commit.to_data().unwrap(), commit.id).unwrap();
        assert_eq!(parsed.parent_ids, vec![p1, p2]);
    }

    /// Unmodeled headers (gpgsig with continuation lines) are skipped
    /// without corrupting the parsed message.
    #[test]
    fn skips_unknown_headers() {
        let raw = b"tree 7d4a466af82cd6857c85c0296d5c23fc68cba887\n\
author Ada <a@x> 1700000000 +0000\n\
committer Ada <a@x> 1700000000 +0000\n\
gpgsig -----BEGIN PGP SIGNATURE-----\n\
 abcdef\n\
 -----END PGP SIGNATURE-----\n\
\n\
signed change\n";
        let hash = ObjectHash::from_type_and_data(HashKind::Sha1, ObjectType::Commit, raw);
        let commit = Commit::from_bytes(raw, hash).unwrap();
        assert_eq!(commit.message, "signed change\n");
        assert_eq!(commit.author.name, "Ada");
        assert!(commit.parent_ids.is_empty());
    }

    /// Missing headers are structural errors.
    #[test]
    fn missing_headers_rejected() {
        let raw = b"author Ada <a@x> 1 +0000\ncommitter Ada <a@x> 1 +0000\n\nno tree\n";
        let hash = ObjectHash::compute(HashKind::Sha1, raw);
        assert!(matches!(
            Commit::from_bytes(raw, hash),
            Err(GitError::InvalidCommitObject(_))
        ));
    }

    /// summary picks the first non-empty line.
    #[test]
    fn summary_line() {
        let commit = Commit::new(
            HashKind::Sha1,
            sig(SignatureRole::Author),
            sig(SignatureRole::Committer),
            tree_id(),
            vec![],
            "\nfix: the actual title\n\nbody\n",
        )
        .unwrap();
        assert_eq!(commit.summary(), "fix: the actual title");
    }
}
