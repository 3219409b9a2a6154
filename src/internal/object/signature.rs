//! Author/committer/tagger signature lines: name, email, timestamp, and
//! timezone offset, in the canonical `<role> <name> <email> <secs> <tz>`
//! byte form shared by commits and tags.

use std::fmt::Display;

use bstr::ByteSlice;

use crate::errors::GitError;

/// Which header line the signature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRole {
    Author,
    Committer,
    Tagger,
}

impl SignatureRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureRole::Author => "author",
            SignatureRole::Committer => "committer",
            SignatureRole::Tagger => "tagger",
        }
    }

    fn from_str(s: &str) -> Result<SignatureRole, GitError> {
        match s {
            "author" => Ok(SignatureRole::Author),
            "committer" => Ok(SignatureRole::Committer),
            "tagger" => Ok(SignatureRole::Tagger),
            _ => Err(GitError::InvalidSignature(s.to_string())),
        }
    }
}

/// One signature line. The timezone offset is stored in minutes east of
/// UTC and rendered as `±HHMM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub role: SignatureRole,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub tz_offset_minutes: i32,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp,
            format_tz(self.tz_offset_minutes)
        )
    }
}

fn format_tz(offset_minutes: i32) -> String {
    let sign = if offset_minutes < 0 { '-' } else { '+' };
    let abs = offset_minutes.unsigned_abs();
    format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
}

fn parse_tz(s: &str) -> Result<i32, GitError> {
    if s.len() != 5 {
        return Err(GitError::InvalidSignature(format!("bad timezone `{s}`")));
    }
    let sign = match s.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err(GitError::InvalidSignature(format!("bad timezone `{s}`"))),
    };
    let hours: i32 = s[1..3]
        .parse()
        .map_err(|_| GitError::InvalidSignature(format!("bad timezone `{s}`")))?;
    let minutes: i32 = s[3..5]
        .parse()
        .map_err(|_| GitError::InvalidSignature(format!("bad timezone `{s}`")))?;
    Ok(sign * (hours * 60 + minutes))
}

impl Signature {
    pub fn new(
        role: SignatureRole,
        name: String,
        email: String,
        timestamp: i64,
        tz_offset_minutes: i32,
    ) -> Signature {
        Signature {
            role,
            name,
            email,
            timestamp,
            tz_offset_minutes,
        }
    }

    /// A signature stamped with the current UTC time.
    pub fn now(role: SignatureRole, name: String, email: String) -> Signature {
        Signature::new(role, name, email, chrono::Utc::now().timestamp(), 0)
    }

    /// Parse a full header line, e.g.
    /// `author Ada <a@x> 1757467768 +0800`.
    pub fn from_data(data: Vec<u8>) -> Result<Signature, GitError> {
        let line = data.as_slice();
        let role_end = line
            .find_byte(b' ')
            .ok_or_else(|| GitError::InvalidSignature(String::from_utf8_lossy(line).to_string()))?;
        let role = SignatureRole::from_str(
            std::str::from_utf8(&line[..role_end])
                .map_err(|e| GitError::ConversionError(e.to_string()))?,
        )?;

        let rest = &line[role_end + 1..];
        let email_open = rest
            .find_byte(b'<')
            .ok_or_else(|| GitError::InvalidSignature("missing `<` in signature".to_string()))?;
        let email_close = rest
            .find_byte(b'>')
            .ok_or_else(|| GitError::InvalidSignature("missing `>` in signature".to_string()))?;
        if email_close < email_open {
            return Err(GitError::InvalidSignature("malformed email".to_string()));
        }

        let name = String::from_utf8_lossy(rest[..email_open].trim())
            .to_string();
        let email = String::from_utf8_lossy(&rest[email_open + 1..email_close]).to_string();

        let tail = std::str::from_utf8(rest[email_close + 1..].trim())
            .map_err(|e| GitError::ConversionError(e.to_string()))?;
        let mut parts = tail.split(' ');
        let timestamp: i64 = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| GitError::InvalidSignature(format!("bad timestamp in `{tail}`")))?;
        let tz_offset_minutes = match parts.next() {
            Some(tz) => parse_tz(tz)?,
            None => 0,
        };

        Ok(Signature {
            role,
            name,
            email,
            timestamp,
            tz_offset_minutes,
        })
    }

    /// Serialize to the canonical header line bytes.
    pub fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(format!("{} {}", self.role.as_str(), self).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canonical line round-trips through parse and serialize.
    #[test]
    fn round_trip() {
        let line = b"author Ada Lovelace <ada@analytical.engine> 1757467768 +0800".to_vec();
        let sig = Signature::from_data(line.clone()).unwrap();
        assert_eq!(sig.role, SignatureRole::Author);
        assert_eq!(sig.name, "Ada Lovelace");
        assert_eq!(sig.email, "ada@analytical.engine");
        assert_eq!(sig.timestamp, 1757467768);
        assert_eq!(sig.tz_offset_minutes, 8 * 60);
        assert_eq!(sig.to_data().unwrap(), line);
    }

    /// Negative offsets render with a minus sign and odd minutes survive.
    #[test]
    fn negative_and_fractional_zones() {
        let sig = Signature::new(
            SignatureRole::Committer,
            "t".into(),
            "t@x".into(),
            0,
            -(5 * 60 + 30),
        );
        let data = sig.to_data().unwrap();
        assert!(data.ends_with(b"0 -0530"));
        let parsed = Signature::from_data(data).unwrap();
        assert_eq!(parsed.tz_offset_minutes, -330);
    }

    /// Malformed lines surface InvalidSignature.
    #[test]
    fn malformed_lines_rejected() {
        assert!(Signature::from_data(b"author no-email 1 +0000".to_vec()).is_err());
        assert!(Signature::from_data(b"narrator A <a@x> 1 +0000".to_vec()).is_err());
        assert!(Signature::from_data(b"author A <a@x> notanumber +0000".to_vec()).is_err());
    }
}
