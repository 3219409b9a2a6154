//! Repository configuration: a git-config text codec for the `config`
//! storage key plus engine tuning knobs.
//!
//! Recognized keys are `core.hashAlgorithm`, `core.bare`, `user.name`,
//! `user.email`, `remote.<name>.url`, `remote.<name>.fetch`,
//! `branch.<name>.remote`, and `branch.<name>.merge`. Unknown keys are
//! preserved on rewrite but otherwise ignored.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{errors::GitError, hash::HashKind};

/// Engine tuning knobs, independent of the per-repository config text.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineConfig {
    /// Bound on the deserialized-object cache, in entries.
    pub object_cache_entries: usize,
    /// Cooperative yield interval for pack decode and tree walks.
    pub yield_every: usize,
    /// `have` lines sent per negotiation round during fetch.
    pub negotiation_batch: usize,
    /// Bounded retries for ref updates that lose a compare-and-set race.
    pub ref_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            object_cache_entries: 4096,
            yield_every: 256,
            negotiation_batch: 32,
            ref_retry_limit: 3,
        }
    }
}

/// One `[section]` or `[section "subsection"]` block with its key/value
/// entries in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSection {
    pub name: String,
    pub subsection: Option<String>,
    pub entries: Vec<(String, String)>,
}

impl ConfigSection {
    fn matches(&self, name: &str, subsection: Option<&str>) -> bool {
        self.name.eq_ignore_ascii_case(name) && self.subsection.as_deref() == subsection
    }
}

/// Parsed repository configuration. Section and entry order is retained
/// so a rewrite round-trips unrecognized content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: Vec<ConfigSection>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse git-config text. Blank lines and `#`/`;` comments are
    /// skipped; values keep inner whitespace and drop surrounding quotes.
    pub fn parse(text: &str) -> Result<Config, GitError> {
        let mut sections: Vec<ConfigSection> = Vec::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(heading) = line.strip_prefix('[') {
                let heading = heading.strip_suffix(']').ok_or_else(|| {
                    GitError::InvalidConfig(format!("unterminated section header `{line}`"))
                })?;
                let (name, subsection) = match heading.split_once(' ') {
                    Some((name, sub)) => {
                        let sub = sub.trim();
                        let sub = sub
                            .strip_prefix('"')
                            .and_then(|s| s.strip_suffix('"'))
                            .ok_or_else(|| {
                                GitError::InvalidConfig(format!(
                                    "subsection must be quoted in `{line}`"
                                ))
                            })?;
                        (name.to_string(), Some(sub.to_string()))
                    }
                    None => (heading.to_string(), None),
                };
                sections.push(ConfigSection {
                    name: name.to_ascii_lowercase(),
                    subsection,
                    entries: Vec::new(),
                });
            } else {
                let section = sections.last_mut().ok_or_else(|| {
                    GitError::InvalidConfig(format!("entry `{line}` before any section"))
                })?;
                let (key, value) = match line.split_once('=') {
                    Some((key, value)) => (key.trim().to_string(), value.trim()),
                    // A bare key is shorthand for `key = true`.
                    None => (line.to_string(), "true"),
                };
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                section.entries.push((key, value.to_string()));
            }
        }
        Ok(Config { sections })
    }

    /// Serialize back to git-config text, preserving unknown sections and
    /// keys in their original order.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            match &section.subsection {
                Some(sub) => out.push_str(&format!("[{} \"{}\"]\n", section.name, sub)),
                None => out.push_str(&format!("[{}]\n", section.name)),
            }
            for (key, value) in &section.entries {
                out.push_str(&format!("\t{key} = {value}\n"));
            }
        }
        out
    }

    /// Look up a single value by section/subsection/key.
    pub fn get(&self, name: &str, subsection: Option<&str>, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.matches(name, subsection))
            .and_then(|s| {
                s.entries
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v.as_str())
            })
    }

    /// Insert or replace a value, creating the section on demand.
    pub fn set(&mut self, name: &str, subsection: Option<&str>, key: &str, value: &str) {
        let section = match self.sections.iter_mut().find(|s| s.matches(name, subsection)) {
            Some(section) => section,
            None => {
                self.sections.push(ConfigSection {
                    name: name.to_ascii_lowercase(),
                    subsection: subsection.map(|s| s.to_string()),
                    entries: Vec::new(),
                });
                self.sections.last_mut().expect("just pushed")
            }
        };
        match section
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some((_, v)) => *v = value.to_string(),
            None => section.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Remove a key; drops the section once it becomes empty.
    pub fn unset(&mut self, name: &str, subsection: Option<&str>, key: &str) {
        if let Some(pos) = self.sections.iter().position(|s| s.matches(name, subsection)) {
            self.sections[pos]
                .entries
                .retain(|(k, _)| !k.eq_ignore_ascii_case(key));
            if self.sections[pos].entries.is_empty() {
                self.sections.remove(pos);
            }
        }
    }

    /// `core.hashAlgorithm`, defaulting to SHA-1 when absent.
    pub fn hash_kind(&self) -> Result<HashKind, GitError> {
        match self.get("core", None, "hashAlgorithm") {
            Some(v) => HashKind::from_str(v),
            None => Ok(HashKind::Sha1),
        }
    }

    /// `core.bare`, defaulting to false.
    pub fn is_bare(&self) -> bool {
        self.get("core", None, "bare") == Some("true")
    }

    /// `user.name` / `user.email` fallbacks for commit signatures.
    pub fn user(&self) -> (Option<&str>, Option<&str>) {
        (
            self.get("user", None, "name"),
            self.get("user", None, "email"),
        )
    }

    /// `remote.<name>.url`.
    pub fn remote_url(&self, remote: &str) -> Option<&str> {
        self.get("remote", Some(remote), "url")
    }

    /// `remote.<name>.fetch` refspec.
    pub fn remote_fetch(&self, remote: &str) -> Option<&str> {
        self.get("remote", Some(remote), "fetch")
    }

    /// Upstream tracking: `branch.<name>.remote` and `branch.<name>.merge`.
    pub fn branch_upstream(&self, branch: &str) -> Option<(&str, &str)> {
        let remote = self.get("branch", Some(branch), "remote")?;
        let merge = self.get("branch", Some(branch), "merge")?;
        Some((remote, merge))
    }
}
