//! Smart-protocol vocabulary: services, capabilities, the negotiated
//! capability record, side-band channels, and ref advertisements.

use std::fmt;
use std::str::FromStr;

use crate::errors::GitError;

/// Git service types for the smart protocol.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ServiceType {
    UploadPack,
    ReceivePack,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceType::UploadPack => write!(f, "git-upload-pack"),
            ServiceType::ReceivePack => write!(f, "git-receive-pack"),
        }
    }
}

impl FromStr for ServiceType {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git-upload-pack" => Ok(ServiceType::UploadPack),
            "git-receive-pack" => Ok(ServiceType::ReceivePack),
            _ => Err(GitError::ProtocolError(format!("invalid service `{s}`"))),
        }
    }
}

/// Individual protocol capabilities, as spelled on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    MultiAck,
    MultiAckDetailed,
    NoDone,
    SideBand,
    SideBand64k,
    ReportStatus,
    DeleteRefs,
    OfsDelta,
    ThinPack,
    Shallow,
    IncludeTag,
    NoProgress,
    Atomic,
    ObjectFormat(String),
    Agent(String),
    /// Anything we do not model; kept verbatim for forward compatibility.
    Unknown(String),
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("agent=") {
            return Ok(Capability::Agent(rest.to_string()));
        }
        if let Some(rest) = s.strip_prefix("object-format=") {
            return Ok(Capability::ObjectFormat(rest.to_string()));
        }
        match s {
            "multi_ack" => Ok(Capability::MultiAck),
            "multi_ack_detailed" => Ok(Capability::MultiAckDetailed),
            "no-done" => Ok(Capability::NoDone),
            "side-band" => Ok(Capability::SideBand),
            "side-band-64k" => Ok(Capability::SideBand64k),
            "report-status" => Ok(Capability::ReportStatus),
            "delete-refs" => Ok(Capability::DeleteRefs),
            "ofs-delta" => Ok(Capability::OfsDelta),
            "thin-pack" => Ok(Capability::ThinPack),
            "shallow" => Ok(Capability::Shallow),
            "include-tag" => Ok(Capability::IncludeTag),
            "no-progress" => Ok(Capability::NoProgress),
            "atomic" => Ok(Capability::Atomic),
            _ => Ok(Capability::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::MultiAck => write!(f, "multi_ack"),
            Capability::MultiAckDetailed => write!(f, "multi_ack_detailed"),
            Capability::NoDone => write!(f, "no-done"),
            Capability::SideBand => write!(f, "side-band"),
            Capability::SideBand64k => write!(f, "side-band-64k"),
            Capability::ReportStatus => write!(f, "report-status"),
            Capability::DeleteRefs => write!(f, "delete-refs"),
            Capability::OfsDelta => write!(f, "ofs-delta"),
            Capability::ThinPack => write!(f, "thin-pack"),
            Capability::Shallow => write!(f, "shallow"),
            Capability::IncludeTag => write!(f, "include-tag"),
            Capability::NoProgress => write!(f, "no-progress"),
            Capability::Atomic => write!(f, "atomic"),
            Capability::ObjectFormat(format) => write!(f, "object-format={format}"),
            Capability::Agent(agent) => write!(f, "agent={agent}"),
            Capability::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// The per-connection capability record built from a server
/// advertisement. All later code branches on these fields rather than
/// re-matching strings.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    pub multi_ack: bool,
    pub multi_ack_detailed: bool,
    pub side_band: bool,
    pub side_band_64k: bool,
    pub ofs_delta: bool,
    pub thin_pack: bool,
    pub shallow: bool,
    pub no_progress: bool,
    pub include_tag: bool,
    pub report_status: bool,
    pub delete_refs: bool,
    pub object_format: Option<String>,
    pub agent: Option<String>,
}

impl CapabilitySet {
    /// Parse the space-separated capability tail of an advertisement.
    pub fn parse(tail: &str) -> CapabilitySet {
        let mut set = CapabilitySet::default();
        for word in tail.split_whitespace() {
            match Capability::from_str(word).expect("capability parse is total") {
                Capability::MultiAck => set.multi_ack = true,
                Capability::MultiAckDetailed => set.multi_ack_detailed = true,
                Capability::SideBand => set.side_band = true,
                Capability::SideBand64k => set.side_band_64k = true,
                Capability::OfsDelta => set.ofs_delta = true,
                Capability::ThinPack => set.thin_pack = true,
                Capability::Shallow => set.shallow = true,
                Capability::NoProgress => set.no_progress = true,
                Capability::IncludeTag => set.include_tag = true,
                Capability::ReportStatus => set.report_status = true,
                Capability::DeleteRefs => set.delete_refs = true,
                Capability::ObjectFormat(format) => set.object_format = Some(format),
                Capability::Agent(agent) => set.agent = Some(agent),
                Capability::NoDone | Capability::Atomic | Capability::Unknown(_) => {}
            }
        }
        set
    }

    /// Capabilities this client enables on a fetch, given what the
    /// server advertised. When both multi-ack variants are offered only
    /// the detailed one is enabled, per the protocol specification.
    pub fn enable_for_fetch(&self, want_depth: bool, quiet: bool) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.multi_ack_detailed {
            caps.push(Capability::MultiAckDetailed);
        } else if self.multi_ack {
            caps.push(Capability::MultiAck);
        }
        if self.side_band_64k {
            caps.push(Capability::SideBand64k);
        } else if self.side_band {
            caps.push(Capability::SideBand);
        }
        if self.ofs_delta {
            caps.push(Capability::OfsDelta);
        }
        if self.thin_pack {
            caps.push(Capability::ThinPack);
        }
        if want_depth && self.shallow {
            caps.push(Capability::Shallow);
        }
        if quiet && self.no_progress {
            caps.push(Capability::NoProgress);
        }
        caps
    }

    /// Capabilities this client enables on a push.
    pub fn enable_for_push(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.report_status {
            caps.push(Capability::ReportStatus);
        }
        if self.delete_refs {
            caps.push(Capability::DeleteRefs);
        }
        caps
    }

    /// True when any side-band variant was negotiated.
    pub fn any_side_band(&self) -> bool {
        self.side_band || self.side_band_64k
    }
}

/// Side-band channels multiplexed over one response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideBand {
    /// Channel 1 carries packfile bytes.
    PackData,
    /// Channel 2 carries progress text.
    Progress,
    /// Channel 3 carries a fatal error message.
    Fatal,
}

impl SideBand {
    pub fn from_byte(byte: u8) -> Option<SideBand> {
        match byte {
            1 => Some(SideBand::PackData),
            2 => Some(SideBand::Progress),
            3 => Some(SideBand::Fatal),
            _ => None,
        }
    }
}

/// One advertised remote ref. Ids stay hex text until the caller knows
/// the remote's hash width matches the local repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub id_hex: String,
}

/// Parsed `info/refs` advertisement.
#[derive(Debug, Clone, Default)]
pub struct RefDiscovery {
    pub refs: Vec<RemoteRef>,
    pub capabilities: CapabilitySet,
}

impl RefDiscovery {
    pub fn find(&self, name: &str) -> Option<&RemoteRef> {
        self.refs.iter().find(|r| r.name == name)
    }
}

/// Progress callback invoked with channel-2 text during fetch/push.
pub type ProgressSink = Box<dyn Fn(&str) + Send + Sync>;
