//! Error types for the git-embed crate.
//!
//! This module defines a unified error enumeration used across object
//! parsing, the object database, the staging index, repository operations,
//! and the wire protocol. It integrates with `thiserror` to provide rich
//! `Display` implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Errors are values, never control-flow side effects; callers
//!   pattern-match on the variant.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the git-embed library.
///
/// - Used across object parsing, pack encode/decode, index, refs,
///   repository operations, and the smart-HTTP client.
/// - Implements `std::error::Error` via `thiserror`.
pub enum GitError {
    /// Requested key, object, ref, or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Creation target already exists (branch, tag, repository).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Stored bytes failed structural validation.
    #[error("corrupt object data: {0}")]
    Corrupt(String),

    /// Recomputed object id disagrees with the id it was stored under.
    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Delta entry references a base object that is nowhere to be found.
    #[error("missing delta base: {0}")]
    MissingBase(String),

    /// Malformed or unsupported pack file.
    #[error("invalid pack file: {0}")]
    InvalidPackfile(String),

    /// Malformed ref name or ref content.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// A compare-and-set ref update observed a different current value.
    #[error("ref update lost race on {0}")]
    RefRaceLost(String),

    /// Checkout or merge would overwrite unsaved working-tree content.
    #[error("working tree has unsaved changes at {0}")]
    WorkingTreeDirty(String),

    /// An operation that requires a clean merge hit conflicts.
    #[error("merge produced conflicts in: {}", .0.join(", "))]
    MergeConflict(Vec<String>),

    /// The server demands credentials and none (or a callback) was given.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// Presented credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Transport-level failure (DNS, connect, reset).
    #[error("network error: {0}")]
    NetworkError(String),

    /// Overall or per-request deadline exceeded.
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    /// Cross-origin rejection, distinguished so UIs can suggest a proxy.
    #[error("cross-origin request blocked: {0}")]
    Cors(String),

    /// Backend storage refused a write for lack of space.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The remote spoke something other than the smart protocol.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The operation's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Backend storage failed in a backend-specific way.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The storage backend does not implement an optional operation.
    #[error("operation not supported by backend: {0}")]
    NotSupported(String),

    /// Invalid or unsupported git object type name.
    #[error("`{0}` is not a valid git object type")]
    InvalidObjectType(String),

    /// Malformed tree object.
    #[error("not a valid git tree object: {0}")]
    InvalidTreeObject(String),

    /// Invalid tree entry (mode/name/hash).
    #[error("`{0}` is not a valid git tree entry")]
    InvalidTreeEntry(String),

    /// Invalid commit signature line.
    #[error("`{0}` is not a valid signature line")]
    InvalidSignature(String),

    /// Malformed commit object.
    #[error("not a valid git commit object: {0}")]
    InvalidCommitObject(String),

    /// Malformed tag object.
    #[error("not a valid git tag object: {0}")]
    InvalidTagObject(String),

    /// Malformed or unsupported staging index bytes.
    #[error("invalid index data: {0}")]
    InvalidIndex(String),

    /// Invalid object hash formatting or value.
    #[error("`{0}` is not a valid object hash")]
    InvalidHashValue(String),

    /// Delta stream reconstruction error.
    #[error("delta error: {0}")]
    DeltaError(String),

    /// Failed to encode pack entries.
    #[error("cannot encode entries to pack: {0}")]
    PackEncodeError(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid CLI or function argument.
    #[error("argument parse failed: {0}")]
    InvalidArgument(String),

    /// I/O error from an in-memory reader or writer.
    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    /// Text encoding or UTF-8 conversion error.
    #[error("utf-8 conversion error: {0}")]
    ConversionError(String),
}

impl GitError {
    /// True when retrying the operation with fresh reads may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitError::RefRaceLost(_) | GitError::AuthRequired(_))
    }
}
