//! Pack file encoder and decoder that faithfully follow the
//! [pack-format spec](https://git-scm.com/docs/pack-format): `PACK`
//! header, type/size varint entry headers, ofs/ref delta entries with
//! deflated payloads, and a trailing hash over everything before it.

pub mod decode;
pub mod encode;
pub mod entry;
pub mod wrapper;

use crate::hash::ObjectHash;
use entry::Entry;

/// Supported pack stream version.
pub const PACK_VERSION: u32 = 2;

/// A fully decoded pack: every entry resolved to a base object.
#[derive(Debug)]
pub struct Pack {
    /// Declared object count from the header.
    pub number: usize,
    /// Trailer hash, verified against the stream.
    pub signature: ObjectHash,
    /// Resolved objects in pack order (deltas replaced by their targets).
    pub entries: Vec<Entry>,
}

#[cfg(test)]
pub(crate) mod tests {
    use tracing_subscriber::util::SubscriberInitExt;

    /// Shared tracing bootstrap for pack tests; safe under repeat calls.
    pub(crate) fn init_logger() {
        let _ = tracing_subscriber::fmt::Subscriber::builder()
            .with_target(false)
            .without_time()
            .with_level(true)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
            .try_init();
    }
}
