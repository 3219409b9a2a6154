//! zlib codecs: one-shot deflate/inflate helpers for loose objects and a
//! streaming inflate reader for pack entries.

pub mod stream;

use std::io::{Read, Write};

use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};

use crate::errors::GitError;

/// Compress a buffer with zlib framing. Exact output bytes are not part
/// of any contract; the result only has to round-trip through a
/// reference inflater.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>, GitError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a complete zlib stream into a fresh buffer.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, GitError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| GitError::Corrupt(format!("deflate stream: {e}")))?;
    Ok(out)
}
