//! Decoder for Git delta instructions that rebuilds target objects from
//! a base buffer and the instruction stream produced by `delta::encode`
//! (base size + result size + op codes).

use std::io::{ErrorKind, Read};

use super::utils;
use crate::errors::GitError;

const COPY_INSTRUCTION_FLAG: u8 = 1 << 7; // msb set => copy from base, otherwise inline data
const COPY_OFFSET_BYTES: u8 = 4;
const COPY_SIZE_BYTES: u8 = 3;
const COPY_ZERO_SIZE: usize = 0x10000;

/// Apply a delta stream to `base`, returning the reconstructed target
/// bytes. The stream format matches Git's delta encoding:
/// - leading base size, then result size (varint)
/// - a sequence of ops: data instructions (msb=0, lower 7 bits = literal
///   length) or copy instructions (msb=1, following bytes encode
///   offset/size; a size of zero means 0x10000).
pub fn apply_delta(stream: &mut impl Read, base: &[u8]) -> Result<Vec<u8>, GitError> {
    let base_size = utils::read_size_encoding(stream)?;
    if base.len() != base_size {
        return Err(GitError::DeltaError(format!(
            "base length {} does not match declared {}",
            base.len(),
            base_size
        )));
    }

    let result_size = utils::read_size_encoding(stream)?;
    let mut buffer = Vec::with_capacity(result_size);
    loop {
        // Stream end means the target object is complete.
        let instruction = match utils::read_bytes(stream) {
            Ok([instruction]) => instruction,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => {
                return Err(GitError::DeltaError(format!(
                    "truncated instruction: {err}"
                )));
            }
        };

        if instruction & COPY_INSTRUCTION_FLAG == 0 {
            // Data instruction; the byte itself is the literal length.
            if instruction == 0 {
                // Appending 0 bytes is disallowed by the format.
                return Err(GitError::DeltaError("zero-length data instruction".into()));
            }
            let mut data = vec![0; instruction as usize];
            stream
                .read_exact(&mut data)
                .map_err(|e| GitError::DeltaError(format!("truncated literal: {e}")))?;
            buffer.extend_from_slice(&data);
        } else {
            // Copy instruction.
            let mut nonzero_bytes = instruction;
            let offset = utils::read_partial_int(stream, COPY_OFFSET_BYTES, &mut nonzero_bytes)?;
            let mut size = utils::read_partial_int(stream, COPY_SIZE_BYTES, &mut nonzero_bytes)?;
            if size == 0 {
                size = COPY_ZERO_SIZE;
            }
            let base_data = base.get(offset..offset + size).ok_or_else(|| {
                GitError::DeltaError(format!(
                    "copy {offset}+{size} exceeds base of {}",
                    base.len()
                ))
            })?;
            buffer.extend_from_slice(base_data);
        }
    }

    if buffer.len() != result_size {
        return Err(GitError::DeltaError(format!(
            "result length {} does not match declared {}",
            buffer.len(),
            result_size
        )));
    }
    Ok(buffer)
}
