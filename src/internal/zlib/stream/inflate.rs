//! Buffered inflate reader that decodes Git's zlib-compressed objects
//! while simultaneously tracking the object digest for integrity
//! verification.

use std::{io, io::BufRead};

use flate2::{Decompress, FlushDecompress, Status};

use crate::{hash::HashKind, internal::object::types::ObjectType, utils::HashAlgorithm};

/// `ReadBoxed` unzips one object's DEFLATE stream out of a larger
/// buffered stream without consuming bytes that belong to the next
/// entry. While inflating a base object it feeds the canonical
/// `<kind> <len>\0` header plus body into a digest so the caller gets
/// the object id for free.
pub struct ReadBoxed<R> {
    /// The reader from which bytes should be decompressed.
    pub inner: R,
    /// The decompressor doing all the work.
    pub decompressor: Box<Decompress>,
    /// Whether the digest is being accumulated (off for delta payloads,
    /// whose id is only known after resolution).
    count_hash: bool,
    /// Digest state over the decompressed object.
    pub hash: HashAlgorithm,
}

impl<R> ReadBoxed<R>
where
    R: BufRead,
{
    /// Reader for a base object entry; the digest is seeded with the
    /// loose-object header so it finalizes to the object id.
    pub fn new(inner: R, kind: HashKind, obj_type: ObjectType, size: usize) -> Self {
        let mut hash = HashAlgorithm::new(kind);
        hash.update(obj_type.to_bytes());
        hash.update(b" ");
        hash.update(size.to_string().as_bytes());
        hash.update(b"\0");
        ReadBoxed {
            inner,
            hash,
            count_hash: true,
            decompressor: Box::new(Decompress::new(true)),
        }
    }

    /// Reader for a delta payload, which has no id of its own.
    pub fn new_for_delta(inner: R, kind: HashKind) -> Self {
        ReadBoxed {
            inner,
            hash: HashAlgorithm::new(kind),
            count_hash: false,
            decompressor: Box::new(Decompress::new(true)),
        }
    }
}

impl<R> io::Read for ReadBoxed<R>
where
    R: BufRead,
{
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        let n = read(&mut self.inner, &mut self.decompressor, into)?;
        if self.count_hash {
            self.hash.update(&into[..n]);
        }
        Ok(n)
    }
}

/// Read bytes from `rd` and decompress them using `state` into a
/// pre-allocated fitting buffer `dst`, returning the amount written.
fn read(rd: &mut impl BufRead, state: &mut Decompress, mut dst: &mut [u8]) -> io::Result<usize> {
    let mut total_written = 0;
    loop {
        let (written, consumed, ret, eof);
        {
            let input = rd.fill_buf()?;
            eof = input.is_empty();
            let before_out = state.total_out();
            let before_in = state.total_in();
            let flush = if eof {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            ret = state.decompress(input, dst, flush);
            written = (state.total_out() - before_out) as usize;
            total_written += written;
            dst = &mut dst[written..];
            consumed = (state.total_in() - before_in) as usize;
        }
        rd.consume(consumed);

        match ret {
            // The stream has officially ended, nothing more to do here.
            Ok(Status::StreamEnd) => return Ok(total_written),
            // Either input or output are depleted even though the stream is not done yet.
            Ok(Status::Ok | Status::BufError) if eof || dst.is_empty() => return Ok(total_written),
            // Progress was made; continue until the stream end.
            Ok(Status::Ok | Status::BufError) if consumed != 0 || written != 0 => continue,
            // No progress and not done either: the stream is broken.
            Ok(Status::Ok | Status::BufError) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "deflate stream stalled without progress",
                ));
            }
            Err(..) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "corrupt deflate stream",
                ));
            }
        }
    }
}
