//! Reader wrapper that tracks how many bytes of a pack have been
//! consumed while keeping a running digest for trailer verification.

use std::io::{self, BufRead, Read};

use crate::{
    hash::{HashKind, ObjectHash},
    utils::HashAlgorithm,
};

/// Wraps any `BufRead`, hashing every byte that passes through so the
/// pack trailer can be checked without buffering the whole stream.
pub struct Wrapper<R> {
    pub inner: R,
    hash: HashAlgorithm,
    bytes_read: usize,
}

impl<R> Wrapper<R>
where
    R: BufRead,
{
    pub fn new(inner: R, kind: HashKind) -> Self {
        Self {
            inner,
            hash: HashAlgorithm::new(kind),
            bytes_read: 0,
        }
    }

    /// Number of bytes read so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Digest of everything read so far, leaving the running state
    /// intact. Call before consuming the trailer.
    pub fn current_hash(&self) -> ObjectHash {
        self.hash.clone().finalize_hash()
    }
}

impl<R> BufRead for Wrapper<R>
where
    R: BufRead,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        // fill_buf on a just-filled reader returns the same buffer; the
        // consumed prefix is what must enter the digest.
        match self.inner.fill_buf() {
            Ok(buffer) => self.hash.update(&buffer[..amt]),
            Err(_) => {}
        }
        self.inner.consume(amt);
        self.bytes_read += amt;
    }
}

impl<R> Read for Wrapper<R>
where
    R: BufRead,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hash.update(&buf[..n]);
        self.bytes_read += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor, Read};

    use super::Wrapper;
    use crate::hash::{HashKind, ObjectHash};

    /// Reads pass through unchanged and the digest matches a one-shot
    /// hash of the same bytes, for both widths.
    #[test]
    fn read_and_hash() {
        for kind in [HashKind::Sha1, HashKind::Sha256] {
            let data = b"Hello, world!";
            let mut wrapper = Wrapper::new(BufReader::new(Cursor::new(data.as_ref())), kind);

            let mut buffer = vec![0; data.len()];
            wrapper.read_exact(&mut buffer).unwrap();

            assert_eq!(buffer, data);
            assert_eq!(wrapper.bytes_read(), data.len());
            assert_eq!(wrapper.current_hash(), ObjectHash::compute(kind, data));
        }
    }
}
