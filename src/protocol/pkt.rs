//! pkt-line framing shared by every smart-protocol exchange: a 4-hex
//! length prefix that includes itself, with `0000` as the flush packet,
//! `0001` delim, and `0002` response-end.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::GitError;

/// One parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// `0000`
    Flush,
    /// `0001`
    Delim,
    /// `0002`
    ResponseEnd,
    /// Length-prefixed payload.
    Data(Bytes),
}

/// Read one pkt-line from the front of `bytes`, consuming it. `None`
/// when the buffer is exhausted.
pub fn read_pkt_line(bytes: &mut Bytes) -> Result<Option<PktLine>, GitError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() < 4 {
        return Err(GitError::ProtocolError(format!(
            "truncated pkt-line prefix: {} bytes left",
            bytes.len()
        )));
    }

    let prefix = bytes.copy_to_bytes(4);
    let prefix_str = core::str::from_utf8(&prefix)
        .map_err(|_| GitError::ProtocolError(format!("non-hex pkt length {prefix:?}")))?;
    let pkt_length = usize::from_str_radix(prefix_str, 16)
        .map_err(|_| GitError::ProtocolError(format!("bad pkt length `{prefix_str}`")))?;

    match pkt_length {
        0 => return Ok(Some(PktLine::Flush)),
        1 => return Ok(Some(PktLine::Delim)),
        2 => return Ok(Some(PktLine::ResponseEnd)),
        3 => {
            return Err(GitError::ProtocolError(
                "pkt length 3 is not representable".to_string(),
            ));
        }
        _ => {}
    }

    let data_length = pkt_length - 4;
    if bytes.len() < data_length {
        return Err(GitError::ProtocolError(format!(
            "pkt-line declares {data_length} bytes, {} available",
            bytes.len()
        )));
    }
    let payload = bytes.copy_to_bytes(data_length);
    tracing::trace!(len = data_length, "pkt line");
    Ok(Some(PktLine::Data(payload)))
}

/// Append a data pkt-line holding `payload`.
pub fn write_pkt_line(out: &mut BytesMut, payload: &[u8]) {
    let length = payload.len() + 4;
    out.put(Bytes::from(format!("{length:04x}")));
    out.put(payload);
}

/// Append a data pkt-line holding a text line.
pub fn write_pkt_line_str(out: &mut BytesMut, text: &str) {
    write_pkt_line(out, text.as_bytes());
}

/// Append the flush packet `0000`.
pub fn write_flush(out: &mut BytesMut) {
    out.put(&b"0000"[..]);
}

/// Read the text of a data line, trimming one trailing newline.
pub fn line_text(payload: &Bytes) -> Result<String, GitError> {
    let text = core::str::from_utf8(payload)
        .map_err(|e| GitError::ProtocolError(format!("non-UTF-8 pkt payload: {e}")))?;
    Ok(text.strip_suffix('\n').unwrap_or(text).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frames round-trip, and length prefixes count themselves.
    #[test]
    fn round_trip() {
        let mut buf = BytesMut::new();
        write_pkt_line_str(&mut buf, "want abc\n");
        write_flush(&mut buf);

        assert!(buf.starts_with(b"000dwant abc\n0000"));

        let mut bytes = buf.freeze();
        match read_pkt_line(&mut bytes).unwrap().unwrap() {
            PktLine::Data(payload) => assert_eq!(line_text(&payload).unwrap(), "want abc"),
            other => panic!("expected data, got {other:?}"),
        }
        assert_eq!(read_pkt_line(&mut bytes).unwrap(), Some(PktLine::Flush));
        assert_eq!(read_pkt_line(&mut bytes).unwrap(), None);
    }

    /// Special frames decode distinctly.
    #[test]
    fn special_frames() {
        let mut bytes = Bytes::from_static(b"000100020000");
        assert_eq!(read_pkt_line(&mut bytes).unwrap(), Some(PktLine::Delim));
        assert_eq!(
            read_pkt_line(&mut bytes).unwrap(),
            Some(PktLine::ResponseEnd)
        );
        assert_eq!(read_pkt_line(&mut bytes).unwrap(), Some(PktLine::Flush));
    }

    /// Truncated and malformed prefixes error.
    #[test]
    fn malformed_input() {
        let mut bytes = Bytes::from_static(b"00");
        assert!(read_pkt_line(&mut bytes).is_err());

        let mut bytes = Bytes::from_static(b"zzzz");
        assert!(read_pkt_line(&mut bytes).is_err());

        let mut bytes = Bytes::from_static(b"0010short");
        assert!(read_pkt_line(&mut bytes).is_err());
    }
}
