//! Binary codec for the Voxel frame wire format.
//!
//! Wire format, per frame:
//! ```text
//! [magic:4 = "VXL0"][payload_len:4][payload:N]
//! ```
//! Total header size: 8 bytes. The length field is big-endian.
//!
//! This module is deliberately I/O-free: [`parse_header`] validates a header
//! that the transport layer has already read in full, and [`encode_frame`]
//! produces the bytes a device would send. Streaming reads (exact-count
//! loops, timeouts, discard-on-desync) live in the relay's transport layer.

use thiserror::Error;

use super::{FRAME_MAGIC, HEADER_LEN, MAX_FRAME_LEN};

/// Errors produced while encoding or validating frame headers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The header does not begin with the `"VXL0"` magic.
    ///
    /// Carries the four bytes actually found so the failure can be logged;
    /// the stream position is unrecoverable and the connection must be
    /// discarded by the caller.
    #[error("bad frame magic: expected \"VXL0\", found {found:02X?}")]
    BadMagic { found: [u8; 4] },

    /// The declared payload length is zero or exceeds [`MAX_FRAME_LEN`].
    #[error("bad frame length: {declared} bytes (valid range is 1..={MAX_FRAME_LEN})")]
    BadLength { declared: u32 },
}

/// Validates an 8-byte frame header and returns the declared payload length.
///
/// # Errors
///
/// Returns [`CodecError::BadMagic`] if the first four bytes are not
/// `"VXL0"`, or [`CodecError::BadLength`] if the declared length lies
/// outside `(0, 5 MiB]`. The magic is checked first: a desynchronized
/// stream almost always fails there, and a `BadLength` on a good magic is
/// the stronger signal that the device itself is misbehaving.
///
/// # Examples
///
/// ```rust
/// use voxel_core::{parse_header, HEADER_LEN};
///
/// let mut header = [0u8; HEADER_LEN];
/// header[..4].copy_from_slice(b"VXL0");
/// header[4..].copy_from_slice(&1024u32.to_be_bytes());
/// assert_eq!(parse_header(&header), Ok(1024));
/// ```
pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<u32, CodecError> {
    if header[..4] != FRAME_MAGIC {
        return Err(CodecError::BadMagic {
            found: [header[0], header[1], header[2], header[3]],
        });
    }

    let declared = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if declared == 0 || declared > MAX_FRAME_LEN {
        return Err(CodecError::BadLength { declared });
    }

    Ok(declared)
}

/// Encodes one frame (header + payload) as the device would send it.
///
/// Used by tests and device simulators; the relay itself only decodes.
///
/// # Errors
///
/// Returns [`CodecError::BadLength`] if the payload is empty or larger than
/// [`MAX_FRAME_LEN`] — the same bounds the decoder enforces, so a simulator
/// can never emit a frame the relay would reject for its length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.is_empty() || payload.len() > MAX_FRAME_LEN as usize {
        return Err(CodecError::BadLength {
            declared: payload.len().min(u32::MAX as usize) as u32,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&FRAME_MAGIC);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: &[u8; 4], len: u32) -> [u8; HEADER_LEN] {
        let mut h = [0u8; HEADER_LEN];
        h[..4].copy_from_slice(magic);
        h[4..].copy_from_slice(&len.to_be_bytes());
        h
    }

    // ── parse_header ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_header_accepts_valid_header() {
        assert_eq!(parse_header(&header(b"VXL0", 4)), Ok(4));
    }

    #[test]
    fn test_parse_header_accepts_max_length() {
        assert_eq!(parse_header(&header(b"VXL0", MAX_FRAME_LEN)), Ok(MAX_FRAME_LEN));
    }

    #[test]
    fn test_parse_header_rejects_wrong_magic() {
        let result = parse_header(&header(b"XXXX", 4));
        assert_eq!(
            result,
            Err(CodecError::BadMagic {
                found: *b"XXXX"
            })
        );
    }

    #[test]
    fn test_parse_header_rejects_zero_length() {
        let result = parse_header(&header(b"VXL0", 0));
        assert_eq!(result, Err(CodecError::BadLength { declared: 0 }));
    }

    #[test]
    fn test_parse_header_rejects_oversize_length() {
        let declared = MAX_FRAME_LEN + 1;
        let result = parse_header(&header(b"VXL0", declared));
        assert_eq!(result, Err(CodecError::BadLength { declared }));
    }

    #[test]
    fn test_parse_header_checks_magic_before_length() {
        // A desynced stream usually has both a bad magic and a garbage
        // length; the magic must win so the failure is classified as a
        // resync problem, not a device fault.
        let result = parse_header(&header(b"JUNK", 0));
        assert!(matches!(result, Err(CodecError::BadMagic { .. })));
    }

    // ── encode_frame ─────────────────────────────────────────────────────────

    #[test]
    fn test_encode_frame_layout() {
        let bytes = encode_frame(b"ABCD").unwrap();
        assert_eq!(&bytes[..4], b"VXL0");
        assert_eq!(&bytes[4..8], &4u32.to_be_bytes());
        assert_eq!(&bytes[8..], b"ABCD");
    }

    #[test]
    fn test_encode_frame_rejects_empty_payload() {
        assert_eq!(
            encode_frame(b""),
            Err(CodecError::BadLength { declared: 0 })
        );
    }

    #[test]
    fn test_encode_frame_rejects_oversize_payload() {
        let payload = vec![0u8; MAX_FRAME_LEN as usize + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(CodecError::BadLength { .. })
        ));
    }

    #[test]
    fn test_encode_then_parse_round_trip() {
        let bytes = encode_frame(b"\xFF\xD8\xFF\xE0 jpeg-ish payload").unwrap();
        let hdr: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        let len = parse_header(&hdr).unwrap() as usize;
        assert_eq!(len, bytes.len() - HEADER_LEN);
    }
}
