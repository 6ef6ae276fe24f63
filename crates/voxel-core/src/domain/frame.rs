//! The decoded frame type.

use bytes::Bytes;

/// One decoded image unit: the raw JPEG payload of a single wire frame.
///
/// Frames are immutable once decoded. The payload is a [`Bytes`] so that
/// handing a frame to several viewers clones a reference count, not the
/// image — the relay's broadcast layer depends on that.
///
/// The protocol carries no sequence numbers; ordering is implicit in
/// arrival order and preserved by the relay end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Wraps a decoded payload. The transport layer has already validated
    /// the declared length bounds, so any byte content is accepted here.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// The JPEG payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True if the payload is empty. The decoder never produces an empty
    /// frame (a zero length is a protocol error), so this exists mainly for
    /// completeness of the container API.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consumes the frame, returning the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl From<Vec<u8>> for Frame {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(Bytes::from(payload))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_exposes_payload() {
        let frame = Frame::from(b"ABCD".to_vec());
        assert_eq!(frame.payload().as_ref(), b"ABCD");
        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_frame_clone_shares_payload() {
        let frame = Frame::from(vec![0u8; 1024]);
        let clone = frame.clone();
        // Bytes clones share the underlying allocation.
        assert_eq!(frame.payload().as_ptr(), clone.payload().as_ptr());
    }

    #[test]
    fn test_into_payload_returns_bytes() {
        let frame = Frame::from(b"xyz".to_vec());
        assert_eq!(frame.into_payload(), Bytes::from_static(b"xyz"));
    }
}
