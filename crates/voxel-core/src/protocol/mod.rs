//! Protocol module containing the frame header codec and wire constants.

pub mod codec;

pub use codec::{encode_frame, parse_header, CodecError};

/// The 4-byte magic that opens every frame header.
pub const FRAME_MAGIC: [u8; 4] = *b"VXL0";

/// Total header size: 4 bytes magic + 4 bytes big-endian payload length.
pub const HEADER_LEN: usize = 8;

/// Largest payload length the protocol accepts (5 MiB).
///
/// A declared length of zero or anything above this bound means the stream
/// is desynchronized or the device is misbehaving; the connection must be
/// discarded.
pub const MAX_FRAME_LEN: u32 = 5 * 1024 * 1024;
