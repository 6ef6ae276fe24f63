//! # voxel-core
//!
//! Shared library for the Voxel stream relay containing the wire protocol
//! codec and the frame domain type.
//!
//! This crate is used by the relay application and by device simulators in
//! tests. It has zero dependencies on OS APIs, async runtimes, or network
//! sockets — everything here operates on byte slices.
//!
//! # The protocol in one paragraph
//!
//! A Voxel camera does not accept inbound video connections. Instead, the
//! relay opens a local TCP listener and commands the device (over a separate
//! control channel, not part of this crate) to *push* a stream back to it.
//! Once connected, the device sends an unbounded sequence of frames, each
//! one a JPEG image wrapped in an 8-byte header:
//!
//! ```text
//! [4B magic "VXL0"][4B big-endian payload length L][L bytes JPEG]
//! ```
//!
//! There is no checksum, no sequence number, and no sub-framing. Frame
//! ordering is arrival ordering.

// Each module lives in a subdirectory with the same name (src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `voxel_core::Frame` instead of `voxel_core::domain::frame::Frame`.
pub use domain::frame::Frame;
pub use protocol::codec::{encode_frame, parse_header, CodecError};
pub use protocol::{FRAME_MAGIC, HEADER_LEN, MAX_FRAME_LEN};
