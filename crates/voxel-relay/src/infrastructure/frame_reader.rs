//! Streaming frame decoder.
//!
//! Wraps the pure header codec from `voxel-core` with the exact-read
//! discipline the wire needs: TCP is a stream protocol, so a single read
//! may return part of a header, part of a payload, or several frames'
//! worth of bytes. `read_exact` loops until the precise count arrives or
//! the connection closes — a partial frame is never surfaced to callers.
//!
//! The reader is generic over [`AsyncRead`] so tests drive it from
//! scripted in-memory streams instead of sockets.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::debug;

use voxel_core::{parse_header, CodecError, Frame, HEADER_LEN};

/// Deadline for the best-effort discard read after a desync. Short: the
/// connection is about to be dropped either way.
const DISCARD_TIMEOUT: Duration = Duration::from_millis(250);

/// Errors while reading one frame. Every variant leaves the connection
/// unusable; the session must be closed or restarted by policy.
#[derive(Debug, Error)]
pub enum FrameReadError {
    /// The header did not start with the frame magic: the byte stream is
    /// desynchronized. Up to 1024 bytes have been discarded best-effort;
    /// recovery requires a full session restart.
    #[error("bad frame magic {found:02X?}; stream desynchronized")]
    BadMagic { found: [u8; 4] },

    /// The header declared a length outside `(0, 5 MiB]`. The payload is
    /// not consumed.
    #[error("bad declared frame length: {declared} bytes")]
    BadLength { declared: u32 },

    /// The connection closed in the middle of a payload.
    #[error("stream truncated mid-payload ({expected} bytes declared)")]
    Truncated { expected: u32 },

    /// No bytes arrived within the read deadline.
    #[error("no stream data within {0:?}")]
    TimedOut(Duration),

    /// Any other transport failure.
    #[error("stream read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads exactly one frame from the connection.
///
/// Returns `Ok(None)` on orderly end of stream: the connection closed
/// before a full 8-byte header arrived. Once the header is in, a close is
/// no longer orderly and surfaces as [`FrameReadError::Truncated`].
///
/// Each blocking read is bounded by `read_timeout`; the wire has no
/// keepalive, so a silent device is indistinguishable from a dead one and
/// ends the session.
///
/// # Errors
///
/// See [`FrameReadError`]. No partial or corrupt frame is ever returned.
pub async fn read_frame<R>(
    conn: &mut R,
    read_timeout: Duration,
) -> Result<Option<Frame>, FrameReadError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match timeout(read_timeout, conn.read_exact(&mut header)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(FrameReadError::TimedOut(read_timeout)),
    }

    let declared = match parse_header(&header) {
        Ok(len) => len,
        Err(CodecError::BadMagic { found }) => {
            // Best-effort window discard before the connection is dropped,
            // in case the device flushed a diagnostic blob after desyncing.
            let mut scratch = [0u8; 1024];
            if let Ok(Ok(n)) = timeout(DISCARD_TIMEOUT, conn.read(&mut scratch)).await {
                debug!("discarded {n} bytes after bad magic");
            }
            return Err(FrameReadError::BadMagic { found });
        }
        Err(CodecError::BadLength { declared }) => {
            return Err(FrameReadError::BadLength { declared });
        }
    };

    let mut payload = vec![0u8; declared as usize];
    match timeout(read_timeout, conn.read_exact(&mut payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameReadError::Truncated { expected: declared });
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(FrameReadError::TimedOut(read_timeout)),
    }

    Ok(Some(Frame::new(Bytes::from(payload))))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
