//! The control-link seam.
//!
//! The Voxel device is configured over a separate control channel (BLE or
//! TCP, owned by the vendor SDK); the relay only needs two commands from
//! it: start pushing the stream to a given address, and stop pushing.
//! [`ControlLink`] is the trait boundary for that collaborator so the
//! coordinator can be tested against a scripted or mocked device.
//!
//! # Serialization contract
//!
//! The push target is a single mutable slot on the device: issuing a second
//! `start_push` while one stream is live is undefined behavior device-side.
//! The [`StreamCoordinator`](crate::application::StreamCoordinator) is the
//! only caller and serializes every command; implementations do not need
//! their own locking.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by control-link commands.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The device acknowledged the command with an error (e.g. it cannot
    /// reach the push target, or streaming is unsupported in its current
    /// mode). Fatal to the current session attempt.
    #[error("device rejected the command: {reason}")]
    Rejected { reason: String },

    /// The control transport failed (connection refused, reset, ...).
    #[error("control transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The device answered with something the control protocol does not
    /// recognize.
    #[error("control protocol error: {0}")]
    Protocol(String),

    /// No acknowledgement within the RPC deadline.
    #[error("control command timed out after {0:?}")]
    TimedOut(Duration),
}

/// Commands the relay issues to the device's control channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlLink: Send + Sync {
    /// Instructs the device to open a TCP connection to `host:port` and
    /// push its frame stream over it.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the current session attempt; the caller must
    /// not assume a stream will arrive.
    async fn start_push(&self, host: IpAddr, port: u16) -> Result<(), ControlError>;

    /// Instructs the device to stop pushing and clear its push slot.
    ///
    /// Idempotent on the device side: stopping an already-stopped stream
    /// acks successfully. The coordinator calls this before every session
    /// start and once during every teardown.
    async fn stop_push(&self) -> Result<(), ControlError>;
}
