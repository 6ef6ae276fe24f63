//! voxel-relay library crate.
//!
//! This crate bridges a Voxel camera's proprietary reverse-connect streaming
//! protocol to a web browser. The camera cannot serve video; instead the
//! relay opens a local TCP listener, commands the device (over its control
//! channel) to push a stream back, decodes the length-prefixed JPEG frames,
//! and re-serves them to a browser as an HTTP multipart stream. A WebRTC
//! signaling endpoint negotiates peer connections for clients that prefer a
//! media channel.
//!
//! # Architecture
//!
//! ```text
//! Voxel device ──(TCP push, "VXL0" frames)──▶ [voxel-relay]
//!                                              ├── domain/          RelayConfig, session state types
//!                                              ├── application/     ControlLink seam, StreamCoordinator
//!                                              └── infrastructure/
//!                                                    ├── control_tcp/   JSON-over-TCP control client
//!                                                    ├── listener/      reverse-connect accept
//!                                                    ├── frame_reader/  streaming frame decode
//!                                                    ├── http_server/   axum: /video_feed, /offer, /api/status
//!                                                    └── signaling/     WebRTC peer registry
//!                                              ▼
//! Browser ◀──(multipart/x-mixed-replace + WebRTC signaling)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async: plain configuration and state types.
//! - `application` holds the session state machine and the `ControlLink`
//!   trait; it talks to sockets only through the infrastructure layer.
//! - `infrastructure` owns every socket: the control RPC client, the frame
//!   transport, and the HTTP/WebRTC surfaces.

/// Domain layer: configuration and session state types (no I/O).
pub mod domain;

/// Application layer: control-link seam and the stream session coordinator.
pub mod application;

/// Infrastructure layer: control client, frame transport, HTTP server, and
/// WebRTC signaling registry.
pub mod infrastructure;
