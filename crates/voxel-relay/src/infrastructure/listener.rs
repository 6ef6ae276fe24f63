//! The frame transport listener: reverse-connect session opening.
//!
//! The device never accepts inbound video connections. Opening a session
//! means: bind a local listener, tell the device (via the control link)
//! where to push, then wait — bounded — for exactly one inbound TCP
//! connection. Once the device has connected the listener is closed again;
//! a Voxel stream is strictly one connection per session.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::application::control_link::{ControlError, ControlLink};
use crate::domain::config::RelayConfig;

/// An established reverse-connect stream session.
///
/// Exclusively owned by the coordinator's pump task; the read deadline from
/// [`RelayConfig::read_timeout`] is applied per-read by the frame reader.
#[derive(Debug)]
pub struct StreamConnection {
    /// The device's push connection.
    pub stream: TcpStream,
    /// Peer address, for log correlation.
    pub peer: SocketAddr,
}

/// Errors opening a stream session. All are fatal to the attempt: no
/// partial session is ever returned, and the listener socket is released
/// on every path.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local listener could not be bound. Not retried — a bind failure
    /// (port in use, missing privileges) will not fix itself.
    #[error("failed to bind frame listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The host's outward-facing address could not be determined and no
    /// explicit push target was configured.
    #[error("could not resolve outward-facing push target: {source}")]
    ResolveTarget {
        #[source]
        source: std::io::Error,
    },

    /// The device rejected (or the control transport failed) the push
    /// command. The listener is closed before this is returned.
    #[error("device rejected stream start: {source}")]
    StartRejected {
        #[source]
        source: ControlError,
    },

    /// No inbound connection arrived within the accept deadline. The
    /// caller may retry manually; the device-side push slot is cleared by
    /// the next session start.
    #[error("no inbound stream connection within {waited:?}")]
    AcceptTimeout { waited: Duration },

    /// The accept itself failed.
    #[error("accept failed: {0}")]
    Accept(#[from] std::io::Error),
}

/// Opens one reverse-connect stream session.
///
/// 1. Binds `config.stream_bind` (a port of `0` selects an ephemeral port,
///    which is then used as the push-back port unless `config.push_port`
///    overrides it).
/// 2. Resolves the push target: `config.push_target` if set, otherwise the
///    host's outward-facing address toward the device.
/// 3. Issues `start_push` on the control link.
/// 4. Accepts exactly one connection within `config.accept_timeout()`,
///    then stops listening.
///
/// # Errors
///
/// See [`TransportError`]; every failure releases the listener.
pub async fn open_session(
    control: &dyn ControlLink,
    config: &RelayConfig,
) -> Result<StreamConnection, TransportError> {
    let listener = TcpListener::bind(config.stream_bind)
        .await
        .map_err(|source| TransportError::Bind {
            addr: config.stream_bind,
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let target = match config.push_target {
        Some(ip) => ip,
        None => outward_facing_ip(config.control_addr)
            .map_err(|source| TransportError::ResolveTarget { source })?,
    };
    let push_port = config.push_port.unwrap_or_else(|| local_addr.port());
    debug!("commanding device to push to {target}:{push_port}");

    if let Err(source) = control.start_push(target, push_port).await {
        // The listener is dropped here; no partial session escapes.
        return Err(TransportError::StartRejected { source });
    }

    let waited = config.accept_timeout();
    let (stream, peer) = match timeout(waited, listener.accept()).await {
        Ok(Ok(accepted)) => accepted,
        Ok(Err(source)) => return Err(TransportError::Accept(source)),
        Err(_) => return Err(TransportError::AcceptTimeout { waited }),
    };

    // Single connection per session: stop listening immediately.
    drop(listener);

    info!("device stream connected from {peer}");
    Ok(StreamConnection { stream, peer })
}

/// Discovers the address this host presents on the route toward the
/// device. Connecting a UDP socket sends no packets; it only asks the OS
/// routing table which local address would be used.
fn outward_facing_ip(device_addr: SocketAddr) -> std::io::Result<IpAddr> {
    let probe = UdpSocket::bind("0.0.0.0:0")?;
    probe.connect(device_addr)?;
    Ok(probe.local_addr()?.ip())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::control_link::MockControlLink;
    use tokio::io::AsyncWriteExt;

    fn test_config(stream_bind: &str) -> RelayConfig {
        RelayConfig {
            stream_bind: stream_bind.parse().unwrap(),
            push_target: Some("127.0.0.1".parse().unwrap()),
            accept_timeout_secs: 1,
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_session_accepts_device_connection() {
        let mut mock = MockControlLink::new();
        mock.expect_start_push().times(1).returning(|host, port| {
            tokio::spawn(async move {
                if let Ok(mut stream) = TcpStream::connect((host, port)).await {
                    let _ = stream.write_all(b"hello").await;
                }
            });
            Ok(())
        });

        let conn = open_session(&mock, &test_config("127.0.0.1:0"))
            .await
            .expect("session should open");
        assert!(conn.peer.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_a_bind_error_without_push() {
        // Occupy a port, then ask open_session to bind the same one.
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        // start_push must never be called on the bind-failure path.
        let mock = MockControlLink::new();

        let result = open_session(&mock, &test_config(&addr.to_string())).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_start_rejection_fails_the_attempt() {
        let mut mock = MockControlLink::new();
        mock.expect_start_push()
            .times(1)
            .returning(|_, _| Err(ControlError::Rejected { reason: "no wifi".into() }));

        let result = open_session(&mock, &test_config("127.0.0.1:0")).await;
        assert!(matches!(result, Err(TransportError::StartRejected { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let mut mock = MockControlLink::new();
        // Device acks the command but never connects back.
        mock.expect_start_push().times(1).returning(|_, _| Ok(()));

        let result = open_session(&mock, &test_config("127.0.0.1:0")).await;
        match result {
            Err(TransportError::AcceptTimeout { waited }) => {
                assert_eq!(waited, Duration::from_secs(1));
            }
            other => panic!("expected AcceptTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_port_defaults_to_bound_port() {
        let mut mock = MockControlLink::new();
        mock.expect_start_push()
            .times(1)
            .withf(|_, port| *port != 0)
            .returning(|host, port| {
                tokio::spawn(async move {
                    let _ = TcpStream::connect((host, port)).await;
                });
                Ok(())
            });

        // Ephemeral bind: the pushed port must be the real bound port, not 0.
        let _ = open_session(&mock, &test_config("127.0.0.1:0")).await.unwrap();
    }
}
