//! JSON-over-TCP control-link client.
//!
//! The device's control agent listens on a well-known port and answers
//! newline-delimited JSON commands. Each command is one short-lived
//! connection: connect, write one request line, read one response line,
//! disconnect. The agent is the process boundary to the vendor SDK — the
//! relay never speaks BLE or the device's pairing protocol itself.
//!
//! # Wire examples
//!
//! ```text
//! → {"command":"start_push","host":"192.168.1.20","port":9000}
//! ← {"status":"ok"}
//!
//! → {"command":"stop_push"}
//! ← {"status":"error","message":"device offline"}
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::application::control_link::{ControlError, ControlLink};

/// Default deadline for one command round trip.
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ControlRequest {
    StartPush { host: String, port: u16 },
    StopPush,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ControlResponse {
    Ok,
    Error { message: String },
}

/// [`ControlLink`] implementation speaking the control agent's JSON
/// protocol over TCP.
pub struct TcpControlLink {
    addr: SocketAddr,
    rpc_timeout: Duration,
}

impl TcpControlLink {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Overrides the per-command deadline (tests use short ones).
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// One command round trip: connect, send, await the single-line ack.
    async fn call(&self, request: &ControlRequest) -> Result<(), ControlError> {
        let line = serde_json::to_string(request)
            .map_err(|e| ControlError::Protocol(format!("request serialization failed: {e}")))?;

        let rpc = async {
            let stream = TcpStream::connect(self.addr).await?;
            let mut stream = BufReader::new(stream);

            stream.get_mut().write_all(line.as_bytes()).await?;
            stream.get_mut().write_all(b"\n").await?;

            let mut response = String::new();
            stream.read_line(&mut response).await?;
            Ok::<String, std::io::Error>(response)
        };

        let response = timeout(self.rpc_timeout, rpc)
            .await
            .map_err(|_| ControlError::TimedOut(self.rpc_timeout))??;

        let response = response.trim();
        if response.is_empty() {
            return Err(ControlError::Protocol(
                "control agent closed the connection without an ack".into(),
            ));
        }

        debug!("control response: {response}");
        match serde_json::from_str::<ControlResponse>(response) {
            Ok(ControlResponse::Ok) => Ok(()),
            Ok(ControlResponse::Error { message }) => Err(ControlError::Rejected { reason: message }),
            Err(e) => Err(ControlError::Protocol(format!(
                "unparsable control response: {e}"
            ))),
        }
    }
}

#[async_trait]
impl ControlLink for TcpControlLink {
    async fn start_push(&self, host: IpAddr, port: u16) -> Result<(), ControlError> {
        self.call(&ControlRequest::StartPush {
            host: host.to_string(),
            port,
        })
        .await
    }

    async fn stop_push(&self) -> Result<(), ControlError> {
        self.call(&ControlRequest::StopPush).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
