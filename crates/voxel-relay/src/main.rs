//! Voxel stream relay — entry point.
//!
//! This binary bridges a Voxel camera's reverse-connect streaming protocol
//! to a browser. It runs two network surfaces:
//!
//! - A frame transport listener the device pushes its stream to (the relay
//!   commands the push over the device's control channel).
//! - An HTTP server the browser talks to: a multipart video feed, a WebRTC
//!   signaling endpoint, and a status endpoint.
//!
//! # Usage
//!
//! ```text
//! voxel-relay [OPTIONS]
//!
//! Options:
//!   --http-port    <PORT>  Browser-facing HTTP port [default: 8080]
//!   --stream-port  <PORT>  Frame transport listener port [default: 9000]
//!   --control-host <HOST>  Device control agent host [default: 127.0.0.1]
//!   --control-port <PORT>  Device control agent port [default: 9010]
//!   --push-target  <IP>    Explicit push-back address for the device
//!   --config       <PATH>  TOML config file (flags override it)
//! ```
//!
//! # Environment variable overrides
//!
//! Each flag can also be set via environment (`VXL_HTTP_PORT`,
//! `VXL_STREAM_PORT`, `VXL_CONTROL_HOST`, ...). Flags take precedence,
//! then environment, then the config file, then built-in defaults.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voxel_relay::application::{ControlLink, StreamCoordinator};
use voxel_relay::domain::RelayConfig;
use voxel_relay::infrastructure::http_server::{serve, AppState};
use voxel_relay::infrastructure::{PeerRegistry, TcpControlLink};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Voxel stream relay.
///
/// Commands a Voxel device to push its frame stream to this host and
/// re-serves the stream to browsers over HTTP multipart and WebRTC
/// signaling.
#[derive(Debug, Parser)]
#[command(
    name = "voxel-relay",
    about = "Bridge a Voxel device stream to the browser",
    version
)]
struct Cli {
    /// TCP port for the browser-facing HTTP server.
    #[arg(long, env = "VXL_HTTP_PORT")]
    http_port: Option<u16>,

    /// IP address to bind the HTTP server to.
    #[arg(long, env = "VXL_HTTP_BIND")]
    http_bind: Option<IpAddr>,

    /// TCP port the device pushes its frame stream to.
    #[arg(long, env = "VXL_STREAM_PORT")]
    stream_port: Option<u16>,

    /// IP address to bind the frame transport listener to.
    #[arg(long, env = "VXL_STREAM_BIND")]
    stream_bind: Option<IpAddr>,

    /// Hostname or IP of the device's control agent.
    #[arg(long, env = "VXL_CONTROL_HOST")]
    control_host: Option<IpAddr>,

    /// TCP port of the device's control agent.
    #[arg(long, env = "VXL_CONTROL_PORT")]
    control_port: Option<u16>,

    /// Explicit address the device should push to. When omitted, the
    /// host's outward-facing address toward the device is used.
    #[arg(long, env = "VXL_PUSH_TARGET")]
    push_target: Option<IpAddr>,

    /// Seconds to wait for the device to connect back after a push
    /// command.
    #[arg(long, env = "VXL_ACCEPT_TIMEOUT")]
    accept_timeout: Option<u64>,

    /// Path to a TOML config file. Command-line flags override it.
    #[arg(long, env = "VXL_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Builds the effective [`RelayConfig`]: config file (or defaults) as
    /// the base, with any explicitly provided flag applied on top.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut cfg = match &self.config {
            Some(path) => RelayConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(ip) = self.http_bind {
            cfg.http_bind.set_ip(ip);
        }
        if let Some(port) = self.http_port {
            cfg.http_bind.set_port(port);
        }
        if let Some(ip) = self.stream_bind {
            cfg.stream_bind.set_ip(ip);
        }
        if let Some(port) = self.stream_port {
            cfg.stream_bind.set_port(port);
        }
        if let Some(ip) = self.control_host {
            cfg.control_addr.set_ip(ip);
        }
        if let Some(port) = self.control_port {
            cfg.control_addr.set_port(port);
        }
        if let Some(ip) = self.push_target {
            cfg.push_target = Some(ip);
        }
        if let Some(secs) = self.accept_timeout {
            cfg.accept_timeout_secs = secs;
        }

        Ok(cfg)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log level comes from RUST_LOG, defaulting to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(cli.into_relay_config()?);

    info!(
        "voxel relay starting — http={}, stream={}, control={}",
        config.http_bind, config.stream_bind, config.control_addr
    );

    let control: Arc<dyn ControlLink> = Arc::new(TcpControlLink::new(config.control_addr));
    let coordinator = StreamCoordinator::new(control, Arc::clone(&config));
    let peers = Arc::new(PeerRegistry::new().context("failed to build WebRTC API")?);

    let state = Arc::new(AppState {
        coordinator: Arc::clone(&coordinator),
        peers: Arc::clone(&peers),
        started_at: Instant::now(),
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C signal: {e}");
        }
        info!("received Ctrl+C — shutting down");
    };

    serve(state, config.http_bind, shutdown).await?;

    // The HTTP server has drained; stop the device stream and tear down
    // any peer connections the state callbacks never reclaimed.
    coordinator.shutdown().await;
    peers.close_all().await;

    info!("voxel relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
