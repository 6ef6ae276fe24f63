//! Relay configuration.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from defaults (local development, tests), loaded
//! from a TOML file, or assembled from CLI arguments — the binary merges
//! CLI flags over the file over the defaults.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) keeps the coordinator and transport
//! layers trivially testable: tests build a `RelayConfig` with an ephemeral
//! port and short timeouts and pass it in.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred while reading the config file.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All runtime configuration for the relay.
///
/// Every field carries a serde default, so a partial TOML file (or an empty
/// one) always produces a usable config — first runs and old config files
/// keep working as fields are added.
///
/// # Example
///
/// ```rust
/// use voxel_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.stream_bind.port(), 9000);
/// assert_eq!(cfg.accept_timeout().as_secs(), 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the browser-facing HTTP server binds to.
    pub http_bind: SocketAddr,

    /// Address the frame transport listener binds to. The device is
    /// commanded to push its stream back to this port.
    pub stream_bind: SocketAddr,

    /// Address of the device's control channel (start/stop push commands).
    pub control_addr: SocketAddr,

    /// Explicit address the device should push to. When unset, the host's
    /// outward-facing address is discovered automatically.
    pub push_target: Option<IpAddr>,

    /// Explicit port the device should push to. When unset, the actual
    /// bound port of the stream listener is used (which also makes
    /// ephemeral-port test setups work).
    pub push_port: Option<u16>,

    /// How long to wait for the device to connect back after `start_push`.
    pub accept_timeout_secs: u64,

    /// Per-read deadline on the established stream connection. A device
    /// that goes silent for this long ends the session.
    pub read_timeout_secs: u64,

    /// Upper bound on consecutive session restarts after stream
    /// desynchronization (bad frame magic). The counter resets once a
    /// frame is relayed successfully.
    pub max_recoveries: u32,

    /// Base delay before the first restart attempt; doubles per attempt.
    pub recovery_backoff_ms: u64,
}

impl Default for RelayConfig {
    /// Defaults suitable for running relay and device on the same LAN
    /// segment without any external configuration.
    ///
    /// | Field               | Default           |
    /// |---------------------|-------------------|
    /// | http_bind           | `0.0.0.0:8080`    |
    /// | stream_bind         | `0.0.0.0:9000`    |
    /// | control_addr        | `127.0.0.1:9010`  |
    /// | accept_timeout_secs | 20                |
    /// | read_timeout_secs   | 10                |
    /// | max_recoveries      | 5                 |
    /// | recovery_backoff_ms | 250               |
    fn default() -> Self {
        Self {
            http_bind: "0.0.0.0:8080".parse().unwrap(),
            stream_bind: "0.0.0.0:9000".parse().unwrap(),
            control_addr: "127.0.0.1:9010".parse().unwrap(),
            push_target: None,
            push_port: None,
            accept_timeout_secs: 20,
            read_timeout_secs: 10,
            max_recoveries: 5,
            recovery_backoff_ms: 250,
        }
    }
}

impl RelayConfig {
    /// Loads a config from a TOML file. Missing fields fall back to their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// The accept deadline as a [`Duration`].
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_secs(self.accept_timeout_secs)
    }

    /// The per-read stream deadline as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// The base restart backoff as a [`Duration`].
    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
