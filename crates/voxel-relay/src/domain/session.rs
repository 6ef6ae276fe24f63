//! Session state types shared between the coordinator and the HTTP surface.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Lifecycle phase of the device stream session.
///
/// ```text
/// Idle ──▶ Opening ──▶ Streaming ──▶ Recovering ──▶ Opening ...
///              │            │
///              ▼            ▼
///            Closed       Closed | Idle (last viewer left)
/// ```
///
/// At most one session can be past `Idle` at any time; the coordinator owns
/// the single pump task that drives these transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No session. Initial state, and re-entered when the last viewer
    /// disconnects cleanly.
    Idle,
    /// Listener bound, device commanded to push, waiting for the reverse
    /// connection.
    Opening,
    /// Connected; frames are being decoded and relayed.
    Streaming,
    /// Stream desynchronized (bad magic); tearing down and re-opening.
    Recovering,
    /// Terminal for this session: protocol failure, device disconnect, or
    /// explicit stop. A new session starts from `Idle` on the next viewer.
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Opening => "opening",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Recovering => "recovering",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Bounded exponential backoff for session restarts after stream
/// desynchronization.
///
/// The source protocol has no resync mechanism: on a bad magic the only
/// remedy is a full session restart. Unbounded immediate restarts against a
/// persistently misbehaving device would spin, so restarts are capped and
/// spaced out.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum consecutive restart attempts before the session closes.
    pub max_recoveries: u32,
    /// Delay before the first restart; doubles per attempt.
    pub base_backoff: Duration,
    /// Ceiling on the per-attempt delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Default ceiling on a single backoff step.
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

    pub fn new(max_recoveries: u32, base_backoff: Duration) -> Self {
        Self {
            max_recoveries,
            base_backoff,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
        }
    }

    /// Backoff before restart `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_backoff.saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_backoff)
    }
}

/// Point-in-time snapshot of the coordinator, served by `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Current session phase.
    pub phase: SessionPhase,
    /// Frames relayed to viewers since process start.
    pub frames_relayed: u64,
    /// Stream sessions opened since process start (including restarts).
    pub sessions_opened: u64,
    /// Desync recoveries attempted since process start.
    pub recoveries: u64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
