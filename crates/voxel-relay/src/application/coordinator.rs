//! The stream session coordinator.
//!
//! Owns the complete lifecycle of the device stream: commanding the device
//! through the [`ControlLink`], opening the reverse-connect transport,
//! decoding frames, and fanning them out to viewers. It is the only owner
//! of the live device connection and the only caller of the control link,
//! which keeps the device's single push slot from ever being driven by two
//! code paths at once.
//!
//! # One pump, many viewers
//!
//! Exactly one *pump* task reads the device connection, regardless of how
//! many HTTP viewers are attached. Viewers subscribe to a
//! `tokio::sync::broadcast` channel; a viewer that falls behind skips
//! frames rather than buffering them (the stream is live video — stale
//! frames are worthless). When the last viewer disconnects the broadcast
//! send fails and the pump tears the session down.
//!
//! # Recovery policy
//!
//! A bad frame magic means the byte stream is desynchronized and the only
//! remedy is a full restart: stop the push, reopen the listener, command a
//! fresh push. Restarts are bounded and backed off (see
//! [`RetryPolicy`]); the attempt counter resets once a frame is relayed,
//! so a device that desyncs once an hour is never capped, while one that
//! desyncs on every connect gives up quickly. Bad declared lengths,
//! truncated payloads, read timeouts, and orderly end-of-stream all close
//! the session without restarting — those are device faults or clean
//! shutdowns, not resync problems.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use voxel_core::Frame;

use crate::application::control_link::ControlLink;
use crate::domain::config::RelayConfig;
use crate::domain::session::{RetryPolicy, SessionPhase, SessionStatus};
use crate::infrastructure::frame_reader::{read_frame, FrameReadError};
use crate::infrastructure::listener::open_session;

/// Broadcast channel depth. Small on purpose: a slow viewer should skip
/// frames, not accumulate seconds of stale video.
const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Errors surfaced by explicit session control.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already past `Idle`; a second concurrent session would
    /// interleave two pushes on the device's single slot.
    #[error("a stream session is already active (phase: {phase})")]
    AlreadyActive { phase: SessionPhase },
}

struct CoordinatorInner {
    phase: SessionPhase,
    /// Live broadcast sender, present while a pump task exists. Dropped at
    /// teardown so subscribed viewers observe end-of-stream.
    frames: Option<broadcast::Sender<Frame>>,
    pump: Option<JoinHandle<()>>,
}

/// Orchestrates listener + decoder lifecycle and the recovery policy.
///
/// Create once at startup and share via `Arc`; every public method takes
/// `&self`.
pub struct StreamCoordinator {
    control: Arc<dyn ControlLink>,
    config: Arc<RelayConfig>,
    inner: Mutex<CoordinatorInner>,
    frames_relayed: AtomicU64,
    sessions_opened: AtomicU64,
    recoveries: AtomicU64,
}

impl StreamCoordinator {
    pub fn new(control: Arc<dyn ControlLink>, config: Arc<RelayConfig>) -> Arc<Self> {
        Arc::new(Self {
            control,
            config,
            inner: Mutex::new(CoordinatorInner {
                phase: SessionPhase::Idle,
                frames: None,
                pump: None,
            }),
            frames_relayed: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
        })
    }

    /// Subscribes to the frame stream, lazily starting a session if none is
    /// active.
    ///
    /// This is the viewer entry point: any number of viewers may subscribe
    /// and they all share the single upstream read loop. The returned
    /// receiver yields frames in arrival order and closes when the session
    /// ends (the viewer must re-subscribe to trigger a new session).
    pub fn subscribe(self: &Arc<Self>) -> broadcast::Receiver<Frame> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(frames) = &inner.frames {
            return frames.subscribe();
        }
        self.spawn_session(&mut inner)
    }

    /// Explicitly starts a session, failing fast if one is already active.
    ///
    /// Unlike [`subscribe`](Self::subscribe), this never joins an existing
    /// session: a caller that asked for a *new* push while one is live has
    /// a bug, and silently sharing would mask it. No `start_push` is issued
    /// on the failure path.
    pub fn start(self: &Arc<Self>) -> Result<broadcast::Receiver<Frame>, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.frames.is_some() {
            return Err(SessionError::AlreadyActive { phase: inner.phase });
        }
        Ok(self.spawn_session(&mut inner))
    }

    /// Current session phase.
    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().unwrap().phase
    }

    /// Snapshot of the coordinator's counters for the status endpoint.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase(),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
        }
    }

    /// Stops any active session and clears the device's push slot.
    ///
    /// Safe to call at any time, including when idle; the trailing
    /// `stop_push` is idempotent on the device.
    pub async fn shutdown(&self) {
        let pump = {
            let mut inner = self.inner.lock().unwrap();
            inner.phase = SessionPhase::Closed;
            inner.frames = None;
            inner.pump.take()
        };
        if let Some(handle) = pump {
            handle.abort();
        }
        if let Err(e) = self.control.stop_push().await {
            warn!("stop_push during shutdown failed: {e}");
        }
        info!("stream coordinator shut down");
    }

    /// Creates the per-session broadcast channel and spawns the pump task.
    /// Caller holds the state lock.
    fn spawn_session(self: &Arc<Self>, inner: &mut CoordinatorInner) -> broadcast::Receiver<Frame> {
        let (tx, rx) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        inner.phase = SessionPhase::Opening;
        inner.frames = Some(tx.clone());
        let this = Arc::clone(self);
        inner.pump = Some(tokio::spawn(async move {
            this.pump(tx).await;
        }));
        rx
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.inner.lock().unwrap().phase = phase;
    }

    /// The single upstream read loop. Runs until the session ends, then
    /// records the final phase and releases the broadcast channel.
    async fn pump(self: Arc<Self>, frames: broadcast::Sender<Frame>) {
        let policy = RetryPolicy::new(self.config.max_recoveries, self.config.recovery_backoff());
        let mut restarts: u32 = 0;

        let final_phase = 'session: loop {
            self.set_phase(SessionPhase::Opening);

            // Clear the device's push slot before every attempt. The stop is
            // best-effort: a device that was never pushing may nack it.
            if let Err(e) = self.control.stop_push().await {
                warn!("pre-open stop_push failed: {e}");
            }

            let conn = match open_session(self.control.as_ref(), &self.config).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("failed to open stream session: {e}");
                    break 'session SessionPhase::Closed;
                }
            };
            self.sessions_opened.fetch_add(1, Ordering::Relaxed);
            self.set_phase(SessionPhase::Streaming);

            let mut stream = conn.stream;
            loop {
                match read_frame(&mut stream, self.config.read_timeout()).await {
                    Ok(Some(frame)) => {
                        // A good frame proves the device is healthy again;
                        // the restart cap applies per incident.
                        restarts = 0;
                        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
                        if frames.send(frame).is_err() {
                            info!("last viewer disconnected; stopping stream session");
                            break 'session SessionPhase::Idle;
                        }
                    }
                    Ok(None) => {
                        info!("device closed the stream");
                        break 'session SessionPhase::Closed;
                    }
                    Err(FrameReadError::BadMagic { found }) => {
                        restarts += 1;
                        self.recoveries.fetch_add(1, Ordering::Relaxed);
                        if restarts > policy.max_recoveries {
                            error!(
                                "stream desynchronized again after {} restarts; giving up",
                                policy.max_recoveries
                            );
                            break 'session SessionPhase::Closed;
                        }
                        warn!(
                            "bad frame magic {found:02X?}; restarting session \
                             (attempt {restarts}/{})",
                            policy.max_recoveries
                        );
                        self.set_phase(SessionPhase::Recovering);
                        drop(stream);
                        tokio::time::sleep(policy.backoff_for(restarts)).await;
                        continue 'session;
                    }
                    Err(e) => {
                        error!("stream session failed: {e}");
                        break 'session SessionPhase::Closed;
                    }
                }
            }
        };

        // Teardown: one idempotent stop, then release the channel so
        // viewers see end-of-stream.
        if let Err(e) = self.control.stop_push().await {
            warn!("teardown stop_push failed: {e}");
        }
        let mut inner = self.inner.lock().unwrap();
        inner.phase = final_phase;
        inner.frames = None;
        inner.pump = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::control_link::MockControlLink;
    use std::net::IpAddr;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    /// Config pointing everything at loopback with an ephemeral stream port.
    fn test_config(read_timeout_secs: u64) -> Arc<RelayConfig> {
        Arc::new(RelayConfig {
            stream_bind: "127.0.0.1:0".parse().unwrap(),
            push_target: Some("127.0.0.1".parse().unwrap()),
            accept_timeout_secs: 5,
            read_timeout_secs,
            recovery_backoff_ms: 10,
            ..RelayConfig::default()
        })
    }

    /// A device stand-in: connects back to the listener, writes `bytes`,
    /// then holds the connection open for `hold`.
    fn push_device(host: IpAddr, port: u16, bytes: Vec<u8>, hold: Duration) {
        tokio::spawn(async move {
            if let Ok(mut stream) = TcpStream::connect((host, port)).await {
                let _ = stream.write_all(&bytes).await;
                tokio::time::sleep(hold).await;
            }
        });
    }

    async fn wait_for_phase(coord: &Arc<StreamCoordinator>, phase: SessionPhase) {
        timeout(Duration::from_secs(5), async {
            while coord.phase() != phase {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached phase {phase}, stuck at {}", coord.phase()));
    }

    #[tokio::test]
    async fn test_subscribe_twice_starts_exactly_one_session() {
        let mut mock = MockControlLink::new();
        mock.expect_stop_push().returning(|| Ok(()));
        // times(1) is the property under test: two subscribers, one push.
        mock.expect_start_push().times(1).returning(|host, port| {
            push_device(
                host,
                port,
                voxel_core::encode_frame(b"frame-1").unwrap(),
                Duration::from_millis(200),
            );
            Ok(())
        });

        let coord = StreamCoordinator::new(Arc::new(mock), test_config(30));
        let mut rx_a = coord.subscribe();
        let mut rx_b = coord.subscribe();

        let a = timeout(Duration::from_secs(5), rx_a.recv()).await.unwrap().unwrap();
        let b = timeout(Duration::from_secs(5), rx_b.recv()).await.unwrap().unwrap();
        assert_eq!(a.payload().as_ref(), b"frame-1");
        assert_eq!(b.payload().as_ref(), b"frame-1");
    }

    #[tokio::test]
    async fn test_start_while_streaming_fails_fast_without_second_push() {
        let mut mock = MockControlLink::new();
        mock.expect_stop_push().returning(|| Ok(()));
        mock.expect_start_push().times(1).returning(|host, port| {
            // Write one frame, then keep the connection open so the session
            // stays in Streaming while we assert.
            push_device(
                host,
                port,
                voxel_core::encode_frame(b"held").unwrap(),
                Duration::from_secs(30),
            );
            Ok(())
        });

        let coord = StreamCoordinator::new(Arc::new(mock), test_config(30));
        let _rx = coord.start().expect("first start");
        wait_for_phase(&coord, SessionPhase::Streaming).await;

        let second = coord.start();
        assert!(matches!(
            second,
            Err(SessionError::AlreadyActive {
                phase: SessionPhase::Streaming
            })
        ));

        coord.shutdown().await;
    }

    #[tokio::test]
    async fn test_device_close_ends_session_as_closed() {
        let mut mock = MockControlLink::new();
        mock.expect_stop_push().returning(|| Ok(()));
        mock.expect_start_push().times(1).returning(|host, port| {
            push_device(
                host,
                port,
                voxel_core::encode_frame(b"only").unwrap(),
                Duration::from_millis(10),
            );
            Ok(())
        });

        let coord = StreamCoordinator::new(Arc::new(mock), test_config(30));
        let mut rx = coord.subscribe();

        let frame = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(frame.payload().as_ref(), b"only");

        // Device closed after one frame: orderly end of stream.
        let end = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(end, Err(broadcast::error::RecvError::Closed)));
        wait_for_phase(&coord, SessionPhase::Closed).await;
    }

    #[tokio::test]
    async fn test_start_push_rejection_closes_session() {
        let mut mock = MockControlLink::new();
        mock.expect_stop_push().returning(|| Ok(()));
        mock.expect_start_push().times(1).returning(|_, _| {
            Err(crate::application::ControlError::Rejected {
                reason: "busy".into(),
            })
        });

        let coord = StreamCoordinator::new(Arc::new(mock), test_config(30));
        let mut rx = coord.subscribe();

        let end = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(end, Err(broadcast::error::RecvError::Closed)));
        wait_for_phase(&coord, SessionPhase::Closed).await;
    }

    #[tokio::test]
    async fn test_status_counts_relayed_frames() {
        let mut mock = MockControlLink::new();
        mock.expect_stop_push().returning(|| Ok(()));
        mock.expect_start_push().times(1).returning(|host, port| {
            let mut bytes = voxel_core::encode_frame(b"one").unwrap();
            bytes.extend_from_slice(&voxel_core::encode_frame(b"two").unwrap());
            push_device(host, port, bytes, Duration::from_millis(10));
            Ok(())
        });

        let coord = StreamCoordinator::new(Arc::new(mock), test_config(30));
        let mut rx = coord.subscribe();
        assert_eq!(
            timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap().payload().as_ref(),
            b"one"
        );
        assert_eq!(
            timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap().payload().as_ref(),
            b"two"
        );
        wait_for_phase(&coord, SessionPhase::Closed).await;

        let status = coord.status();
        assert_eq!(status.frames_relayed, 2);
        assert_eq!(status.sessions_opened, 1);
        assert_eq!(status.recoveries, 0);
    }
}
