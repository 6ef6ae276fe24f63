//! Browser-facing HTTP server.
//!
//! Three surfaces:
//!
//! - `GET /video_feed` — the multipart relay. One unbounded
//!   `multipart/x-mixed-replace` response per viewer, fed from the
//!   coordinator's broadcast channel. The first viewer lazily starts the
//!   device session.
//! - `POST /offer` — WebRTC signaling: accepts `{sdp, type}` and answers
//!   with `{sdp, type:"answer"}`.
//! - `GET /api/status` — session phase and relay counters.
//!
//! `GET /` serves a small embedded viewer page.
//!
//! All state is an owned [`AppState`] passed through axum's `State`
//! extractor; there are no process-wide mutable slots.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use voxel_core::Frame;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::application::StreamCoordinator;
use crate::infrastructure::signaling::{PeerRegistry, SignalingError};

/// The fixed multipart boundary, part of the public contract.
const BOUNDARY: &str = "frame";

/// Per-part preamble preceding every JPEG payload.
const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Shared state for every handler.
pub struct AppState {
    pub coordinator: Arc<StreamCoordinator>,
    pub peers: Arc<PeerRegistry>,
    pub started_at: Instant,
}

/// Builds the relay router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/offer", post(offer))
        .route("/api/status", get(api_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `bind` and serves the router until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(
    state: Arc<AppState>,
    bind: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind HTTP server on {bind}"))?;

    info!("relay HTTP server listening on http://{bind}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /` — embedded viewer page.
async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// `GET /video_feed` — the multipart relay loop for one viewer.
///
/// Subscribing lazily starts the device session; additional viewers join
/// the same broadcast, so frame acquisition is driven once per underlying
/// stream no matter how many viewers attach. The response body never ends
/// on its own — it closes when the session dies or the viewer disconnects
/// (detected by the failed write dropping this stream and its receiver).
async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let rx = state.coordinator.subscribe();
    debug!("viewer attached to video feed");

    let body = Body::from_stream(stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    return Some((Ok::<Bytes, Infallible>(multipart_chunk(&frame)), rx));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Live video: a slow viewer skips ahead instead of
                    // accumulating stale frames.
                    debug!("viewer lagging; skipped {skipped} frame(s)");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("session ended; closing viewer stream");
                    return None;
                }
            }
        }
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .body(body)
        // Infallible: status and header are statically valid.
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// `POST /offer` — WebRTC signaling exchange.
///
/// Malformed JSON is rejected by the extractor before this runs; a
/// well-formed description that is not a usable offer maps to 400.
async fn offer(
    State(state): State<Arc<AppState>>,
    Json(offer): Json<RTCSessionDescription>,
) -> Response {
    match state.peers.answer(offer).await {
        Ok(answer) => Json(answer).into_response(),
        Err(e @ (SignalingError::NotAnOffer { .. } | SignalingError::InvalidOffer(_))) => {
            warn!("rejected signaling offer: {e}");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            warn!("signaling negotiation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET /api/status` — session phase, relay counters, uptime.
async fn api_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let session = state.coordinator.status();
    Json(json!({
        "session": session,
        "peer_connections": state.peers.active_peers().await,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// Formats one frame as a multipart part:
/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`.
fn multipart_chunk(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEADER.len() + frame.len() + 2);
    buf.extend_from_slice(PART_HEADER);
    buf.extend_from_slice(frame.payload());
    buf.extend_from_slice(b"\r\n");
    buf.freeze()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
