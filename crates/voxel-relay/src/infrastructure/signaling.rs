//! WebRTC signaling bridge.
//!
//! Exchanges session descriptions with browsers: the browser POSTs an
//! offer, the relay builds a peer connection, and the answer travels back
//! in the same HTTP response. There is no trickle-ICE endpoint, so the
//! answer is returned only after candidate gathering completes — the
//! single round trip must carry everything the browser needs.
//!
//! Every negotiated peer connection is registered under a fresh uuid in a
//! [`PeerRegistry`]. Two things reclaim entries: a connection-state
//! callback removes peers that report closed/failed/disconnected, and
//! [`PeerRegistry::close_all`] — wired to process shutdown — closes
//! whatever is left.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Errors produced by the signaling exchange.
///
/// `NotAnOffer` and `InvalidOffer` are client faults (HTTP 400); the rest
/// are internal.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The posted description is not an offer.
    #[error("expected a session description of type \"offer\", got {got:?}")]
    NotAnOffer { got: RTCSdpType },

    /// The offer's SDP could not be applied as a remote description.
    #[error("offer could not be applied: {0}")]
    InvalidOffer(#[source] webrtc::Error),

    /// Building the peer connection or producing the answer failed.
    #[error("negotiation failed: {0}")]
    Negotiation(#[source] webrtc::Error),

    /// Negotiation completed but no local description materialized.
    #[error("no local description after negotiation")]
    MissingLocalDescription,

    /// The WebRTC API stack could not be constructed.
    #[error("failed to build WebRTC API: {0}")]
    Api(#[source] webrtc::Error),
}

/// Process-wide set of negotiated peer connections.
pub struct PeerRegistry {
    api: API,
    peers: Mutex<HashMap<Uuid, Arc<RTCPeerConnection>>>,
}

impl PeerRegistry {
    /// Builds the registry with a media engine carrying the default codec
    /// set, so browser offers with audio/video sections negotiate cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::Api`] if codec or interceptor
    /// registration fails.
    pub fn new() -> Result<Self, SignalingError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(SignalingError::Api)?;
        let interceptors =
            register_default_interceptors(Registry::new(), &mut media).map_err(SignalingError::Api)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(interceptors)
            .build();

        Ok(Self {
            api,
            peers: Mutex::new(HashMap::new()),
        })
    }

    /// Negotiates an answer for a browser offer and registers the
    /// resulting peer connection.
    ///
    /// Blocks (asynchronously) until ICE gathering completes so the
    /// returned description carries its candidates.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::NotAnOffer`] / [`SignalingError::InvalidOffer`]
    /// for client mistakes, and [`SignalingError::Negotiation`] when the
    /// local side fails.
    pub async fn answer(
        self: &Arc<Self>,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription, SignalingError> {
        if offer.sdp_type != RTCSdpType::Offer {
            return Err(SignalingError::NotAnOffer {
                got: offer.sdp_type,
            });
        }

        let pc = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(SignalingError::Negotiation)?,
        );
        let id = Uuid::new_v4();

        // Reclaim the registry slot when the browser goes away. The source
        // of truth for liveness is the connection state; a Weak reference
        // keeps the registry droppable.
        let registry: Weak<PeerRegistry> = Arc::downgrade(self);
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let registry = registry.clone();
            Box::pin(async move {
                match state {
                    RTCPeerConnectionState::Closed
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected => {
                        if let Some(registry) = registry.upgrade() {
                            registry.remove(id).await;
                        }
                    }
                    _ => debug!("peer {id}: connection state {state}"),
                }
            })
        }));

        pc.set_remote_description(offer)
            .await
            .map_err(SignalingError::InvalidOffer)?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(SignalingError::Negotiation)?;

        // Subscribe to gathering completion *before* setting the local
        // description, which is what kicks gathering off.
        let mut gathered = pc.gathering_complete_promise().await;
        pc.set_local_description(answer)
            .await
            .map_err(SignalingError::Negotiation)?;
        let _ = gathered.recv().await;

        let local = pc
            .local_description()
            .await
            .ok_or(SignalingError::MissingLocalDescription)?;

        self.peers.lock().await.insert(id, pc);
        info!("peer {id}: registered ({} active)", self.active_peers().await);

        Ok(local)
    }

    /// Number of registered peer connections.
    pub async fn active_peers(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Closes and forgets every registered peer connection.
    ///
    /// This is the shutdown hook: nothing else guarantees teardown for
    /// peers whose state callbacks never fired.
    pub async fn close_all(&self) {
        let drained: Vec<(Uuid, Arc<RTCPeerConnection>)> =
            self.peers.lock().await.drain().collect();
        let count = drained.len();
        for (id, pc) in drained {
            if let Err(e) = pc.close().await {
                warn!("peer {id}: close failed: {e}");
            }
        }
        if count > 0 {
            info!("closed {count} peer connection(s)");
        }
    }

    async fn remove(&self, id: Uuid) {
        if self.peers.lock().await.remove(&id).is_some() {
            debug!("peer {id}: removed from registry");
        }
    }
}
