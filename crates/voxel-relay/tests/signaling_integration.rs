//! Integration tests for the WebRTC signaling bridge.
//!
//! The "browser" here is a real `webrtc` peer connection created in the
//! test: it produces a genuine offer (data channel, full ICE gathering),
//! hands it to the registry, and applies the returned answer — the same
//! negotiation the HTTP handler drives, minus the JSON transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use webrtc::api::APIBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use voxel_relay::infrastructure::signaling::{PeerRegistry, SignalingError};

/// Builds a browser-side peer and a complete offer (candidates gathered).
async fn browser_offer() -> (Arc<RTCPeerConnection>, RTCSessionDescription) {
    let api = APIBuilder::new().build();
    let pc = Arc::new(
        api.new_peer_connection(RTCConfiguration::default())
            .await
            .expect("browser peer"),
    );
    // A data channel gives the offer a media section without needing
    // codecs on the offerer side.
    pc.create_data_channel("probe", None).await.expect("data channel");

    let offer = pc.create_offer(None).await.expect("create offer");
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await.expect("set local");
    let _ = timeout(Duration::from_secs(10), gathered.recv()).await;

    let local = pc.local_description().await.expect("local description");
    (pc, local)
}

#[tokio::test]
async fn test_valid_offer_yields_an_answer() {
    let registry = Arc::new(PeerRegistry::new().unwrap());
    let (browser, offer) = browser_offer().await;

    let answer = timeout(Duration::from_secs(10), registry.answer(offer))
        .await
        .expect("negotiation timed out")
        .expect("negotiation failed");

    assert_eq!(answer.sdp_type, RTCSdpType::Answer);
    assert!(!answer.sdp.is_empty());
    assert_eq!(registry.active_peers().await, 1);

    // The browser side must be able to apply the answer.
    browser
        .set_remote_description(answer)
        .await
        .expect("answer must be applicable");
}

#[tokio::test]
async fn test_each_offer_registers_a_distinct_peer() {
    let registry = Arc::new(PeerRegistry::new().unwrap());

    let (_browser_a, offer_a) = browser_offer().await;
    let (_browser_b, offer_b) = browser_offer().await;

    registry.answer(offer_a).await.expect("first negotiation");
    registry.answer(offer_b).await.expect("second negotiation");

    assert_eq!(registry.active_peers().await, 2);
}

#[tokio::test]
async fn test_close_all_drains_the_registry() {
    let registry = Arc::new(PeerRegistry::new().unwrap());
    let (_browser, offer) = browser_offer().await;
    registry.answer(offer).await.expect("negotiation");
    assert_eq!(registry.active_peers().await, 1);

    registry.close_all().await;
    assert_eq!(registry.active_peers().await, 0);
}

#[tokio::test]
async fn test_answer_typed_description_is_rejected() {
    let registry = Arc::new(PeerRegistry::new().unwrap());
    let (_browser, offer) = browser_offer().await;

    // Same SDP, wrong type — built the way the HTTP layer would receive
    // it (serde, no eager SDP parse).
    let wrong: RTCSessionDescription = serde_json::from_value(serde_json::json!({
        "type": "answer",
        "sdp": offer.sdp,
    }))
    .unwrap();

    let err = registry.answer(wrong).await.unwrap_err();
    assert!(matches!(
        err,
        SignalingError::NotAnOffer {
            got: RTCSdpType::Answer
        }
    ));
    assert_eq!(registry.active_peers().await, 0, "rejected offers must not register");
}

#[tokio::test]
async fn test_garbage_sdp_is_an_invalid_offer() {
    let registry = Arc::new(PeerRegistry::new().unwrap());

    let garbage: RTCSessionDescription = serde_json::from_value(serde_json::json!({
        "type": "offer",
        "sdp": "this is not a session description",
    }))
    .unwrap();

    let err = registry.answer(garbage).await.unwrap_err();
    assert!(matches!(err, SignalingError::InvalidOffer(_)));
    assert_eq!(registry.active_peers().await, 0);
}
