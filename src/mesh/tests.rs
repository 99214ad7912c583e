//! Wire-format and registry tests

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::engine::{PeerHandle, StreamRef};
use super::registry::{NegotiationState, PeerRecord, PeerRegistry, PeerRole};
use super::types::*;

struct InertHandle;

#[async_trait]
impl PeerHandle for InertHandle {
    async fn add_stream(&self, _stream: StreamRef) -> Result<()> {
        Ok(())
    }
    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0"))
    }
    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::answer("v=0"))
    }
    async fn set_local_description(&self, _desc: SessionDescription) -> Result<()> {
        Ok(())
    }
    async fn set_remote_description(&self, _desc: SessionDescription) -> Result<()> {
        Ok(())
    }
    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn record(peer_id: &str, role: PeerRole) -> PeerRecord {
    PeerRecord {
        peer_id: PeerId::from(peer_id),
        handle: Arc::new(InertHandle),
        role,
        state: NegotiationState::Connecting,
    }
}

#[test]
fn test_add_peer_event_format() {
    // Exact frame shape the relay sends
    let frame = r#"{"type":"addPeer","config":{"peer_id":"abc123","should_create_offer":true}}"#;
    let event: SignalingEvent = serde_json::from_str(frame).unwrap();
    assert_eq!(event.kind(), "addPeer");
    assert_eq!(event.peer_id().as_str(), "abc123");
    match event {
        SignalingEvent::AddPeer {
            should_create_offer,
            ..
        } => assert!(should_create_offer),
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn test_session_description_event_format() {
    let frame = r#"{"type":"sessionDescription","config":{"peer_id":"abc123","session_description":{"type":"offer","sdp":"v=0\r\n"}}}"#;
    let event: SignalingEvent = serde_json::from_str(frame).unwrap();
    match event {
        SignalingEvent::SessionDescription {
            peer_id,
            session_description,
        } => {
            assert_eq!(peer_id.as_str(), "abc123");
            assert_eq!(session_description.kind, SdpType::Offer);
            assert_eq!(session_description.sdp, "v=0\r\n");
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn test_ice_candidate_event_format() {
    // sdpMid is optional on the wire
    let frame = r#"{"type":"iceCandidate","config":{"peer_id":"abc123","ice_candidate":{"sdpMLineIndex":0,"candidate":"candidate:1 1 UDP 2130706431 192.168.1.1 54321 typ host"}}}"#;
    let event: SignalingEvent = serde_json::from_str(frame).unwrap();
    match event {
        SignalingEvent::IceCandidate { ice_candidate, .. } => {
            assert_eq!(ice_candidate.sdp_mline_index, Some(0));
            assert_eq!(ice_candidate.sdp_mid, None);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn test_remove_peer_event_format() {
    let frame = r#"{"type":"removePeer","config":{"peer_id":"abc123"}}"#;
    let event: SignalingEvent = serde_json::from_str(frame).unwrap();
    assert_eq!(event.kind(), "removePeer");
}

#[test]
fn test_unknown_event_kind_fails_decode() {
    // The dispatch loop drops undecodable frames instead of failing
    let frame = r#"{"type":"serverNotice","config":{"message":"hi"}}"#;
    assert!(serde_json::from_str::<SignalingEvent>(frame).is_err());
}

#[test]
fn test_join_message_format() {
    let msg = ClientMessage::Join {
        channel: "room1".to_string(),
        name: "aaaabbbb-cccc-dddd-eeee-ffff00001111".to_string(),
        userdata: serde_json::json!({"whatever-you-want-here": "stuff"}),
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"join\""));
    assert!(json.contains("\"channel\":\"room1\""));
    assert!(json.contains("\"name\":\"aaaabbbb-cccc-dddd-eeee-ffff00001111\""));
    assert!(json.contains("whatever-you-want-here"));
}

#[test]
fn test_part_message_carries_bare_channel() {
    let msg = ClientMessage::Part("room1".to_string());
    let json = serde_json::to_string(&msg).unwrap();
    assert_eq!(json, r#"{"type":"part","config":"room1"}"#);
}

#[test]
fn test_relay_ice_candidate_message_format() {
    let msg = ClientMessage::RelayIceCandidate {
        peer_id: PeerId::from("abc123"),
        ice_candidate: IceCandidate {
            candidate: "candidate:1 1 UDP 2130706431 192.168.1.1 54321 typ host".to_string(),
            sdp_mline_index: Some(0),
            sdp_mid: None,
        },
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"relayICECandidate\""));
    assert!(json.contains("\"sdpMLineIndex\":0"));
    // absent sdpMid is omitted, not null
    assert!(!json.contains("sdpMid"));
}

#[test]
fn test_relay_session_description_message_format() {
    let msg = ClientMessage::RelaySessionDescription {
        peer_id: PeerId::from("abc123"),
        session_description: SessionDescription::answer("v=0\r\n"),
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"relaySessionDescription\""));
    assert!(json.contains("\"type\":\"answer\""));

    let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, msg);
}

#[test]
fn test_identity_shape() {
    let id = generate_identity();
    assert_eq!(id.len(), 36);
    let groups: Vec<&str> = id.split('-').collect();
    let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    assert_eq!(lengths, vec![8, 4, 4, 4, 12]);
    for group in groups {
        assert!(group.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn test_identity_uniqueness() {
    assert_ne!(generate_identity(), generate_identity());
}

#[test]
fn test_peer_id_short_handles_multibyte_ids() {
    assert_eq!(PeerId::from("deadbeef-cafe").short(), "deadbeef");
    assert_eq!(PeerId::from("abc").short(), "abc");
    // Ids come from the relay; nothing guarantees ASCII
    assert_eq!(PeerId::from("ünïcödé-péér-id").short(), "ünïcödé-");
    assert_eq!(PeerId::from("日本語だけの識別子です").short(), "日本語だけの識別");
}

#[tokio::test]
async fn test_registry_register_is_idempotent() {
    let registry = PeerRegistry::new();
    assert!(registry.register(record("B", PeerRole::Offerer)).await);
    assert!(!registry.register(record("B", PeerRole::Answerer)).await);
    assert_eq!(registry.len().await, 1);
    // The original record wins
    assert_eq!(registry.role(&PeerId::from("B")).await, Some(PeerRole::Offerer));
}

#[tokio::test]
async fn test_registry_unregister_releases_record() {
    let registry = PeerRegistry::new();
    registry.register(record("B", PeerRole::Answerer)).await;
    assert!(registry.unregister(&PeerId::from("B")).await.is_some());
    assert!(registry.unregister(&PeerId::from("B")).await.is_none());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_registry_set_state_on_missing_peer_is_noop() {
    let registry = PeerRegistry::new();
    registry
        .set_state(&PeerId::from("ghost"), NegotiationState::Connected)
        .await;
    assert!(registry.state(&PeerId::from("ghost")).await.is_none());
}

#[tokio::test]
async fn test_registry_drain_empties_map() {
    let registry = PeerRegistry::new();
    registry.register(record("A", PeerRole::Offerer)).await;
    registry.register(record("B", PeerRole::Answerer)).await;
    let drained = registry.drain().await;
    assert_eq!(drained.len(), 2);
    assert!(registry.is_empty().await);
}
