//! Wire types for the relay signaling protocol
//!
//! Every frame is a JSON object of the shape `{"type": ..., "config": ...}`.
//! Inbound and outbound messages are separate enums because the relay never
//! echoes our own message kinds back at us.

use serde::{Deserialize, Serialize};

/// Relay-assigned peer identifier, unique per signaling session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines. The relay assigns ids, so cut on char
    /// boundaries rather than assuming ASCII.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Generate the session identity used to self-announce on join.
///
/// Grouped hexadecimal, 8-4-4-4-12 (a UUID-v4-like shape). Low collision
/// probability is all that is needed; this is not a security credential.
pub fn generate_identity() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut seg = |n: usize| -> String {
        (0..n / 4)
            .map(|_| format!("{:04x}", rng.gen_range(0u32..0x1_0000)))
            .collect()
    };
    format!(
        "{}-{}-{}-{}-{}",
        seg(8),
        seg(4),
        seg(4),
        seg(4),
        seg(12)
    )
}

/// Offer/answer tag of a session description, which determines the
/// receiving side's next action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// Session description blob exchanged between exactly two peers.
/// Immutable once relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Incremental connectivity hint tied to a peer. Arrival order relative to
/// description exchange is not guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
}

/// Events delivered by the relay. Unrecognized kinds fail to decode and are
/// dropped by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum SignalingEvent {
    #[serde(rename = "addPeer")]
    AddPeer {
        peer_id: PeerId,
        should_create_offer: bool,
    },
    #[serde(rename = "sessionDescription")]
    SessionDescription {
        peer_id: PeerId,
        session_description: SessionDescription,
    },
    #[serde(rename = "iceCandidate")]
    IceCandidate {
        peer_id: PeerId,
        ice_candidate: IceCandidate,
    },
    #[serde(rename = "removePeer")]
    RemovePeer { peer_id: PeerId },
}

impl SignalingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingEvent::AddPeer { .. } => "addPeer",
            SignalingEvent::SessionDescription { .. } => "sessionDescription",
            SignalingEvent::IceCandidate { .. } => "iceCandidate",
            SignalingEvent::RemovePeer { .. } => "removePeer",
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        match self {
            SignalingEvent::AddPeer { peer_id, .. }
            | SignalingEvent::SessionDescription { peer_id, .. }
            | SignalingEvent::IceCandidate { peer_id, .. }
            | SignalingEvent::RemovePeer { peer_id } => peer_id,
        }
    }
}

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join {
        channel: String,
        name: String,
        userdata: serde_json::Value,
    },
    /// The part directive carries the bare channel name as its config.
    #[serde(rename = "part")]
    Part(String),
    #[serde(rename = "relayICECandidate")]
    RelayIceCandidate {
        peer_id: PeerId,
        ice_candidate: IceCandidate,
    },
    #[serde(rename = "relaySessionDescription")]
    RelaySessionDescription {
        peer_id: PeerId,
        session_description: SessionDescription,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Part(_) => "part",
            ClientMessage::RelayIceCandidate { .. } => "relayICECandidate",
            ClientMessage::RelaySessionDescription { .. } => "relaySessionDescription",
        }
    }
}
