//! Full-mesh peer connectivity driven by a relay signaling channel
//!
//! The relay pairs channel members with `addPeer` events (designating one
//! side the offerer), forwards session descriptions and ICE candidates, and
//! announces departures with `removePeer`. This module owns the per-peer
//! negotiation state machine and the registries that track it; the actual
//! peer-connection transport sits behind the engine seam.

pub mod client;
pub mod engine;
pub mod media;
pub mod registry;
pub mod types;
pub mod webrtc;

#[cfg(test)]
mod tests;

pub use client::MeshClient;
pub use engine::{ConnectionEngine, EngineEvent, MediaStream, PeerHandle, StreamRef};
pub use media::{
    CaptureSource, LogSinkFactory, MediaConstraints, MediaSession, MediaSink, SinkFactory,
};
pub use registry::{NegotiationState, PeerRecord, PeerRegistry, PeerRole};
pub use types::{
    generate_identity, ClientMessage, IceCandidate, PeerId, SdpType, SessionDescription,
    SignalingEvent,
};
pub use webrtc::{SilentCapture, WebRtcEngine};
