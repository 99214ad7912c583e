pub mod config;
pub mod mesh;

pub use config::Config;
pub use mesh::{
    ClientMessage, ConnectionEngine, EngineEvent, IceCandidate, MeshClient, NegotiationState,
    PeerHandle, PeerId, PeerRegistry, PeerRole, SdpType, SessionDescription, SignalingEvent,
};
