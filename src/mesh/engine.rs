//! Seam between the negotiation core and the platform peer-connection engine
//!
//! The core drives offer/answer negotiation and candidate exchange through
//! these traits; the engine's own callbacks come back as [`EngineEvent`]s on
//! a channel so the client loop can re-validate the peer registry before
//! acting on them.

use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{IceCandidate, PeerId, SessionDescription};

/// Opaque media stream handle. Concrete engines pair this with their own
/// stream type; `as_any` lets an engine recover it in `add_stream`.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

pub type StreamRef = Arc<dyn MediaStream>;

/// Events emitted by a peer's connection engine.
#[derive(Clone)]
pub enum EngineEvent {
    /// A local ICE candidate is ready to relay to the remote side.
    IceCandidate {
        peer_id: PeerId,
        candidate: IceCandidate,
    },
    /// The engine signalled end-of-candidates for this peer.
    EndOfCandidates { peer_id: PeerId },
    /// A remote media stream arrived; the peer is live.
    StreamAdded { peer_id: PeerId, stream: StreamRef },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::IceCandidate { .. } => "iceCandidate",
            EngineEvent::EndOfCandidates { .. } => "endOfCandidates",
            EngineEvent::StreamAdded { .. } => "streamAdded",
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        match self {
            EngineEvent::IceCandidate { peer_id, .. }
            | EngineEvent::EndOfCandidates { peer_id }
            | EngineEvent::StreamAdded { peer_id, .. } => peer_id,
        }
    }
}

impl std::fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEvent")
            .field("kind", &self.kind())
            .field("peer_id", &self.peer_id())
            .finish()
    }
}

/// Factory for per-peer connection handles.
#[async_trait]
pub trait ConnectionEngine: Send + Sync {
    async fn create_peer(
        &self,
        peer_id: &PeerId,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Arc<dyn PeerHandle>>;
}

/// One peer's stateful connection. The core never assumes candidate and
/// description application order beyond "handle exists"; the engine's
/// contract makes them commutative.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    async fn add_stream(&self, stream: StreamRef) -> Result<()>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close(&self) -> Result<()>;
}
