//! Peer registry: the single source of truth for who we are connected to
//!
//! Every peer-scoped mutation in the client goes through this map, and every
//! asynchronous continuation re-validates its entry here before acting.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::engine::PeerHandle;
use super::types::PeerId;

/// Which side of the pair creates the offer. Assigned by the relay via
/// `should_create_offer`; exactly one side of a pair is the offerer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Offerer,
    Answerer,
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Offerer => write!(f, "offerer"),
            PeerRole::Answerer => write!(f, "answerer"),
        }
    }
}

/// Negotiation phase of a registered peer. The initial `Unconnected` phase
/// is implicit: no record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Connecting,
    Negotiating,
    Connected,
    Closed,
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationState::Connecting => write!(f, "connecting"),
            NegotiationState::Negotiating => write!(f, "negotiating"),
            NegotiationState::Connected => write!(f, "connected"),
            NegotiationState::Closed => write!(f, "closed"),
        }
    }
}

/// Registry entry for one peer.
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub handle: Arc<dyn PeerHandle>,
    pub role: PeerRole,
    pub state: NegotiationState,
}

/// Map from peer id to connection record. No side effects beyond the map
/// itself; never initiates network I/O.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, PeerRecord>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record unless one already exists for the id. Returns false
    /// (and leaves the map untouched) on a duplicate.
    pub async fn register(&self, record: PeerRecord) -> bool {
        let mut peers = self.peers.write().await;
        if peers.contains_key(&record.peer_id) {
            return false;
        }
        peers.insert(record.peer_id.clone(), record);
        true
    }

    pub async fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    pub async fn handle(&self, peer_id: &PeerId) -> Option<Arc<dyn PeerHandle>> {
        self.peers.read().await.get(peer_id).map(|r| r.handle.clone())
    }

    pub async fn role(&self, peer_id: &PeerId) -> Option<PeerRole> {
        self.peers.read().await.get(peer_id).map(|r| r.role)
    }

    pub async fn state(&self, peer_id: &PeerId) -> Option<NegotiationState> {
        self.peers.read().await.get(peer_id).map(|r| r.state)
    }

    /// Update the negotiation phase of a registered peer. A no-op when the
    /// record was removed mid-flight.
    pub async fn set_state(&self, peer_id: &PeerId, state: NegotiationState) {
        if let Some(record) = self.peers.write().await.get_mut(peer_id) {
            record.state = state;
        }
    }

    /// Drop and return the record for a peer, if any.
    pub async fn unregister(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.peers.write().await.remove(peer_id)
    }

    /// Remove and return every record. Used on session teardown.
    pub async fn drain(&self) -> Vec<PeerRecord> {
        self.peers.write().await.drain().map(|(_, r)| r).collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
