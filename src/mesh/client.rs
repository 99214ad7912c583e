//! Mesh client: signaling loop, event routing and per-peer negotiation
//!
//! One [`MeshClient`] maintains a fully-connected mesh with every other
//! member of its channel. The relay tells us who to peer with (`addPeer`),
//! designates the offerer side, and forwards descriptions and ICE candidates
//! between pairs. Everything peer-scoped lives in the [`PeerRegistry`];
//! spawned negotiation steps re-validate their registry entry before they
//! relay anything, so a `removePeer` that lands mid-negotiation simply
//! cancels interest in the outcome.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::engine::{ConnectionEngine, EngineEvent, PeerHandle};
use super::media::{CaptureSource, MediaConstraints, MediaSession, SinkFactory};
use super::registry::{NegotiationState, PeerRecord, PeerRegistry, PeerRole};
use super::types::{
    generate_identity, ClientMessage, PeerId, SdpType, SessionDescription, SignalingEvent,
};
use crate::config::Config;

pub struct MeshClient {
    config: Config,
    identity: String,
    engine: Arc<dyn ConnectionEngine>,
    media: Arc<MediaSession>,
    registry: Arc<PeerRegistry>,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: Option<mpsc::Receiver<ClientMessage>>,
    engine_tx: mpsc::Sender<EngineEvent>,
    engine_rx: Option<mpsc::Receiver<EngineEvent>>,
    shutdown: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl MeshClient {
    pub fn new(
        config: Config,
        engine: Arc<dyn ConnectionEngine>,
        capture: Arc<dyn CaptureSource>,
        sink_factory: Arc<dyn SinkFactory>,
    ) -> Self {
        let media = Arc::new(MediaSession::new(
            capture,
            sink_factory,
            config.mute_audio_by_default,
        ));
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        let (engine_tx, engine_rx) = mpsc::channel(100);
        let (shutdown, shutdown_rx) = watch::channel(false);

        Self {
            config,
            identity: generate_identity(),
            engine,
            media,
            registry: Arc::new(PeerRegistry::new()),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            engine_tx,
            engine_rx: Some(engine_rx),
            shutdown: Arc::new(shutdown),
            shutdown_rx,
        }
    }

    /// Session identity announced to the relay on join.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn registry(&self) -> Arc<PeerRegistry> {
        self.registry.clone()
    }

    pub fn media(&self) -> Arc<MediaSession> {
        self.media.clone()
    }

    /// Sender the connection engine reports events on. Handles created
    /// outside [`run`] (e.g. in tests) use this to reach the client.
    pub fn engine_events(&self) -> mpsc::Sender<EngineEvent> {
        self.engine_tx.clone()
    }

    /// Take the outbound message stream. [`run`] consumes it; tests take it
    /// to observe what would be relayed.
    pub fn take_outbound(&mut self) -> Result<mpsc::Receiver<ClientMessage>> {
        self.outbound_rx
            .take()
            .context("outbound receiver already taken")
    }

    /// Signal the run loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Handle other tasks can use to stop the run loop.
    pub fn shutdown_handle(&self) -> Arc<watch::Sender<bool>> {
        self.shutdown.clone()
    }

    /// Request capture access per the configured constraints. Idempotent;
    /// a precondition for joining a channel.
    pub async fn acquire_local_media(&self) -> Result<()> {
        self.media
            .acquire_local_media(MediaConstraints {
                audio: self.config.use_audio,
                video: self.config.use_video,
            })
            .await?;
        Ok(())
    }

    /// Announce ourselves on a channel. The relay responds with `addPeer`
    /// events pairing us with every current member.
    pub async fn join(&self, channel: &str, userdata: serde_json::Value) -> Result<()> {
        info!(channel, identity = %self.identity, "joining channel");
        self.outbound_tx
            .send(ClientMessage::Join {
                channel: channel.to_string(),
                name: self.identity.clone(),
                userdata,
            })
            .await
            .context("signaling channel closed")
    }

    /// Leave a channel. The relay emits `removePeer` to the other members.
    pub async fn part(&self, channel: &str) -> Result<()> {
        info!(channel, "leaving channel");
        self.outbound_tx
            .send(ClientMessage::Part(channel.to_string()))
            .await
            .context("signaling channel closed")
    }

    /// Connect to the signaling server, join the default channel and process
    /// events until disconnect or shutdown. A transport drop is fatal to the
    /// session, not the process: every peer and sink is torn down and the
    /// caller may run again to rejoin from scratch.
    pub async fn run(&mut self) -> Result<()> {
        info!(server = %self.config.signaling_server, "connecting to signaling server");
        let (ws, _) = connect_async(&self.config.signaling_server)
            .await
            .context("failed to connect to signaling server")?;
        info!("connected to signaling server");
        let (mut write, mut read) = ws.split();

        // Capture access gates the join: without local media there is
        // nothing to negotiate.
        self.acquire_local_media().await?;
        let channel = self.config.default_channel.clone();
        self.join(&channel, serde_json::json!({})).await?;

        let mut outbound_rx = self.take_outbound()?;
        let mut engine_rx = self
            .engine_rx
            .take()
            .context("engine event receiver already taken")?;
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("mesh client shutting down");
                        break;
                    }
                }
                Some(msg) = outbound_rx.recv() => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            error!(kind = msg.kind(), "failed to encode message: {e}");
                            continue;
                        }
                    };
                    debug!(kind = msg.kind(), "relaying message");
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!("signaling send failed: {e}");
                        break;
                    }
                }
                Some(event) = engine_rx.recv() => {
                    self.handle_engine_event(event).await;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            // Unknown kinds and malformed frames fail to
                            // decode here and are dropped; the relay may be
                            // newer than us.
                            match serde_json::from_str::<SignalingEvent>(&text) {
                                Ok(event) => self.dispatch(event).await,
                                Err(e) => debug!("ignoring undecodable signaling frame: {e}"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("disconnected from signaling server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("signaling socket error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        // Restore the receivers so the client can run again and rejoin
        // from scratch after a transport drop.
        self.outbound_rx = Some(outbound_rx);
        self.engine_rx = Some(engine_rx);

        self.teardown().await;
        Ok(())
    }

    /// Route one relay event to its handler.
    pub async fn dispatch(&self, event: SignalingEvent) {
        debug!(kind = event.kind(), peer = %event.peer_id().short(), "signaling event");
        match event {
            SignalingEvent::AddPeer {
                peer_id,
                should_create_offer,
            } => self.handle_add_peer(peer_id, should_create_offer).await,
            SignalingEvent::SessionDescription {
                peer_id,
                session_description,
            } => {
                self.handle_session_description(peer_id, session_description)
                    .await
            }
            SignalingEvent::IceCandidate {
                peer_id,
                ice_candidate,
            } => self.handle_ice_candidate(peer_id, ice_candidate).await,
            SignalingEvent::RemovePeer { peer_id } => self.handle_remove_peer(peer_id).await,
        }
    }

    /// The relay paired us with a new channel member. Exactly one side of
    /// the pair gets `should_create_offer`.
    async fn handle_add_peer(&self, peer_id: PeerId, should_create_offer: bool) {
        if self.registry.contains(&peer_id).await {
            // Happens when both ends share more than one channel.
            debug!(peer = %peer_id.short(), "already connected to peer");
            return;
        }

        let handle = match self.engine.create_peer(&peer_id, self.engine_tx.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(peer = %peer_id.short(), "failed to create peer connection: {e:#}");
                return;
            }
        };

        match self.media.local_stream().await {
            Some(stream) => {
                if let Err(e) = handle.add_stream(stream).await {
                    warn!(peer = %peer_id.short(), "failed to attach local stream: {e:#}");
                }
            }
            None => warn!(peer = %peer_id.short(), "no local stream acquired yet"),
        }

        let role = if should_create_offer {
            PeerRole::Offerer
        } else {
            PeerRole::Answerer
        };
        let registered = self
            .registry
            .register(PeerRecord {
                peer_id: peer_id.clone(),
                handle: handle.clone(),
                role,
                state: NegotiationState::Connecting,
            })
            .await;
        if !registered {
            let _ = handle.close().await;
            return;
        }
        info!(peer = %peer_id.short(), %role, "peer registered");

        if should_create_offer {
            self.spawn_offer(peer_id, handle);
        }
    }

    /// Create and relay our offer. Runs as its own task so other signaling
    /// events keep flowing while the engine works; a failure leaves the peer
    /// in `Connecting` and is surfaced in the log rather than retried.
    fn spawn_offer(&self, peer_id: PeerId, handle: Arc<dyn PeerHandle>) {
        let registry = self.registry.clone();
        let outbound = self.outbound_tx.clone();
        tokio::spawn(async move {
            debug!(peer = %peer_id.short(), "creating offer");
            let offer = match handle.create_offer().await {
                Ok(offer) => offer,
                Err(e) => {
                    warn!(peer = %peer_id.short(), "offer creation failed: {e:#}");
                    return;
                }
            };
            if let Err(e) = handle.set_local_description(offer.clone()).await {
                warn!(peer = %peer_id.short(), "offer setLocalDescription failed: {e:#}");
                return;
            }
            if !registry.contains(&peer_id).await {
                debug!(peer = %peer_id.short(), "peer removed during offer negotiation");
                return;
            }
            let _ = outbound
                .send(ClientMessage::RelaySessionDescription {
                    peer_id,
                    session_description: offer,
                })
                .await;
        });
    }

    /// Apply a remote description. An offer obliges us to answer: exactly
    /// one answer is relayed back per received offer.
    async fn handle_session_description(&self, peer_id: PeerId, desc: SessionDescription) {
        let Some(handle) = self.registry.handle(&peer_id).await else {
            debug!(peer = %peer_id.short(), "description for unregistered peer dropped");
            return;
        };
        self.registry
            .set_state(&peer_id, NegotiationState::Negotiating)
            .await;

        let registry = self.registry.clone();
        let outbound = self.outbound_tx.clone();
        tokio::spawn(async move {
            let kind = desc.kind;
            if let Err(e) = handle.set_remote_description(desc).await {
                warn!(peer = %peer_id.short(), %kind, "setRemoteDescription failed: {e:#}");
                return;
            }
            if kind != SdpType::Offer {
                // An answer completes the exchange; the engine reports the
                // live stream out of band.
                return;
            }

            debug!(peer = %peer_id.short(), "creating answer");
            let answer = match handle.create_answer().await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(peer = %peer_id.short(), "answer creation failed: {e:#}");
                    return;
                }
            };
            if let Err(e) = handle.set_local_description(answer.clone()).await {
                warn!(peer = %peer_id.short(), "answer setLocalDescription failed: {e:#}");
                return;
            }
            if !registry.contains(&peer_id).await {
                debug!(peer = %peer_id.short(), "peer removed during answer negotiation");
                return;
            }
            let _ = outbound
                .send(ClientMessage::RelaySessionDescription {
                    peer_id,
                    session_description: answer,
                })
                .await;
        });
    }

    /// Forward a remote candidate to the engine. Candidate application is
    /// commutative with description application, so the only precondition
    /// is that the peer record exists.
    async fn handle_ice_candidate(&self, peer_id: PeerId, candidate: super::types::IceCandidate) {
        let Some(handle) = self.registry.handle(&peer_id).await else {
            debug!(peer = %peer_id.short(), "candidate for unregistered peer dropped");
            return;
        };
        if let Err(e) = handle.add_ice_candidate(candidate).await {
            warn!(peer = %peer_id.short(), "addIceCandidate failed: {e:#}");
        }
    }

    /// Tear down one peer. Re-entrant and idempotent: removing an
    /// unregistered peer is a safe no-op.
    async fn handle_remove_peer(&self, peer_id: PeerId) {
        let Some(record) = self.registry.unregister(&peer_id).await else {
            debug!(peer = %peer_id.short(), "removePeer for unregistered peer");
            return;
        };
        self.media.remove_sink(&peer_id).await;
        if let Err(e) = record.handle.close().await {
            warn!(peer = %peer_id.short(), "error closing peer connection: {e:#}");
        }
        info!(peer = %peer_id.short(), "peer removed");
    }

    /// React to an engine callback. Completions for peers removed while the
    /// engine was working are no-ops.
    pub async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::IceCandidate { peer_id, candidate } => {
                if !self.registry.contains(&peer_id).await {
                    debug!(peer = %peer_id.short(), "candidate from removed peer dropped");
                    return;
                }
                let _ = self
                    .outbound_tx
                    .send(ClientMessage::RelayIceCandidate {
                        peer_id,
                        ice_candidate: candidate,
                    })
                    .await;
            }
            EngineEvent::EndOfCandidates { peer_id } => {
                debug!(peer = %peer_id.short(), "end of candidates");
            }
            EngineEvent::StreamAdded { peer_id, stream } => {
                if !self.registry.contains(&peer_id).await {
                    debug!(peer = %peer_id.short(), "stream from removed peer dropped");
                    return;
                }
                self.media.attach_remote_sink(&peer_id, stream).await;
                self.registry
                    .set_state(&peer_id, NegotiationState::Connected)
                    .await;
                info!(peer = %peer_id.short(), "peer connected");
            }
        }
    }

    /// Close every peer connection and release every sink. Registry and
    /// sink map are both empty afterwards.
    pub async fn teardown(&self) {
        let records = self.registry.drain().await;
        if !records.is_empty() {
            info!(peers = records.len(), "tearing down peer connections");
        }
        for record in records {
            if let Err(e) = record.handle.close().await {
                warn!(peer = %record.peer_id.short(), "error closing peer connection: {e:#}");
            }
        }
        self.media.clear_sinks().await;
    }
}
