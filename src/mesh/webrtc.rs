//! Connection engine backed by webrtc-rs
//!
//! Drives `RTCPeerConnection` through the [`ConnectionEngine`] seam: offers
//! and answers map to `create_offer`/`create_answer` plus description
//! application, engine callbacks are forwarded as [`EngineEvent`]s. Device
//! capture stays a platform concern; [`SilentCapture`] registers placeholder
//! sample tracks so negotiation carries audio/video m-lines without a real
//! microphone or camera.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::engine::{ConnectionEngine, EngineEvent, MediaStream, PeerHandle, StreamRef};
use super::media::{CaptureSource, MediaConstraints};
use super::types::{IceCandidate, PeerId, SdpType, SessionDescription};

/// Local capture stream: a bundle of local tracks under one stream id.
pub struct LocalTracks {
    id: String,
    tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
}

impl MediaStream for LocalTracks {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Remote stream as reported by `on_track`.
pub struct RemoteTrackStream {
    id: String,
    track: Arc<TrackRemote>,
}

impl RemoteTrackStream {
    pub fn track(&self) -> &Arc<TrackRemote> {
        &self.track
    }
}

impl MediaStream for RemoteTrackStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Capture source that registers silent placeholder tracks. Real devices
/// would feed samples into these; negotiation does not care either way.
pub struct SilentCapture;

#[async_trait]
impl CaptureSource for SilentCapture {
    async fn request_user_media(&self, constraints: MediaConstraints) -> Result<StreamRef> {
        let mut tracks: Vec<Arc<dyn TrackLocal + Send + Sync>> = Vec::new();
        if constraints.audio {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    ..Default::default()
                },
                "audio".to_string(),
                "local-media".to_string(),
            )));
        }
        if constraints.video {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_string(),
                    ..Default::default()
                },
                "video".to_string(),
                "local-media".to_string(),
            )));
        }
        if tracks.is_empty() {
            return Err(anyhow!("constraints request neither audio nor video"));
        }
        Ok(Arc::new(LocalTracks {
            id: "local-media".to_string(),
            tracks,
        }))
    }
}

/// Engine factory configured with the ICE server list.
pub struct WebRtcEngine {
    ice_servers: Vec<String>,
}

impl WebRtcEngine {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl ConnectionEngine for WebRtcEngine {
    async fn create_peer(
        &self,
        peer_id: &PeerId,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Arc<dyn PeerHandle>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = self
            .ice_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);
        let peer = WebRtcPeer::new(peer_id.clone(), pc, events);
        peer.wire_callbacks();
        Ok(Arc::new(peer))
    }
}

/// One `RTCPeerConnection` behind the [`PeerHandle`] seam.
pub struct WebRtcPeer {
    peer_id: PeerId,
    pc: Arc<RTCPeerConnection>,
    events: mpsc::Sender<EngineEvent>,
}

impl WebRtcPeer {
    fn new(peer_id: PeerId, pc: Arc<RTCPeerConnection>, events: mpsc::Sender<EngineEvent>) -> Self {
        Self { peer_id, pc, events }
    }

    fn wire_callbacks(&self) {
        let peer_id = self.peer_id.clone();
        let events = self.events.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let peer_id = peer_id.clone();
                let events = events.clone();
                Box::pin(async move {
                    let event = match candidate {
                        Some(c) => match c.to_json() {
                            Ok(init) => EngineEvent::IceCandidate {
                                peer_id,
                                candidate: IceCandidate {
                                    candidate: init.candidate,
                                    sdp_mline_index: init.sdp_mline_index,
                                    sdp_mid: init.sdp_mid,
                                },
                            },
                            Err(e) => {
                                debug!(peer = %peer_id.short(), "unencodable candidate: {e}");
                                return;
                            }
                        },
                        // A null candidate signals end-of-candidates.
                        None => EngineEvent::EndOfCandidates { peer_id },
                    };
                    let _ = events.send(event).await;
                })
            }));

        // First remote track marks the stream's arrival; further tracks of
        // the same stream do not re-announce it.
        let announced = Arc::new(AtomicBool::new(false));
        let peer_id = self.peer_id.clone();
        let events = self.events.clone();
        self.pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let announced = announced.clone();
            let peer_id = peer_id.clone();
            let events = events.clone();
            Box::pin(async move {
                if announced.swap(true, Ordering::SeqCst) {
                    return;
                }
                let stream: StreamRef = Arc::new(RemoteTrackStream {
                    id: track.stream_id(),
                    track,
                });
                let _ = events
                    .send(EngineEvent::StreamAdded { peer_id, stream })
                    .await;
            })
        }));

        let peer_id = self.peer_id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    info!(peer = %peer_id.short(), "connection state: {state:?}");
                })
            }));
    }

    fn to_wire(desc: &RTCSessionDescription) -> Result<SessionDescription> {
        let kind = match desc.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            other => return Err(anyhow!("unexpected description type {other}")),
        };
        Ok(SessionDescription {
            kind,
            sdp: desc.sdp.clone(),
        })
    }

    fn from_wire(desc: &SessionDescription) -> Result<RTCSessionDescription> {
        let rtc = match desc.kind {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp.clone())?,
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp.clone())?,
        };
        Ok(rtc)
    }
}

#[async_trait]
impl PeerHandle for WebRtcPeer {
    async fn add_stream(&self, stream: StreamRef) -> Result<()> {
        let local = stream
            .as_any()
            .downcast_ref::<LocalTracks>()
            .context("stream was not produced for the webrtc engine")?;
        for track in &local.tracks {
            self.pc.add_track(track.clone()).await?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Self::to_wire(&offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        Self::to_wire(&answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(Self::from_wire(&desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(Self::from_wire(&desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
