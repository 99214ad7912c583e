//! Local capture and per-peer playback sinks
//!
//! Actual device capture and rendering are platform concerns behind the
//! [`CaptureSource`] and [`SinkFactory`] traits; this module owns *when*
//! the stream is acquired and when sinks are created and destroyed.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::engine::StreamRef;
use super::types::PeerId;

/// Which capture kinds to request from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

/// Microphone/camera access. May be denied, in which case acquisition fails
/// and is not retried.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn request_user_media(&self, constraints: MediaConstraints) -> Result<StreamRef>;
}

/// A rendering surface bound to one stream. Dropping the sink releases it.
pub trait MediaSink: Send + Sync {
    fn attach(&self, stream: StreamRef);
}

/// Creates rendering surfaces. `muted` asks the surface to start without
/// audible playback; the local preview is always created muted so we never
/// play our own microphone back.
pub trait SinkFactory: Send + Sync {
    fn create_sink(&self, peer_id: &PeerId, muted: bool) -> Box<dyn MediaSink>;
}

struct MediaState {
    local_stream: Option<StreamRef>,
    local_preview: Option<Box<dyn MediaSink>>,
    remote_sinks: HashMap<PeerId, Box<dyn MediaSink>>,
}

/// Owns the local capture stream and the per-peer sink map.
pub struct MediaSession {
    capture: Arc<dyn CaptureSource>,
    sink_factory: Arc<dyn SinkFactory>,
    mute_remote: bool,
    state: Mutex<MediaState>,
}

impl MediaSession {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        sink_factory: Arc<dyn SinkFactory>,
        mute_remote: bool,
    ) -> Self {
        Self {
            capture,
            sink_factory,
            mute_remote,
            state: Mutex::new(MediaState {
                local_stream: None,
                local_preview: None,
                remote_sinks: HashMap::new(),
            }),
        }
    }

    /// Request the local capture stream. Idempotent: repeat calls return the
    /// already-acquired stream without touching the device again. On grant a
    /// local preview sink is attached, always muted.
    pub async fn acquire_local_media(&self, constraints: MediaConstraints) -> Result<StreamRef> {
        let mut state = self.state.lock().await;
        if let Some(stream) = &state.local_stream {
            return Ok(stream.clone());
        }

        info!("requesting access to local audio/video inputs");
        let stream = self
            .capture
            .request_user_media(constraints)
            .await
            .context("local media access denied")?;

        let preview = self.sink_factory.create_sink(&PeerId::new("local"), true);
        preview.attach(stream.clone());

        state.local_stream = Some(stream.clone());
        state.local_preview = Some(preview);
        Ok(stream)
    }

    /// The acquired local stream, if any.
    pub async fn local_stream(&self) -> Option<StreamRef> {
        self.state.lock().await.local_stream.clone()
    }

    /// Create the playback sink for a peer's incoming stream. Exactly one
    /// sink per peer: renegotiation never duplicates it. Whether the sink
    /// starts muted follows the configured default.
    pub async fn attach_remote_sink(&self, peer_id: &PeerId, stream: StreamRef) {
        let mut state = self.state.lock().await;
        if state.remote_sinks.contains_key(peer_id) {
            debug!(peer = %peer_id.short(), "remote sink already attached");
            return;
        }
        let sink = self.sink_factory.create_sink(peer_id, self.mute_remote);
        sink.attach(stream);
        state.remote_sinks.insert(peer_id.clone(), sink);
        info!(peer = %peer_id.short(), "attached remote media sink");
    }

    /// Release the sink for a peer. Safe no-op when none exists.
    pub async fn remove_sink(&self, peer_id: &PeerId) {
        self.state.lock().await.remote_sinks.remove(peer_id);
    }

    /// Release every remote sink. Used on session teardown; the local
    /// stream stays acquired so a rejoin does not re-prompt for capture.
    pub async fn clear_sinks(&self) {
        self.state.lock().await.remote_sinks.clear();
    }

    pub async fn sink_count(&self) -> usize {
        self.state.lock().await.remote_sinks.len()
    }

    pub async fn has_sink(&self, peer_id: &PeerId) -> bool {
        self.state.lock().await.remote_sinks.contains_key(peer_id)
    }
}

/// Sink that only logs attachments. Stands in where no rendering surface is
/// wired up, e.g. the headless CLI.
pub struct LogSink {
    peer_id: PeerId,
    muted: bool,
}

impl MediaSink for LogSink {
    fn attach(&self, stream: StreamRef) {
        info!(
            peer = %self.peer_id.short(),
            stream = stream.id(),
            muted = self.muted,
            "media sink attached"
        );
    }
}

pub struct LogSinkFactory;

impl SinkFactory for LogSinkFactory {
    fn create_sink(&self, peer_id: &PeerId, muted: bool) -> Box<dyn MediaSink> {
        Box::new(LogSink {
            peer_id: peer_id.clone(),
            muted,
        })
    }
}
