//! Capture trait definitions
//!
//! Platform-agnostic types for the device boundary: what a recording asks
//! for, the tracks a backend hands back, and the encoder that turns a live
//! stream into media fragments.

use super::error::CaptureResult;
use crate::media::preview::LivePreview;
use crate::recorder::fragment::Fragment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Which input devices a recording needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    /// Capture from a camera
    pub video: bool,

    /// Capture from a microphone
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

impl MediaConstraints {
    /// True when neither video nor audio is requested
    pub fn is_empty(&self) -> bool {
        !self.video && !self.audio
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// Lifecycle of a device track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Device is open and producing data
    Live,
    /// Device has been released
    Ended,
}

/// Backend hook that actually turns a device off
///
/// `request_stop` must not block: it is called from `Drop` as well as from
/// async code. Completion is signalled through the track's state channel.
pub trait TrackControl: Send + Sync {
    fn request_stop(&self);
}

/// One acquired input device (camera or microphone)
#[derive(Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    state: watch::Receiver<TrackState>,
    control: Arc<dyn TrackControl>,
}

impl MediaTrack {
    /// Create a track whose state is driven by the backend through `state`
    pub fn new(
        kind: TrackKind,
        label: impl Into<String>,
        state: watch::Receiver<TrackState>,
        control: Arc<dyn TrackControl>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            state,
            control,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current state as last reported by the backend
    pub fn ready_state(&self) -> TrackState {
        *self.state.borrow()
    }

    /// Ask the backend to release the device. Idempotent.
    pub fn stop(&self) {
        if self.ready_state() == TrackState::Live {
            self.control.request_stop();
        }
    }

    /// Wait until the backend confirms the device is released
    ///
    /// A backend that goes away without reporting counts as released.
    pub async fn ended(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == TrackState::Ended).await;
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("state", &self.ready_state())
            .finish()
    }
}

/// A live input stream made of one or more tracks
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Tracks of a single kind
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    /// Whether any track is still live
    pub fn is_active(&self) -> bool {
        self.tracks
            .iter()
            .any(|t| t.ready_state() == TrackState::Live)
    }

    /// Description of the stream for a live preview surface
    pub fn live_preview(&self) -> LivePreview {
        LivePreview {
            stream_id: self.id.clone(),
            track_labels: self
                .tracks
                .iter()
                .map(|t| format!("{}: {}", t.kind(), t.label()))
                .collect(),
        }
    }
}

/// Options handed to an encoder when a recording starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Container/codec the encoder should produce
    pub mime_type: String,

    /// Preferred fragment cadence; `None` lets the backend decide
    pub timeslice_ms: Option<u64>,
}

/// Where an encoder delivers fragments, in emission order
pub type FragmentSink = mpsc::Sender<Fragment>;

/// Source of capture devices
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Request access to the devices described by `constraints`
    ///
    /// Suspends until the grant resolves. Fails with `PermissionDenied` or
    /// `DeviceUnavailable`; nothing stays acquired on failure.
    async fn acquire(&self, constraints: &MediaConstraints) -> CaptureResult<MediaStream>;

    /// Build an encoder recording from an acquired stream
    fn create_encoder(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
    ) -> CaptureResult<Box<dyn MediaEncoder>>;
}

/// Turns a live stream into encoded fragments
#[async_trait]
pub trait MediaEncoder: Send {
    /// Content type of the concatenated fragments
    fn mime_type(&self) -> &str;

    /// Begin emitting fragments into `sink`
    fn start(&mut self, sink: FragmentSink) -> CaptureResult<()>;

    /// Finalize: flush any buffered data as a last fragment, then close the sink
    async fn stop(&mut self) -> CaptureResult<()>;
}
