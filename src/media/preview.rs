//! Preview surfaces
//!
//! A preview surface shows either the live stream while recording or a
//! playback reference while reviewing. It is a pure consumer: the core only
//! assigns what it shows.

use super::playback::PlaybackRef;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Live stream description handed to a preview surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePreview {
    pub stream_id: String,
    pub track_labels: Vec<String>,
}

/// What a preview surface currently shows
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PreviewSource {
    #[default]
    Empty,
    Live(LivePreview),
    Artifact { playback: PlaybackRef },
}

/// Display sink for the capture flow
pub trait PreviewSurface: Send + Sync {
    /// Show the live stream being recorded
    fn show_live(&self, preview: &LivePreview);

    /// Show a finished artifact
    fn show_artifact(&self, playback: &PlaybackRef);

    /// Show nothing
    fn clear(&self);
}

/// Preview surface that remembers its current source
#[derive(Debug, Default)]
pub struct PreviewSlot {
    source: Mutex<PreviewSource>,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> PreviewSource {
        self.source.lock().clone()
    }
}

impl PreviewSurface for PreviewSlot {
    fn show_live(&self, preview: &LivePreview) {
        *self.source.lock() = PreviewSource::Live(preview.clone());
    }

    fn show_artifact(&self, playback: &PlaybackRef) {
        *self.source.lock() = PreviewSource::Artifact {
            playback: playback.clone(),
        };
    }

    fn clear(&self) {
        *self.source.lock() = PreviewSource::Empty;
    }
}
