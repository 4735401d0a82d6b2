//! Recording state management
//!
//! Defines the capture state machine, the settings a recording is started
//! with, and what a finished recording hands back.

use crate::capture::traits::MediaConstraints;
use crate::media::artifact::MediaArtifact;
use crate::media::playback::PlaybackRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Content type of every recorded artifact
pub const RECORDED_CONTENT_TYPE: &str = "video/webm";

/// Default name of a recorded artifact
pub const RECORDED_FILE_NAME: &str = "recorded-video.webm";

/// Current state of the capture controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session
    #[default]
    Idle,
    /// Device access requested, grant pending
    Starting,
    /// A session owns the devices and is buffering fragments
    Recording,
}

/// Settings applied to every capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingSettings {
    /// Devices to request
    pub constraints: MediaConstraints,

    /// Name of the finished artifact
    pub file_name: String,

    /// Preferred fragment cadence in milliseconds
    pub timeslice_ms: Option<u64>,

    /// Fragments that may queue between encoder and controller
    pub fragment_queue_depth: usize,

    /// Upper bound on waiting for device release; unset waits indefinitely
    pub release_timeout_ms: Option<u64>,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            constraints: MediaConstraints::default(),
            file_name: RECORDED_FILE_NAME.to_string(),
            timeslice_ms: None,
            fragment_queue_depth: 64,
            release_timeout_ms: None,
        }
    }
}

impl RecordingSettings {
    pub fn release_timeout(&self) -> Option<Duration> {
        self.release_timeout_ms.map(Duration::from_millis)
    }
}

/// Events emitted by the capture controller
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Devices acquired, recording under way
    Started { session_id: String },
    /// Recording finalized into an artifact
    Stopped {
        session_id: String,
        artifact_name: String,
        bytes: usize,
    },
    /// Recording abandoned without an artifact
    Discarded { session_id: String },
    /// A recoverable failure
    Error(String),
}

/// A finalized recording
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    /// The submittable artifact
    pub artifact: MediaArtifact,

    /// Fresh playback reference for the artifact
    pub playback: PlaybackRef,

    /// Fragments that made up the artifact
    pub fragment_count: usize,

    /// Tracks that had not confirmed release when the timeout expired
    pub tracks_pending: usize,

    /// When the devices were granted
    pub started_at: DateTime<Utc>,

    /// Wall-clock recording length in milliseconds
    pub duration_ms: f64,
}
