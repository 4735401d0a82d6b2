//! Report form state
//!
//! Holds the current submission content (one artifact, or an active
//! recording, never both), the attached location, and upload progress.

use super::location::{Coordinates, LocationError, LocationProvider};
use super::submit::{ProgressReporter, Report, ReportSubmitter, SubmissionReceipt, SubmitError, UploadProgress};
use crate::capture::error::CaptureResult;
use crate::capture::traits::CaptureBackend;
use crate::media::artifact::{MediaArtifact, SelectedFile};
use crate::media::playback::{PlaybackRef, PlaybackRegistry};
use crate::media::preview::PreviewSurface;
use crate::recorder::controller::CaptureController;
use crate::recorder::state::{FinishedRecording, RecordingSettings, RecordingState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Which way the video is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Upload,
    Record,
}

/// Result of handing a picked file to the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// File became the current artifact
    Accepted(PlaybackRef),
    /// File was not taken; the current artifact is unchanged
    Ignored,
}

#[derive(Debug, Clone)]
struct CurrentMedia {
    artifact: MediaArtifact,
    playback: PlaybackRef,
}

/// The report form
pub struct ReportForm {
    mode: InputMode,
    controller: CaptureController,
    playback: Arc<PlaybackRegistry>,
    preview: Arc<dyn PreviewSurface>,
    current: Option<CurrentMedia>,
    location: Option<Coordinates>,
    location_provider: Arc<dyn LocationProvider>,
    submitter: Arc<dyn ReportSubmitter>,
    progress: Arc<watch::Sender<UploadProgress>>,
}

impl ReportForm {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        settings: RecordingSettings,
        preview: Arc<dyn PreviewSurface>,
        location_provider: Arc<dyn LocationProvider>,
        submitter: Arc<dyn ReportSubmitter>,
    ) -> Self {
        let playback = Arc::new(PlaybackRegistry::new());
        let controller =
            CaptureController::new(backend, preview.clone(), playback.clone(), settings);
        let (progress, _) = watch::channel(UploadProgress::default());

        Self {
            mode: InputMode::default(),
            controller,
            playback,
            preview,
            current: None,
            location: None,
            location_provider,
            submitter,
            progress: Arc::new(progress),
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        self.mode = mode;
    }

    pub fn controller(&self) -> &CaptureController {
        &self.controller
    }

    pub fn recording_state(&self) -> RecordingState {
        self.controller.state()
    }

    pub fn playback(&self) -> &Arc<PlaybackRegistry> {
        &self.playback
    }

    /// The artifact that would be submitted
    pub fn current_artifact(&self) -> Option<&MediaArtifact> {
        self.current.as_ref().map(|c| &c.artifact)
    }

    /// Playback reference of the current artifact
    pub fn current_playback(&self) -> Option<&PlaybackRef> {
        self.current.as_ref().map(|c| &c.playback)
    }

    pub fn location(&self) -> Option<Coordinates> {
        self.location
    }

    pub fn set_location(&mut self, location: Option<Coordinates>) {
        self.location = location;
    }

    pub fn progress(&self) -> UploadProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    fn reset_progress(&self) {
        self.progress.send_replace(UploadProgress::default());
    }

    fn replace_current(&mut self, next: Option<CurrentMedia>) {
        if let Some(previous) = self.current.take() {
            self.playback.revoke(&previous.playback);
        }
        self.current = next;
        self.reset_progress();
    }

    /// Take a file from the file picker
    ///
    /// Anything whose declared type is not a video is ignored, as is any
    /// selection made while a recording is running.
    pub fn select_file(&mut self, file: SelectedFile) -> SelectionOutcome {
        if self.controller.is_recording() {
            tracing::warn!("Ignoring file '{}' selected while recording", file.name);
            return SelectionOutcome::Ignored;
        }

        let name = file.name.clone();
        let content_type = file.content_type.clone();
        let Some(artifact) = MediaArtifact::from_selection(file) else {
            tracing::debug!("Ignoring '{}' with non-video type {}", name, content_type);
            return SelectionOutcome::Ignored;
        };

        let playback = self.playback.create(&artifact);
        self.preview.show_artifact(&playback);
        tracing::info!(
            "Selected {} ({}, {} bytes)",
            artifact.name(),
            artifact.content_type(),
            artifact.size()
        );
        self.replace_current(Some(CurrentMedia {
            artifact,
            playback: playback.clone(),
        }));

        SelectionOutcome::Accepted(playback)
    }

    /// Start recording; the previous artifact is discarded once devices are granted
    pub async fn start_recording(&mut self) -> CaptureResult<()> {
        self.controller.start_capture().await?;
        self.replace_current(None);
        Ok(())
    }

    /// Move queued fragments into the recording buffer
    pub fn pump(&mut self) -> usize {
        self.controller.pump_fragments()
    }

    /// Stop recording; the recording becomes the current artifact
    pub async fn stop_recording(&mut self) -> CaptureResult<FinishedRecording> {
        let finished = self.controller.stop_capture().await?;
        self.replace_current(Some(CurrentMedia {
            artifact: finished.artifact.clone(),
            playback: finished.playback.clone(),
        }));
        Ok(finished)
    }

    /// Abandon the running recording
    pub async fn discard_recording(&mut self) -> CaptureResult<usize> {
        self.controller.discard_capture().await
    }

    /// Ask the location provider for a position
    ///
    /// On failure the previously attached location is kept.
    pub async fn locate(&mut self) -> Result<Coordinates, LocationError> {
        match self.location_provider.current_location().await {
            Ok(coordinates) => {
                tracing::info!("Location attached: {}", coordinates);
                self.location = Some(coordinates);
                Ok(coordinates)
            }
            Err(e) => {
                tracing::warn!("Location lookup failed: {}", e);
                Err(e)
            }
        }
    }

    /// Submit the current artifact and location
    pub async fn submit(&mut self) -> Result<SubmissionReceipt, SubmitError> {
        if self.controller.is_recording() {
            return Err(SubmitError::RecordingInProgress);
        }
        let current = self.current.as_ref().ok_or(SubmitError::NoMedia)?;

        let report = Report::new(current.artifact.clone(), self.location);
        self.reset_progress();
        let reporter = ProgressReporter::new(self.progress.clone());

        tracing::info!(
            "Submitting report {} with {} ({} bytes)",
            report.id,
            report.artifact.name(),
            report.artifact.size()
        );
        let receipt = self.submitter.submit(&report, &reporter).await?;
        tracing::info!("Report {} accepted", receipt.report_id);
        Ok(receipt)
    }

    /// Release devices and playback references
    pub async fn shutdown(&mut self) {
        self.controller.shutdown().await;
        self.replace_current(None);
        self.preview.clear();
    }
}
