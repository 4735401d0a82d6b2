//! Capture session controller
//!
//! Owns the lifecycle of one recording at a time: acquires the devices,
//! buffers the encoder's fragments in order, releases the devices, and turns
//! the fragments into a previewable artifact.

use super::fragment::{Fragment, FragmentLog};
use super::state::{
    CaptureEvent, FinishedRecording, RecordingSettings, RecordingState, RECORDED_CONTENT_TYPE,
};
use crate::capture::error::{CaptureError, CaptureResult};
use crate::capture::guard::{ReleaseReport, StreamGuard};
use crate::capture::traits::{CaptureBackend, EncoderOptions, MediaEncoder};
use crate::media::artifact::MediaArtifact;
use crate::media::playback::{PlaybackRef, PlaybackRegistry};
use crate::media::preview::PreviewSurface;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

/// One in-progress recording
struct CaptureSession {
    id: String,
    stream: StreamGuard,
    encoder: Box<dyn MediaEncoder>,
    fragments: mpsc::Receiver<Fragment>,
    log: FragmentLog,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Publishes `Starting` and falls back to `Idle` unless completed
struct PendingStart {
    state: Arc<watch::Sender<RecordingState>>,
    completed: bool,
}

impl PendingStart {
    fn begin(state: Arc<watch::Sender<RecordingState>>) -> Self {
        state.send_replace(RecordingState::Starting);
        Self {
            state,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.state.send_replace(RecordingState::Recording);
        self.completed = true;
    }
}

impl Drop for PendingStart {
    fn drop(&mut self) {
        if !self.completed {
            self.state.send_replace(RecordingState::Idle);
        }
    }
}

/// Drives the Idle → Recording → Idle cycle
pub struct CaptureController {
    backend: Arc<dyn CaptureBackend>,
    preview: Arc<dyn PreviewSurface>,
    playback: Arc<PlaybackRegistry>,
    settings: RecordingSettings,
    session: Option<CaptureSession>,
    last_playback: Option<PlaybackRef>,
    state: Arc<watch::Sender<RecordingState>>,
    event_tx: broadcast::Sender<CaptureEvent>,
}

impl CaptureController {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        preview: Arc<dyn PreviewSurface>,
        playback: Arc<PlaybackRegistry>,
        settings: RecordingSettings,
    ) -> Self {
        let (state, _) = watch::channel(RecordingState::Idle);
        let (event_tx, _) = broadcast::channel(100);
        Self {
            backend,
            preview,
            playback,
            settings,
            session: None,
            last_playback: None,
            state: Arc::new(state),
            event_tx,
        }
    }

    /// Current state
    pub fn state(&self) -> RecordingState {
        *self.state.borrow()
    }

    /// Follow state changes, including the transient `Starting`
    pub fn subscribe_state(&self) -> watch::Receiver<RecordingState> {
        self.state.subscribe()
    }

    /// Subscribe to capture events
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    /// Fragments kept so far in the active session
    pub fn buffered_fragments(&self) -> usize {
        self.session.as_ref().map(|s| s.log.len()).unwrap_or(0)
    }

    /// Milliseconds since the devices were granted, 0 when idle
    pub fn duration_ms(&self) -> f64 {
        self.session
            .as_ref()
            .map(|s| s.started.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    fn emit(&self, event: CaptureEvent) {
        let _ = self.event_tx.send(event);
    }

    fn report_failure(&self, error: CaptureError) -> CaptureError {
        tracing::error!("Error accessing capture devices: {}", error);
        self.emit(CaptureEvent::Error(error.to_string()));
        error
    }

    /// Request the camera and microphone and start buffering fragments
    ///
    /// Does nothing but return `AlreadyRecording` while a session exists or
    /// a grant is pending. On failure nothing stays acquired and the state
    /// is back to `Idle`.
    pub async fn start_capture(&mut self) -> CaptureResult<()> {
        let current = self.state();
        if self.session.is_some() || current != RecordingState::Idle {
            tracing::warn!("Start requested while {:?}; not acquiring again", current);
            return Err(CaptureError::AlreadyRecording);
        }

        tracing::info!(
            "Requesting capture devices from {} backend",
            self.backend.name()
        );
        let pending = PendingStart::begin(self.state.clone());

        let stream = match self.backend.acquire(&self.settings.constraints).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.report_failure(e)),
        };

        let options = EncoderOptions {
            mime_type: RECORDED_CONTENT_TYPE.to_string(),
            timeslice_ms: self.settings.timeslice_ms,
        };
        let encoder = self.backend.create_encoder(&stream, &options);
        let live = stream.live_preview();
        let stream = StreamGuard::new(stream);

        let mut encoder = match encoder {
            Ok(encoder) => encoder,
            Err(e) => {
                let _ = stream.release(self.settings.release_timeout()).await;
                return Err(self.report_failure(e));
            }
        };

        let (sink, fragments) = mpsc::channel(self.settings.fragment_queue_depth.max(1));
        if let Err(e) = encoder.start(sink) {
            drop(encoder);
            let _ = stream.release(self.settings.release_timeout()).await;
            return Err(self.report_failure(e));
        }

        if encoder.mime_type() != RECORDED_CONTENT_TYPE {
            tracing::warn!(
                "Encoder produces {} but recordings are labelled {}",
                encoder.mime_type(),
                RECORDED_CONTENT_TYPE
            );
        }

        // The previous recording is replaced by this one
        if let Some(previous) = self.last_playback.take() {
            self.playback.revoke(&previous);
        }

        self.preview.show_live(&live);

        let session_id = Uuid::new_v4().to_string();
        self.session = Some(CaptureSession {
            id: session_id.clone(),
            stream,
            encoder,
            fragments,
            log: FragmentLog::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        });
        pending.complete();
        self.emit(CaptureEvent::Started {
            session_id: session_id.clone(),
        });

        tracing::info!("Recording started (session {})", session_id);
        Ok(())
    }

    /// Accept one fragment from the encoder
    ///
    /// Empty fragments are discarded. Returns whether the fragment was kept.
    pub fn on_fragment_available(&mut self, fragment: Fragment) -> bool {
        match self.session.as_mut() {
            Some(session) => session.log.append(fragment),
            None => {
                tracing::debug!("Fragment of {} bytes arrived with no session", fragment.len());
                false
            }
        }
    }

    /// Move every fragment queued by the encoder into the session log
    ///
    /// Never waits. Returns how many fragments were kept.
    pub fn pump_fragments(&mut self) -> usize {
        let mut queued = Vec::new();
        if let Some(session) = self.session.as_mut() {
            while let Ok(fragment) = session.fragments.try_recv() {
                queued.push(fragment);
            }
        }

        let mut kept = 0;
        for fragment in queued {
            if self.on_fragment_available(fragment) {
                kept += 1;
            }
        }
        kept
    }

    /// Finalize the recording into an artifact
    ///
    /// Waits for the encoder's last fragment and for every device to confirm
    /// release before returning. Devices still unconfirmed when the release
    /// timeout expires are reported in `tracks_pending`; the artifact is
    /// produced regardless. Without a session this is a reported no-op.
    ///
    /// The playback reference stays live until the next recording starts.
    pub async fn stop_capture(&mut self) -> CaptureResult<FinishedRecording> {
        let Some(session) = self.session.take() else {
            tracing::warn!("Stop requested with no active capture session");
            self.emit(CaptureEvent::Error(CaptureError::NotRecording.to_string()));
            return Err(CaptureError::NotRecording);
        };

        let CaptureSession {
            id,
            stream,
            mut encoder,
            mut fragments,
            mut log,
            started_at,
            started,
        } = session;

        tracing::info!("Stopping recording (session {})", id);

        if let Err(e) = drain_until_stopped(encoder.as_mut(), &mut fragments, &mut log).await {
            tracing::warn!("Encoder did not finalize cleanly: {}", e);
        }
        drop(encoder);

        let released = stream.release(self.settings.release_timeout()).await;
        self.state.send_replace(RecordingState::Idle);
        let tracks_pending = self.release_outcome(released);

        let fragment_count = log.len();
        if log.dropped_empty() > 0 {
            tracing::debug!("Discarded {} empty fragment(s)", log.dropped_empty());
        }

        let artifact = MediaArtifact::from_recording(
            self.settings.file_name.clone(),
            RECORDED_CONTENT_TYPE,
            log.into_bytes(),
        );
        let playback = self.playback.create(&artifact);
        self.last_playback = Some(playback.clone());
        self.preview.show_artifact(&playback);

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.emit(CaptureEvent::Stopped {
            session_id: id,
            artifact_name: artifact.name().to_string(),
            bytes: artifact.size(),
        });

        tracing::info!(
            "Recording stopped: {} fragment(s), {} bytes, {} track(s) unconfirmed, {:.0}ms",
            fragment_count,
            artifact.size(),
            tracks_pending,
            duration_ms
        );

        Ok(FinishedRecording {
            artifact,
            playback,
            fragment_count,
            tracks_pending,
            started_at,
            duration_ms,
        })
    }

    /// Abandon the recording without producing an artifact
    ///
    /// Returns how many fragments were thrown away.
    pub async fn discard_capture(&mut self) -> CaptureResult<usize> {
        let Some(session) = self.session.take() else {
            return Err(CaptureError::NotRecording);
        };

        let CaptureSession {
            id,
            stream,
            mut encoder,
            mut fragments,
            mut log,
            ..
        } = session;

        if let Err(e) = drain_until_stopped(encoder.as_mut(), &mut fragments, &mut log).await {
            tracing::debug!("Encoder stop during discard: {}", e);
        }
        drop(encoder);

        let released = stream.release(self.settings.release_timeout()).await;
        self.state.send_replace(RecordingState::Idle);
        self.preview.clear();
        self.release_outcome(released);

        let discarded = log.len();
        self.emit(CaptureEvent::Discarded { session_id: id });
        tracing::info!("Recording discarded ({} fragment(s))", discarded);
        Ok(discarded)
    }

    /// Tracks that did not confirm release; the failure is logged and emitted
    fn release_outcome(&self, released: CaptureResult<ReleaseReport>) -> usize {
        match released {
            Ok(_) => 0,
            Err(e) => {
                tracing::error!("Capture devices not confirmed released: {}", e);
                self.emit(CaptureEvent::Error(e.to_string()));
                match e {
                    CaptureError::ReleaseTimeout { pending } => pending,
                    _ => 0,
                }
            }
        }
    }

    /// Release everything before the controller goes away
    pub async fn shutdown(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.discard_capture().await {
                tracing::warn!("Error releasing capture devices on shutdown: {}", e);
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::warn!(
                "Capture controller dropped mid-recording (session {}); releasing devices",
                session.id
            );
            drop(session);
            self.state.send_replace(RecordingState::Idle);
        }
    }
}

/// Stop the encoder while still draining its fragments
///
/// The encoder may block on a full queue while flushing, so the queue is
/// drained concurrently; whatever remains after the stop is drained too.
async fn drain_until_stopped(
    encoder: &mut dyn MediaEncoder,
    fragments: &mut mpsc::Receiver<Fragment>,
    log: &mut FragmentLog,
) -> CaptureResult<()> {
    let result = {
        let mut stop = encoder.stop();
        loop {
            tokio::select! {
                biased;
                Some(fragment) = fragments.recv() => {
                    log.append(fragment);
                }
                result = &mut stop => break result,
            }
        }
    };

    fragments.close();
    while let Some(fragment) = fragments.recv().await {
        log.append(fragment);
    }
    result
}
