//! In-process capture backend
//!
//! Produces tracks and fragments without touching hardware. Fragments are
//! either a fixed script (delivered as soon as the encoder starts) or a
//! timed stream of fixed-size chunks. The permission outcome is chosen up
//! front, so every branch of the capture flow can be driven on any machine.

use super::error::{CaptureError, CaptureResult};
use super::traits::{
    CaptureBackend, EncoderOptions, FragmentSink, MediaConstraints, MediaEncoder, MediaStream,
    MediaTrack, TrackControl, TrackKind, TrackState,
};
use crate::recorder::fragment::Fragment;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Outcome of a device request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAccess {
    #[default]
    Granted,
    Denied,
    Unavailable,
}

#[derive(Debug, Clone)]
enum FragmentScript {
    Scripted(Vec<Vec<u8>>),
    Timed {
        interval: Duration,
        fragment_size: usize,
    },
}

/// Track control that ends the track immediately, unless unresponsive
struct SyntheticControl {
    state: watch::Sender<TrackState>,
    stops: Arc<AtomicUsize>,
    unresponsive: bool,
}

impl TrackControl for SyntheticControl {
    fn request_stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if !self.unresponsive {
            self.state.send_replace(TrackState::Ended);
        }
    }
}

/// Capture backend with no hardware behind it
pub struct SyntheticBackend {
    access: DeviceAccess,
    script: FragmentScript,
    final_fragment: Option<Vec<u8>>,
    fail_encoder: bool,
    unresponsive_tracks: bool,
    acquisitions: AtomicUsize,
    stops: Arc<AtomicUsize>,
    tracks: Mutex<Vec<MediaTrack>>,
}

impl SyntheticBackend {
    fn with_script(script: FragmentScript) -> Self {
        Self {
            access: DeviceAccess::Granted,
            script,
            final_fragment: None,
            fail_encoder: false,
            unresponsive_tracks: false,
            acquisitions: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            tracks: Mutex::new(Vec::new()),
        }
    }

    /// Emit exactly these fragments, in order, as soon as recording starts
    pub fn scripted<I, B>(fragments: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self::with_script(FragmentScript::Scripted(
            fragments.into_iter().map(Into::into).collect(),
        ))
    }

    /// Emit a `fragment_size` chunk every `interval` until stopped
    pub fn timed(interval: Duration, fragment_size: usize) -> Self {
        Self::with_script(FragmentScript::Timed {
            interval,
            fragment_size,
        })
    }

    /// Answer device requests with `access`
    pub fn with_access(mut self, access: DeviceAccess) -> Self {
        self.access = access;
        self
    }

    /// Emit `bytes` as the encoder's flush on stop
    pub fn with_final_fragment(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.final_fragment = Some(bytes.into());
        self
    }

    /// Make every encoder refuse to start
    pub fn with_failing_encoder(mut self) -> Self {
        self.fail_encoder = true;
        self
    }

    /// Hand out tracks that never confirm a stop
    pub fn with_unresponsive_tracks(mut self) -> Self {
        self.unresponsive_tracks = true;
        self
    }

    /// Number of device requests received, granted or not
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of stop requests the tracks have received
    pub fn stop_requests(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Every track handed out so far
    pub fn issued_tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().clone()
    }

    fn make_track(&self, kind: TrackKind) -> MediaTrack {
        let (state, receiver) = watch::channel(TrackState::Live);
        let control = Arc::new(SyntheticControl {
            state,
            stops: self.stops.clone(),
            unresponsive: self.unresponsive_tracks,
        });
        let label = match kind {
            TrackKind::Video => "Synthetic Camera",
            TrackKind::Audio => "Synthetic Microphone",
        };
        MediaTrack::new(kind, label, receiver, control)
    }
}

#[async_trait]
impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn acquire(&self, constraints: &MediaConstraints) -> CaptureResult<MediaStream> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        // Device grants resolve asynchronously
        tokio::task::yield_now().await;

        match self.access {
            DeviceAccess::Granted => {}
            DeviceAccess::Denied => {
                return Err(CaptureError::PermissionDenied(
                    "camera and microphone access was denied".to_string(),
                ))
            }
            DeviceAccess::Unavailable => {
                return Err(CaptureError::DeviceUnavailable(
                    "no synthetic devices attached".to_string(),
                ))
            }
        }

        if constraints.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "no devices requested".to_string(),
            ));
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(self.make_track(TrackKind::Video));
        }
        if constraints.audio {
            tracks.push(self.make_track(TrackKind::Audio));
        }

        self.tracks.lock().extend(tracks.iter().cloned());
        Ok(MediaStream::new(tracks))
    }

    fn create_encoder(
        &self,
        _stream: &MediaStream,
        options: &EncoderOptions,
    ) -> CaptureResult<Box<dyn MediaEncoder>> {
        let script = match (&self.script, options.timeslice_ms) {
            (FragmentScript::Timed { fragment_size, .. }, Some(ms)) => FragmentScript::Timed {
                interval: Duration::from_millis(ms.max(1)),
                fragment_size: *fragment_size,
            },
            (script, _) => script.clone(),
        };

        Ok(Box::new(SyntheticEncoder {
            mime_type: options.mime_type.clone(),
            script,
            final_fragment: self.final_fragment.clone(),
            fail_on_start: self.fail_encoder,
            stop_tx: None,
            task: None,
        }))
    }
}

/// Encoder task driven by a `FragmentScript`
struct SyntheticEncoder {
    mime_type: String,
    script: FragmentScript,
    final_fragment: Option<Vec<u8>>,
    fail_on_start: bool,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl MediaEncoder for SyntheticEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self, sink: FragmentSink) -> CaptureResult<()> {
        if self.fail_on_start {
            return Err(CaptureError::Encoder(
                "synthetic encoder configured to fail".to_string(),
            ));
        }
        if self.task.is_some() {
            return Err(CaptureError::Encoder("encoder already started".to_string()));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let script = self.script.clone();
        let final_fragment = self.final_fragment.take();

        let task = tokio::spawn(async move {
            match script {
                FragmentScript::Scripted(fragments) => {
                    for data in fragments {
                        if sink.send(Fragment::new(data)).await.is_err() {
                            return;
                        }
                    }
                    let _ = (&mut stop_rx).await;
                }
                FragmentScript::Timed {
                    interval,
                    fragment_size,
                } => {
                    let mut ticker = tokio::time::interval(interval);
                    // First tick completes immediately
                    ticker.tick().await;
                    let mut seq: u8 = 0;
                    loop {
                        tokio::select! {
                            _ = &mut stop_rx => break,
                            _ = ticker.tick() => {
                                seq = seq.wrapping_add(1);
                                let data = vec![seq; fragment_size];
                                if sink.send(Fragment::new(data)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }

            if let Some(data) = final_fragment {
                let _ = sink.send(Fragment::new(data)).await;
            }
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        let task = self
            .task
            .take()
            .ok_or_else(|| CaptureError::Encoder("encoder was not started".to_string()))?;

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        task.await
            .map_err(|e| CaptureError::Encoder(format!("synthetic encoder task failed: {}", e)))
    }
}

impl Drop for SyntheticEncoder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
