//! Scoped ownership of an acquired media stream
//!
//! A `StreamGuard` is the only owner of a live stream. Whatever way it goes
//! out of scope, every track is asked to stop.

use super::error::{CaptureError, CaptureResult};
use super::traits::{MediaStream, TrackState};
use std::time::Duration;

/// Outcome of an explicit release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Number of tracks confirmed ended
    pub tracks_stopped: usize,
}

/// Owns a `MediaStream` until it is released or dropped
#[derive(Debug)]
pub struct StreamGuard {
    stream: Option<MediaStream>,
}

impl StreamGuard {
    pub fn new(stream: MediaStream) -> Self {
        tracing::debug!(
            "Acquired stream {} with {} track(s)",
            stream.id(),
            stream.tracks().len()
        );
        Self {
            stream: Some(stream),
        }
    }

    /// The guarded stream, if not yet released
    pub fn stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    /// Stop every track and wait for each one to confirm
    ///
    /// With `timeout` set, gives up after that long and reports how many
    /// tracks are still live. The stop request has been issued either way.
    pub async fn release(mut self, timeout: Option<Duration>) -> CaptureResult<ReleaseReport> {
        let Some(stream) = self.stream.take() else {
            return Ok(ReleaseReport { tracks_stopped: 0 });
        };

        for track in stream.tracks() {
            track.stop();
        }

        let confirm = async {
            for track in stream.tracks() {
                track.ended().await;
            }
        };

        match timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, confirm).await.is_err() {
                    let pending = stream
                        .tracks()
                        .iter()
                        .filter(|t| t.ready_state() == TrackState::Live)
                        .count();
                    tracing::error!(
                        "Stream {}: {} track(s) still live after {:?}",
                        stream.id(),
                        pending,
                        limit
                    );
                    return Err(CaptureError::ReleaseTimeout { pending });
                }
            }
            None => confirm.await,
        }

        tracing::debug!("Released stream {}", stream.id());
        Ok(ReleaseReport {
            tracks_stopped: stream.tracks().len(),
        })
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            tracing::warn!(
                "Stream {} dropped while live; stopping {} track(s)",
                stream.id(),
                stream.tracks().len()
            );
            for track in stream.tracks() {
                track.stop();
            }
        }
    }
}
