//! Report submission
//!
//! Submission is an injected collaborator. Upload progress is whatever the
//! submitter reports about its own transfer; nothing here fakes it on a
//! timer.

use super::location::Coordinates;
use crate::media::artifact::{ArtifactSummary, MediaArtifact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Submission-related errors
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("No video selected or recorded")]
    NoMedia,

    #[error("Stop the recording before submitting")]
    RecordingInProgress,

    #[error("Report rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A report ready to be submitted
#[derive(Debug, Clone)]
pub struct Report {
    pub id: Uuid,
    pub artifact: MediaArtifact,
    pub location: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn new(artifact: MediaArtifact, location: Option<Coordinates>) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact,
            location,
            created_at: Utc::now(),
        }
    }
}

/// Bytes of the current submission handed to the transport so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,

    /// Set once the submitter has handed over the whole report
    pub done: bool,
}

impl UploadProgress {
    /// Whole-number percentage; 100 once done, even for an empty payload
    pub fn percent(&self) -> u8 {
        if self.done {
            return 100;
        }
        if self.total_bytes == 0 {
            return 0;
        }
        let ratio = self.bytes_sent.min(self.total_bytes) as f64 / self.total_bytes as f64;
        (ratio * 100.0).floor() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.done || (self.total_bytes > 0 && self.bytes_sent >= self.total_bytes)
    }
}

/// Handle a submitter uses to publish progress
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<UploadProgress>>,
}

impl ProgressReporter {
    pub fn new(tx: Arc<watch::Sender<UploadProgress>>) -> Self {
        Self { tx }
    }

    pub fn report(&self, bytes_sent: u64, total_bytes: u64) {
        self.tx.send_replace(UploadProgress {
            bytes_sent,
            total_bytes,
            done: false,
        });
    }

    /// Mark the whole payload as handed over
    pub fn complete(&self, total_bytes: u64) {
        self.tx.send_replace(UploadProgress {
            bytes_sent: total_bytes,
            total_bytes,
            done: true,
        });
    }
}

/// What a submitter hands back for an accepted report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub report_id: Uuid,
    pub artifact: ArtifactSummary,
    pub location: Option<Coordinates>,
    pub bytes_sent: u64,
    pub submitted_at: DateTime<Utc>,
    pub dry_run: bool,
}

/// Destination for finished reports
#[async_trait]
pub trait ReportSubmitter: Send + Sync {
    async fn submit(
        &self,
        report: &Report,
        progress: &ProgressReporter,
    ) -> Result<SubmissionReceipt, SubmitError>;
}

/// Submitter that walks the payload and reports progress without sending it
#[derive(Debug, Clone)]
pub struct DryRunSubmitter {
    chunk_size: usize,
}

impl DryRunSubmitter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for DryRunSubmitter {
    fn default() -> Self {
        Self::new(256 * 1024)
    }
}

#[async_trait]
impl ReportSubmitter for DryRunSubmitter {
    async fn submit(
        &self,
        report: &Report,
        progress: &ProgressReporter,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let total = report.artifact.size() as u64;
        let mut sent = 0u64;
        progress.report(0, total);

        for chunk in report.artifact.bytes().chunks(self.chunk_size) {
            sent += chunk.len() as u64;
            progress.report(sent, total);
            tokio::task::yield_now().await;
        }
        progress.complete(total);

        tracing::info!(
            "Dry-run report {}: {} ({}, {} bytes) at {}",
            report.id,
            report.artifact.name(),
            report.artifact.content_type(),
            total,
            report
                .location
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown location".to_string())
        );

        Ok(SubmissionReceipt {
            report_id: report.id,
            artifact: report.artifact.summary(),
            location: report.location,
            bytes_sent: sent,
            submitted_at: Utc::now(),
            dry_run: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        let p = |sent, total| UploadProgress {
            bytes_sent: sent,
            total_bytes: total,
            done: false,
        };
        assert_eq!(p(0, 0).percent(), 0);
        assert!(!p(0, 0).is_complete());
        assert_eq!(p(0, 200).percent(), 0);
        assert_eq!(p(50, 200).percent(), 25);
        assert_eq!(p(200, 200).percent(), 100);
        assert!(p(200, 200).is_complete());
        assert!(!p(199, 200).is_complete());
    }

    #[tokio::test]
    async fn test_dry_run_reports_every_chunk() {
        let (tx, mut rx) = watch::channel(UploadProgress::default());
        let reporter = ProgressReporter::new(Arc::new(tx));
        let artifact = MediaArtifact::from_recording("recorded-video.webm", "video/webm", vec![7u8; 10]);
        let report = Report::new(artifact, None);

        let receipt = DryRunSubmitter::new(4).submit(&report, &reporter).await.unwrap();

        assert_eq!(receipt.bytes_sent, 10);
        assert!(receipt.dry_run);
        assert_eq!(receipt.report_id, report.id);
        let last = *rx.borrow_and_update();
        assert_eq!(last.percent(), 100);
        assert!(last.done);
    }

    #[tokio::test]
    async fn test_empty_payload_completes() {
        let (tx, rx) = watch::channel(UploadProgress::default());
        let reporter = ProgressReporter::new(Arc::new(tx));
        let artifact = MediaArtifact::from_recording("recorded-video.webm", "video/webm", Vec::new());
        let report = Report::new(artifact, None);

        let receipt = DryRunSubmitter::default().submit(&report, &reporter).await.unwrap();

        assert_eq!(receipt.bytes_sent, 0);
        let last = *rx.borrow();
        assert_eq!(last.percent(), 100);
        assert!(last.is_complete());
    }
}
