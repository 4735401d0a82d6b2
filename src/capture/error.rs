//! Capture error types
//!
//! Every failure of the device boundary and the capture controller is local
//! and recoverable; none of these leave a session half-acquired.

use thiserror::Error;

/// Errors raised while acquiring, recording from, or releasing capture devices
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("A capture session is already active")]
    AlreadyRecording,

    #[error("No capture session is active")]
    NotRecording,

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Timed out waiting for {pending} track(s) to stop")]
    ReleaseTimeout { pending: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Whether the failure came from the device grant rather than caller misuse
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_) | CaptureError::DeviceUnavailable(_)
        )
    }
}

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;
