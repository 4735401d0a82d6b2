//! Error types and handling
//!
//! Common error types used across the application.

use crate::capture::error::CaptureError;
use crate::config::ConfigError;
use crate::report::location::LocationError;
use crate::report::submit::SubmitError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Selected file is not a video: {0}")]
    NotAVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Stable code for front ends
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Capture(e) => match e {
                CaptureError::PermissionDenied(_) => "PERMISSION_DENIED",
                CaptureError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
                CaptureError::AlreadyRecording => "ALREADY_RECORDING",
                CaptureError::NotRecording => "NOT_RECORDING",
                CaptureError::Encoder(_) => "ENCODER_ERROR",
                CaptureError::ReleaseTimeout { .. } => "RELEASE_TIMEOUT",
                CaptureError::Io(_) => "IO_ERROR",
            },
            AppError::Location(_) => "LOCATION_UNAVAILABLE",
            AppError::Submit(e) => match e {
                SubmitError::NoMedia => "NO_MEDIA",
                SubmitError::RecordingInProgress => "RECORDING_IN_PROGRESS",
                SubmitError::Rejected(_) => "SUBMISSION_REJECTED",
                SubmitError::Transport(_) => "SUBMISSION_FAILED",
            },
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::NotAVideo(_) => "NOT_A_VIDEO",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<&anyhow::Error> for ErrorResponse {
    fn from(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<AppError>() {
            Some(app) => ErrorResponse {
                code: app.code().to_string(),
                message: app.to_string(),
            },
            None => ErrorResponse {
                code: "INTERNAL_ERROR".to_string(),
                message: format!("{:#}", error),
            },
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_errors_keep_their_codes() {
        let denied: AppError = CaptureError::PermissionDenied("camera".into()).into();
        let busy: AppError = CaptureError::DeviceUnavailable("in use".into()).into();
        let idle: AppError = CaptureError::NotRecording.into();

        assert_eq!(denied.code(), "PERMISSION_DENIED");
        assert_eq!(busy.code(), "DEVICE_UNAVAILABLE");
        assert_eq!(idle.code(), "NOT_RECORDING");
    }

    #[test]
    fn test_error_response_from_app_error() {
        let response = ErrorResponse::from(AppError::from(SubmitError::NoMedia));

        assert_eq!(response.code, "NO_MEDIA");
        assert_eq!(response.message, "No video selected or recorded");
    }

    #[test]
    fn test_error_response_from_anyhow() {
        let wrapped = anyhow::Error::new(AppError::NotAVideo("pile.png".into()));
        assert_eq!(ErrorResponse::from(&wrapped).code, "NOT_A_VIDEO");

        let other = anyhow::anyhow!("boom");
        let response = ErrorResponse::from(&other);
        assert_eq!(response.code, "INTERNAL_ERROR");
        assert_eq!(response.message, "boom");
    }
}
