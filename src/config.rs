//! Application configuration
//!
//! Settings are read from a JSON file in the user's config directory
//! (or an explicit path) and then adjusted from the environment. Missing
//! fields fall back to defaults.

use crate::capture::ffmpeg::{FfmpegBackend, FfmpegSettings};
use crate::capture::synthetic::{DeviceAccess, SyntheticBackend};
use crate::capture::traits::CaptureBackend;
use crate::recorder::state::RecordingSettings;
use crate::report::location::Coordinates;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "WASTEWATCH_CONFIG";

/// Environment variable overriding the capture backend
pub const BACKEND_ENV: &str = "WASTEWATCH_BACKEND";

/// Environment variable overriding the ffmpeg executable
pub const FFMPEG_ENV: &str = "WASTEWATCH_FFMPEG";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which capture backend records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Camera and microphone through an ffmpeg child process
    #[default]
    Ffmpeg,
    /// No hardware; generated fragments
    Synthetic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Ffmpeg => write!(f, "ffmpeg"),
            BackendKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(BackendKind::Ffmpeg),
            "synthetic" => Ok(BackendKind::Synthetic),
            other => Err(ConfigError::Invalid(format!(
                "unknown capture backend '{}'",
                other
            ))),
        }
    }
}

/// Synthetic backend behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyntheticSettings {
    /// How device requests are answered
    pub access: DeviceAccess,

    /// Milliseconds between generated fragments
    pub interval_ms: u64,

    /// Bytes per generated fragment
    pub fragment_size: usize,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            access: DeviceAccess::Granted,
            interval_ms: 250,
            fragment_size: 4096,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub backend: BackendKind,
    pub recording: RecordingSettings,
    pub ffmpeg: FfmpegSettings,
    pub synthetic: SyntheticSettings,

    /// Position attached to reports when none is given on the command line
    pub location: Option<Coordinates>,

    /// Bytes per progress step of a submission
    pub submission_chunk_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            recording: RecordingSettings::default(),
            ffmpeg: FfmpegSettings::default(),
            synthetic: SyntheticSettings::default(),
            location: None,
            submission_chunk_size: 256 * 1024,
        }
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("WasteWatch").join("config.json"))
}

impl AppConfig {
    /// Read a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration for this process
    ///
    /// An explicit path, or one named by `WASTEWATCH_CONFIG`, must exist.
    /// The default path is used only when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// `load` with an injectable environment lookup
    pub fn load_with<F>(explicit: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_ENV).map(PathBuf::from));

        let mut config = match named {
            Some(path) => {
                tracing::info!("Loading config from {:?}", path);
                Self::from_file(&path)?
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::info!("Loading config from {:?}", path);
                    Self::from_file(&path)?
                }
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WASTEWATCH_BACKEND` and `WASTEWATCH_FFMPEG`
    pub fn apply_env_overrides<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = env(BACKEND_ENV) {
            self.backend = backend.parse()?;
            tracing::debug!("Backend overridden from environment: {}", self.backend);
        }
        if let Some(binary) = env(FFMPEG_ENV).filter(|b| !b.trim().is_empty()) {
            tracing::debug!("ffmpeg binary overridden from environment: {}", binary);
            self.ffmpeg.binary = binary;
        }
        Ok(())
    }

    /// Reject settings no recording could run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recording.constraints.is_empty() {
            return Err(ConfigError::Invalid(
                "recording must request video, audio, or both".to_string(),
            ));
        }
        if self.recording.fragment_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "fragmentQueueDepth must be at least 1".to_string(),
            ));
        }
        if self.ffmpeg.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "ffmpeg chunkSize must be at least 1".to_string(),
            ));
        }
        if self.submission_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "submissionChunkSize must be at least 1".to_string(),
            ));
        }
        if let Some(location) = self.location {
            Coordinates::new(location.latitude, location.longitude)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Build the configured capture backend
    pub fn capture_backend(&self) -> Arc<dyn CaptureBackend> {
        match self.backend {
            BackendKind::Ffmpeg => Arc::new(FfmpegBackend::new(self.ffmpeg.clone())),
            BackendKind::Synthetic => Arc::new(
                SyntheticBackend::timed(
                    Duration::from_millis(self.synthetic.interval_ms.max(1)),
                    self.synthetic.fragment_size,
                )
                .with_access(self.synthetic.access),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "backend": "synthetic", "recording": { "fragmentQueueDepth": 8 } }"#,
        )
        .unwrap();

        let config = AppConfig::load_with(Some(&path), no_env).unwrap();

        assert_eq!(config.backend, BackendKind::Synthetic);
        assert_eq!(config.recording.fragment_queue_depth, 8);
        assert_eq!(config.recording.file_name, "recorded-video.webm");
        assert_eq!(config.ffmpeg, FfmpegSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();
        let env: HashMap<&str, &str> = [
            (BACKEND_ENV, "Synthetic"),
            (FFMPEG_ENV, "/opt/ffmpeg/bin/ffmpeg"),
        ]
        .into_iter()
        .collect();

        let config =
            AppConfig::load_with(Some(&path), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.backend, BackendKind::Synthetic);
        assert_eq!(config.ffmpeg.binary, "/opt/ffmpeg/bin/ffmpeg");
    }

    #[test]
    fn test_config_env_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("elsewhere.json");
        fs::write(&path, r#"{ "submissionChunkSize": 1024 }"#).unwrap();
        let named = path.to_string_lossy().to_string();

        let config = AppConfig::load_with(None, |k| {
            (k == CONFIG_ENV).then(|| named.clone())
        })
        .unwrap();

        assert_eq!(config.submission_chunk_size, 1024);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = AppConfig::load_with(Some(&dir.path().join("absent.json")), no_env);
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ backend: ").unwrap();

        let result = AppConfig::load_with(Some(&path), no_env);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.recording.constraints.video = false;
        config.recording.constraints.audio = false;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.location = Some(Coordinates {
            latitude: 120.0,
            longitude: 0.0,
        });
        assert!(config.validate().is_err());

        assert!("webcam".parse::<BackendKind>().is_err());
    }
}
