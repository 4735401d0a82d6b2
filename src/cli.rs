//! Command line front end
//!
//! Drives one report through the form: record from the capture devices or
//! take a video from disk, attach the location, and submit it.

use crate::capture::traits::CaptureBackend;
use crate::config::{AppConfig, BackendKind};
use crate::media::artifact::SelectedFile;
use crate::media::preview::PreviewSlot;
use crate::report::form::{InputMode, ReportForm, SelectionOutcome};
use crate::report::location::{Coordinates, FixedLocation, LocationProvider, NoLocation};
use crate::report::submit::{DryRunSubmitter, SubmissionReceipt};
use crate::utils::error::{AppError, AppResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often queued fragments are moved into the recording
const PUMP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "wastewatch")]
#[command(about = "Report illegal waste dumping with a video")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to $WASTEWATCH_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Latitude of the dumping site
    #[arg(long, global = true, allow_hyphen_values = true, requires = "lon")]
    pub lat: Option<f64>,

    /// Longitude of the dumping site
    #[arg(long, global = true, allow_hyphen_values = true, requires = "lat")]
    pub lon: Option<f64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record from the camera and microphone, then submit
    Record {
        /// Recording length in seconds (Ctrl-C stops early)
        #[arg(short, long, default_value = "10")]
        seconds: u64,

        /// Capture backend (ffmpeg or synthetic)
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// Submit an existing video file
    Upload {
        /// Video file to attach
        path: PathBuf,
    },
}

impl Cli {
    /// Coordinates given on the command line
    pub fn coordinates(&self) -> AppResult<Option<Coordinates>> {
        match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => Ok(Some(Coordinates::new(latitude, longitude)?)),
            _ => Ok(None),
        }
    }
}

/// Build the report form from configuration
pub fn build_form(
    config: &AppConfig,
    backend: Arc<dyn CaptureBackend>,
    location: Option<Coordinates>,
) -> ReportForm {
    let provider: Arc<dyn LocationProvider> = match location {
        Some(coordinates) => Arc::new(FixedLocation(coordinates)),
        None => Arc::new(NoLocation),
    };

    ReportForm::new(
        backend,
        config.recording.clone(),
        Arc::new(PreviewSlot::new()),
        provider,
        Arc::new(DryRunSubmitter::new(config.submission_chunk_size)),
    )
}

/// Run one command to completion
pub async fn execute(cli: Cli) -> AppResult<SubmissionReceipt> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Command::Record {
        backend: Some(backend),
        ..
    } = &cli.command
    {
        config.backend = *backend;
    }

    let location = cli.coordinates()?.or(config.location);
    let mut form = build_form(&config, config.capture_backend(), location);

    if let Err(e) = form.locate().await {
        tracing::warn!("Submitting without a location: {}", e);
    }

    let result = match &cli.command {
        Command::Record { seconds, .. } => {
            tracing::info!("Recording with the {} backend", config.backend);
            record_for(&mut form, Duration::from_secs(*seconds)).await
        }
        Command::Upload { path } => attach_file(&mut form, path.clone()).await,
    };

    let receipt = match result {
        Ok(()) => form.submit().await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    form.shutdown().await;
    receipt
}

async fn record_for(form: &mut ReportForm, length: Duration) -> AppResult<()> {
    form.set_mode(InputMode::Record);
    form.start_recording().await?;

    let deadline = tokio::time::sleep(length);
    tokio::pin!(deadline);
    let mut pump = tokio::time::interval(PUMP_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, finishing the recording");
                break;
            }
            _ = pump.tick() => {
                form.pump();
            }
        }
    }

    let finished = form.stop_recording().await?;
    tracing::info!(
        "Recorded {} ({} bytes in {} fragment(s))",
        finished.artifact.name(),
        finished.artifact.size(),
        finished.fragment_count
    );
    Ok(())
}

async fn attach_file(form: &mut ReportForm, path: PathBuf) -> AppResult<()> {
    form.set_mode(InputMode::Upload);
    let file = tokio::task::spawn_blocking(move || SelectedFile::from_path(&path))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))??;

    let name = file.name.clone();
    match form.select_file(file) {
        SelectionOutcome::Accepted(playback) => {
            tracing::info!("Attached {} as {}", name, playback);
            Ok(())
        }
        SelectionOutcome::Ignored => Err(AppError::NotAVideo(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from([
            "wastewatch",
            "record",
            "--seconds",
            "3",
            "--backend",
            "synthetic",
            "--lat",
            "-33.8688",
            "--lon",
            "151.2093",
        ])
        .unwrap();

        match &cli.command {
            Command::Record { seconds, backend } => {
                assert_eq!(*seconds, 3);
                assert_eq!(*backend, Some(BackendKind::Synthetic));
            }
            other => panic!("unexpected command {:?}", other),
        }
        let here = cli.coordinates().unwrap().unwrap();
        assert_eq!(here.latitude, -33.8688);
    }

    #[test]
    fn test_latitude_requires_longitude() {
        assert!(Cli::try_parse_from(["wastewatch", "upload", "a.mp4", "--lat", "1.0"]).is_err());
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let cli =
            Cli::try_parse_from(["wastewatch", "upload", "a.mp4", "--lat", "95", "--lon", "0"])
                .unwrap();
        assert!(matches!(cli.coordinates(), Err(AppError::Location(_))));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_video() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pile.jpg");
        fs::write(&path, b"jpeg").unwrap();
        let config = AppConfig::default();
        let mut form = build_form(&config, config.capture_backend(), None);

        let result = attach_file(&mut form, path).await;

        assert!(matches!(result, Err(AppError::NotAVideo(name)) if name == "pile.jpg"));
        assert!(form.current_artifact().is_none());
    }

    #[tokio::test]
    async fn test_upload_then_submit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("canal.webm");
        fs::write(&path, vec![1u8; 1000]).unwrap();
        let config = AppConfig::default();
        let here = Coordinates::new(51.5, -0.12).unwrap();
        let mut form = build_form(&config, config.capture_backend(), Some(here));

        attach_file(&mut form, path).await.unwrap();
        form.locate().await.unwrap();
        let receipt = form.submit().await.unwrap();

        assert_eq!(receipt.artifact.content_type, "video/webm");
        assert_eq!(receipt.bytes_sent, 1000);
        assert_eq!(receipt.location, Some(here));
    }
}
