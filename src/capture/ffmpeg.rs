//! FFmpeg capture backend
//!
//! Opens the camera and microphone through an `ffmpeg` child process and
//! muxes VP8/Opus into WebM on stdout. The process is the device lock: while
//! it runs, the camera indicator is on. Stdout is read in fixed-size chunks
//! that become fragments, so concatenating them in order yields the file.

use super::error::{CaptureError, CaptureResult};
use super::traits::{
    CaptureBackend, EncoderOptions, FragmentSink, MediaConstraints, MediaEncoder, MediaStream,
    MediaTrack, TrackControl, TrackKind, TrackState,
};
use crate::recorder::fragment::Fragment;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Lines of ffmpeg stderr kept for diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// How to launch ffmpeg for capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FfmpegSettings {
    /// ffmpeg executable
    pub binary: String,

    /// Demuxer for the camera (`v4l2`, `avfoundation`, `dshow`)
    pub video_format: String,

    /// Camera device as the demuxer expects it
    pub video_device: String,

    /// Demuxer for the microphone (`pulse`, `avfoundation`, `dshow`)
    pub audio_format: String,

    /// Microphone device as the demuxer expects it
    pub audio_device: String,

    /// Bytes read from stdout per fragment
    pub chunk_size: usize,

    /// How long the devices may take to produce the first bytes
    pub probe_timeout_ms: u64,

    /// How long ffmpeg gets to finalize the file after `q`
    pub stop_grace_ms: u64,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        let (video_format, video_device, audio_format, audio_device) = platform_inputs();
        Self {
            binary: "ffmpeg".to_string(),
            video_format: video_format.to_string(),
            video_device: video_device.to_string(),
            audio_format: audio_format.to_string(),
            audio_device: audio_device.to_string(),
            chunk_size: 64 * 1024,
            probe_timeout_ms: 5_000,
            stop_grace_ms: 3_000,
        }
    }
}

fn platform_inputs() -> (&'static str, &'static str, &'static str, &'static str) {
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", "0:none", "avfoundation", "none:0")
    }

    #[cfg(target_os = "windows")]
    {
        ("dshow", "video=Integrated Camera", "dshow", "audio=Microphone")
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("v4l2", "/dev/video0", "pulse", "default")
    }
}

/// Build the ffmpeg argument list for a capture
pub fn build_capture_args(settings: &FfmpegSettings, constraints: &MediaConstraints) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    if constraints.video {
        args.extend([
            "-f".into(),
            settings.video_format.clone(),
            "-i".into(),
            settings.video_device.clone(),
        ]);
    }
    if constraints.audio {
        args.extend([
            "-f".into(),
            settings.audio_format.clone(),
            "-i".into(),
            settings.audio_device.clone(),
        ]);
    }

    if constraints.video {
        args.extend(
            ["-c:v", "libvpx", "-deadline", "realtime", "-cpu-used", "8", "-b:v", "1M"]
                .map(String::from),
        );
    } else {
        args.push("-vn".into());
    }
    if constraints.audio {
        args.extend(["-c:a", "libopus", "-b:a", "96k"].map(String::from));
    } else {
        args.push("-an".into());
    }

    args.extend(["-f", "webm", "-live", "1", "pipe:1"].map(String::from));
    args
}

/// Classify an ffmpeg startup failure from its stderr
pub fn classify_startup_failure(stderr: &str) -> CaptureError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("permission denied")
        || lower.contains("not authorized")
        || lower.contains("operation not permitted")
    {
        CaptureError::PermissionDenied(last_line(stderr))
    } else {
        CaptureError::DeviceUnavailable(last_line(stderr))
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("ffmpeg exited before producing data")
        .trim()
        .to_string()
}

/// State shared between the tracks, the encoder, and the supervisor task
struct FfmpegProcess {
    stop: Notify,
    stdout: Mutex<Option<ChildStdout>>,
    primed: Mutex<Option<Vec<u8>>>,
}

struct FfmpegControl {
    process: Arc<FfmpegProcess>,
}

impl TrackControl for FfmpegControl {
    fn request_stop(&self) {
        self.process.stop.notify_one();
    }
}

/// Capture backend backed by an ffmpeg child process
pub struct FfmpegBackend {
    settings: FfmpegSettings,
    processes: Mutex<HashMap<String, Arc<FfmpegProcess>>>,
}

impl FfmpegBackend {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self {
            settings,
            processes: Mutex::new(HashMap::new()),
        }
    }

    fn spawn(&self, constraints: &MediaConstraints) -> CaptureResult<Child> {
        let args = build_capture_args(&self.settings, constraints);
        tracing::debug!("Launching {} {}", self.settings.binary, args.join(" "));

        Command::new(&self.settings.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CaptureError::DeviceUnavailable(format!(
                    "{} not found; install FFmpeg to record",
                    self.settings.binary
                )),
                _ => CaptureError::Io(e),
            })
    }
}

#[async_trait]
impl CaptureBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn acquire(&self, constraints: &MediaConstraints) -> CaptureResult<MediaStream> {
        if constraints.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "no devices requested".to_string(),
            ));
        }

        let mut child = self.spawn(constraints)?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Encoder("Failed to capture FFmpeg stdout".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::Encoder("Failed to capture FFmpeg stdin".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CaptureError::Encoder("Failed to capture FFmpeg stderr".to_string()))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_task = spawn_stderr_drain(stderr, stderr_tail.clone());

        // The devices are ours once ffmpeg starts producing output
        let mut first = vec![0u8; self.settings.chunk_size.max(1)];
        let probe = Duration::from_millis(self.settings.probe_timeout_ms);
        let read = tokio::time::timeout(probe, stdout.read(&mut first)).await;

        let n = match read {
            Ok(Ok(n)) if n > 0 => n,
            Ok(Ok(_)) => {
                let status = child.wait().await?;
                let _ = stderr_task.await;
                let stderr = stderr_tail.lock().iter().cloned().collect::<Vec<_>>().join("\n");
                tracing::warn!("FFmpeg exited during startup ({}): {}", status, stderr);
                return Err(classify_startup_failure(&stderr));
            }
            Ok(Err(e)) => {
                abandon_startup(&mut child).await;
                return Err(CaptureError::Io(e));
            }
            Err(_) => {
                abandon_startup(&mut child).await;
                return Err(CaptureError::DeviceUnavailable(format!(
                    "no data from capture devices within {:?}",
                    probe
                )));
            }
        };
        first.truncate(n);

        let process = Arc::new(FfmpegProcess {
            stop: Notify::new(),
            stdout: Mutex::new(Some(stdout)),
            primed: Mutex::new(Some(first)),
        });

        let (state_tx, state_rx) = watch::channel(TrackState::Live);
        spawn_supervisor(
            child,
            stdin,
            process.clone(),
            state_tx,
            Duration::from_millis(self.settings.stop_grace_ms),
        );

        let control: Arc<dyn TrackControl> = Arc::new(FfmpegControl {
            process: process.clone(),
        });
        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(MediaTrack::new(
                TrackKind::Video,
                self.settings.video_device.clone(),
                state_rx.clone(),
                control.clone(),
            ));
        }
        if constraints.audio {
            tracks.push(MediaTrack::new(
                TrackKind::Audio,
                self.settings.audio_device.clone(),
                state_rx,
                control,
            ));
        }

        let stream = MediaStream::new(tracks);
        self.processes
            .lock()
            .insert(stream.id().to_string(), process);

        tracing::info!("FFmpeg capture open for stream {}", stream.id());
        Ok(stream)
    }

    fn create_encoder(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
    ) -> CaptureResult<Box<dyn MediaEncoder>> {
        let process = self.processes.lock().remove(stream.id()).ok_or_else(|| {
            CaptureError::Encoder(format!("stream {} was not opened by ffmpeg", stream.id()))
        })?;

        if options.timeslice_ms.is_some() {
            tracing::debug!("FFmpeg fragments follow chunk size; timeslice ignored");
        }

        Ok(Box::new(FfmpegEncoder {
            mime_type: options.mime_type.clone(),
            chunk_size: self.settings.chunk_size.max(1),
            process,
            reader: None,
        }))
    }
}

/// Kill a child that never became a capture and reap it
async fn abandon_startup(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("FFmpeg already gone at startup: {}", e);
    }
    if let Err(e) = child.wait().await {
        tracing::error!("Failed to wait for FFmpeg: {}", e);
    }
}

fn spawn_stderr_drain(stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!("ffmpeg: {}", line);
            let mut buffered = tail.lock();
            if buffered.len() == STDERR_TAIL_LINES {
                buffered.pop_front();
            }
            buffered.push_back(line);
        }
    })
}

/// Owns the child until it exits, then marks every track ended
fn spawn_supervisor(
    mut child: Child,
    stdin: ChildStdin,
    process: Arc<FfmpegProcess>,
    state: watch::Sender<TrackState>,
    grace: Duration,
) {
    tokio::spawn(async move {
        let stop_requested = tokio::select! {
            _ = process.stop.notified() => true,
            status = child.wait() => {
                match status {
                    Ok(status) => tracing::warn!("FFmpeg capture exited on its own: {}", status),
                    Err(e) => tracing::error!("Failed to wait for FFmpeg: {}", e),
                }
                false
            }
        };

        if stop_requested {
            quit_gracefully(&mut child, stdin, grace).await;
        }

        state.send_replace(TrackState::Ended);
        tracing::debug!("FFmpeg capture devices released");
    });
}

async fn quit_gracefully(child: &mut Child, mut stdin: ChildStdin, grace: Duration) {
    if let Err(e) = stdin.write_all(b"q").await {
        tracing::debug!("FFmpeg stdin closed before quit: {}", e);
    }
    let _ = stdin.flush().await;
    drop(stdin);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!("FFmpeg finished: {}", status),
        Ok(Err(e)) => tracing::error!("Failed to wait for FFmpeg: {}", e),
        Err(_) => {
            tracing::warn!("FFmpeg ignored quit for {:?}; killing", grace);
            if let Err(e) = child.kill().await {
                tracing::error!("Failed to kill FFmpeg: {}", e);
            }
        }
    }
}

/// Forwards ffmpeg stdout to the fragment sink
struct FfmpegEncoder {
    mime_type: String,
    chunk_size: usize,
    process: Arc<FfmpegProcess>,
    reader: Option<JoinHandle<std::io::Result<u64>>>,
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self, sink: FragmentSink) -> CaptureResult<()> {
        let mut stdout = self
            .process
            .stdout
            .lock()
            .take()
            .ok_or_else(|| CaptureError::Encoder("encoder already started".to_string()))?;
        let primed = self.process.primed.lock().take();
        let chunk_size = self.chunk_size;

        self.reader = Some(tokio::spawn(async move {
            let mut total = 0u64;
            if let Some(data) = primed {
                total += data.len() as u64;
                if sink.send(Fragment::new(data)).await.is_err() {
                    return Ok(total);
                }
            }

            let mut buf = vec![0u8; chunk_size];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                total += n as u64;
                if sink.send(Fragment::new(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Ok(total)
        }));

        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| CaptureError::Encoder("encoder was not started".to_string()))?;

        // ffmpeg writes the WebM trailer and closes stdout on quit
        self.process.stop.notify_one();

        let total = reader
            .await
            .map_err(|e| CaptureError::Encoder(format!("FFmpeg reader task failed: {}", e)))??;
        tracing::info!("FFmpeg encoder finished after {} bytes", total);
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.process.stop.notify_one();
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_settings() -> FfmpegSettings {
        FfmpegSettings {
            video_format: "v4l2".to_string(),
            video_device: "/dev/video0".to_string(),
            audio_format: "pulse".to_string(),
            audio_device: "default".to_string(),
            ..FfmpegSettings::default()
        }
    }

    #[test]
    fn test_capture_args_video_and_audio() {
        let args = build_capture_args(&linux_settings(), &MediaConstraints::default());
        let joined = args.join(" ");

        assert!(joined.contains("-f v4l2 -i /dev/video0"));
        assert!(joined.contains("-f pulse -i default"));
        assert!(joined.contains("-c:v libvpx"));
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.ends_with("-f webm -live 1 pipe:1"));
    }

    #[test]
    fn test_capture_args_video_only() {
        let constraints = MediaConstraints {
            video: true,
            audio: false,
        };
        let args = build_capture_args(&linux_settings(), &constraints);

        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"pulse".to_string()));
    }

    #[test]
    fn test_classify_permission_failure() {
        let stderr = "[video4linux2,v4l2 @ 0x1] Cannot open video device /dev/video0: Permission denied";
        assert!(matches!(
            classify_startup_failure(stderr),
            CaptureError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_classify_missing_device() {
        let stderr = "/dev/video9: No such file or directory\n";
        match classify_startup_failure(stderr) {
            CaptureError::DeviceUnavailable(message) => {
                assert_eq!(message, "/dev/video9: No such file or directory");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_startup_is_reaped() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        abandon_startup(&mut child).await;

        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_binary_is_device_unavailable() {
        let backend = FfmpegBackend::new(FfmpegSettings {
            binary: "wastewatch-no-such-ffmpeg".to_string(),
            ..linux_settings()
        });

        let result = backend.acquire(&MediaConstraints::default()).await;

        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }
}
