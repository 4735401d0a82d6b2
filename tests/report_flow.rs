//! End-to-end report flows through the synthetic backend

use std::sync::Arc;
use std::time::Duration;

use wastewatch_lib::capture::{DeviceAccess, SyntheticBackend, TrackState};
use wastewatch_lib::media::{PreviewSlot, PreviewSource, SelectedFile};
use wastewatch_lib::recorder::{CaptureEvent, RecordingSettings, RecordingState};
use wastewatch_lib::report::{
    Coordinates, DryRunSubmitter, FixedLocation, InputMode, NoLocation, ReportForm,
    SelectionOutcome, SubmitError,
};

fn form(backend: Arc<SyntheticBackend>, preview: Arc<PreviewSlot>) -> ReportForm {
    ReportForm::new(
        backend,
        RecordingSettings::default(),
        preview,
        Arc::new(FixedLocation(Coordinates::new(-1.2921, 36.8219).unwrap())),
        Arc::new(DryRunSubmitter::new(64)),
    )
}

#[tokio::test]
async fn test_record_preview_and_submit() {
    let backend = Arc::new(SyntheticBackend::timed(Duration::from_millis(5), 32));
    let preview = Arc::new(PreviewSlot::new());
    let mut form = form(backend.clone(), preview.clone());
    let mut events = form.controller().subscribe();

    form.set_mode(InputMode::Record);
    form.start_recording().await.unwrap();
    assert_eq!(form.recording_state(), RecordingState::Recording);
    assert!(matches!(preview.source(), PreviewSource::Live(_)));

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        form.pump();
    }
    let finished = form.stop_recording().await.unwrap();

    assert_eq!(form.recording_state(), RecordingState::Idle);
    assert!(finished.fragment_count > 0);
    assert_eq!(finished.artifact.size(), finished.fragment_count * 32);
    assert_eq!(finished.artifact.content_type(), "video/webm");
    assert_eq!(
        preview.source(),
        PreviewSource::Artifact {
            playback: finished.playback.clone()
        }
    );
    assert!(backend
        .issued_tracks()
        .iter()
        .all(|t| t.ready_state() == TrackState::Ended));

    assert!(matches!(events.recv().await, Ok(CaptureEvent::Started { .. })));
    assert!(matches!(events.recv().await, Ok(CaptureEvent::Stopped { .. })));

    form.locate().await.unwrap();
    let progress = form.subscribe_progress();
    let receipt = form.submit().await.unwrap();

    assert!(receipt.dry_run);
    assert_eq!(receipt.artifact.name, "recorded-video.webm");
    assert_eq!(receipt.bytes_sent as usize, finished.artifact.size());
    assert!(receipt.location.is_some());
    assert!(progress.borrow().is_complete());
}

#[tokio::test]
async fn test_upload_then_record_replaces_artifact() {
    let backend = Arc::new(SyntheticBackend::scripted(vec![b"live".to_vec()]));
    let preview = Arc::new(PreviewSlot::new());
    let mut form = form(backend, preview);

    let uploaded = match form.select_file(SelectedFile::new(
        "earlier.mp4",
        "video/mp4",
        b"mp4".to_vec(),
    )) {
        SelectionOutcome::Accepted(playback) => playback,
        SelectionOutcome::Ignored => panic!("mp4 was ignored"),
    };

    form.start_recording().await.unwrap();
    assert!(form.current_artifact().is_none());
    assert!(matches!(
        form.submit().await,
        Err(SubmitError::RecordingInProgress)
    ));

    let finished = form.stop_recording().await.unwrap();

    assert!(form.playback().resolve(&uploaded).is_none());
    assert_ne!(finished.playback, uploaded);
    assert_eq!(form.current_artifact().unwrap().bytes(), b"live");
    assert_eq!(form.playback().live_count(), 1);
}

#[tokio::test]
async fn test_denied_camera_keeps_form_usable() {
    let backend = Arc::new(
        SyntheticBackend::scripted(Vec::<Vec<u8>>::new()).with_access(DeviceAccess::Denied),
    );
    let preview = Arc::new(PreviewSlot::new());
    let mut form = ReportForm::new(
        backend.clone(),
        RecordingSettings::default(),
        preview,
        Arc::new(NoLocation),
        Arc::new(DryRunSubmitter::default()),
    );

    assert!(form.start_recording().await.is_err());
    assert_eq!(form.recording_state(), RecordingState::Idle);
    assert!(backend.issued_tracks().is_empty());
    assert!(matches!(form.submit().await, Err(SubmitError::NoMedia)));

    form.select_file(SelectedFile::new("fallback.webm", "video/webm", vec![0u8; 5]));
    assert!(form.locate().await.is_err());
    let receipt = form.submit().await.unwrap();

    assert_eq!(receipt.location, None);
    assert_eq!(receipt.bytes_sent, 5);
}

#[tokio::test]
async fn test_discard_then_record_again() {
    let backend = Arc::new(SyntheticBackend::scripted(vec![b"take".to_vec()]));
    let preview = Arc::new(PreviewSlot::new());
    let mut form = form(backend.clone(), preview.clone());

    form.start_recording().await.unwrap();
    form.discard_recording().await.unwrap();

    assert!(form.current_artifact().is_none());
    assert_eq!(preview.source(), PreviewSource::Empty);

    form.start_recording().await.unwrap();
    let finished = form.stop_recording().await.unwrap();

    assert_eq!(finished.artifact.bytes(), b"take");
    assert_eq!(backend.acquisitions(), 2);

    form.shutdown().await;
    assert_eq!(form.playback().live_count(), 0);
    assert_eq!(preview.source(), PreviewSource::Empty);
}
