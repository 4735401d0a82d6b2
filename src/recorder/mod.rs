//! Recording system module
//!
//! This module implements the capture-record-preview flow:
//! - Fragment and FragmentLog for the ordered recording buffer
//! - CaptureController to own the session lifecycle
//! - RecordingState and settings shared with the report form

pub mod controller;
pub mod fragment;
pub mod state;

pub use controller::CaptureController;
pub use fragment::{Fragment, FragmentLog};
pub use state::{
    CaptureEvent, FinishedRecording, RecordingSettings, RecordingState, RECORDED_CONTENT_TYPE,
    RECORDED_FILE_NAME,
};
