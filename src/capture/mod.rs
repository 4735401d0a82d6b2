//! Capture device boundary
//!
//! Backends that open cameras and microphones, and the scoped guard that
//! guarantees they are released again.

pub mod error;
pub mod ffmpeg;
pub mod guard;
pub mod synthetic;
pub mod traits;

pub use error::{CaptureError, CaptureResult};
pub use ffmpeg::{FfmpegBackend, FfmpegSettings};
pub use guard::{ReleaseReport, StreamGuard};
pub use synthetic::{DeviceAccess, SyntheticBackend};
pub use traits::{
    CaptureBackend, EncoderOptions, FragmentSink, MediaConstraints, MediaEncoder, MediaStream,
    MediaTrack, TrackControl, TrackKind, TrackState,
};
