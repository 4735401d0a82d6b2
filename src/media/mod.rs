//! Media artifacts and how they are previewed

pub mod artifact;
pub mod playback;
pub mod preview;

pub use artifact::{ArtifactOrigin, ArtifactSummary, MediaArtifact, SelectedFile};
pub use playback::{PlaybackRef, PlaybackRegistry};
pub use preview::{LivePreview, PreviewSlot, PreviewSource, PreviewSurface};
