//! Media artifacts
//!
//! The video a report is submitted with, either chosen through the file
//! picker or produced by finalizing a recording. Artifacts are immutable;
//! a new selection or recording replaces them wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Where an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOrigin {
    Upload,
    Recording,
}

/// Whether a declared content type is a video classification
pub fn is_video_content_type(content_type: &str) -> bool {
    content_type
        .get(..6)
        .map(|prefix| prefix.eq_ignore_ascii_case("video/"))
        .unwrap_or(false)
}

/// Content type declared for a file extension, as a file picker would
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "ogv" => "video/ogg",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// A file handed over by the file picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Read a file from disk, declaring its type from the extension
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(content_type_for_extension)
            .unwrap_or("application/octet-stream");

        Ok(Self::new(name, content_type, data))
    }

    pub fn is_video(&self) -> bool {
        is_video_content_type(&self.content_type)
    }
}

/// A finalized, submittable video payload
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    id: Uuid,
    name: String,
    content_type: String,
    data: Arc<[u8]>,
    origin: ArtifactOrigin,
    created_at: DateTime<Utc>,
}

impl MediaArtifact {
    fn new(name: String, content_type: String, data: Vec<u8>, origin: ArtifactOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            content_type,
            data: data.into(),
            origin,
            created_at: Utc::now(),
        }
    }

    /// Wrap the concatenated bytes of a recording
    pub fn from_recording(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self::new(name.into(), content_type.into(), data, ArtifactOrigin::Recording)
    }

    /// Accept a picked file, or `None` when it is not a video
    pub fn from_selection(file: SelectedFile) -> Option<Self> {
        if !file.is_video() {
            return None;
        }
        Some(Self::new(
            file.name,
            file.content_type,
            file.data,
            ArtifactOrigin::Upload,
        ))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn origin(&self) -> ArtifactOrigin {
        self.origin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            id: self.id,
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            size: self.size(),
            origin: self.origin,
            created_at: self.created_at,
        }
    }
}

/// Serializable description of an artifact, without its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub name: String,
    pub content_type: String,
    pub size: usize,
    pub origin: ArtifactOrigin,
    pub created_at: DateTime<Utc>,
}
