//! Playback references
//!
//! A preview surface plays an artifact through a transient reference rather
//! than holding the artifact itself. Each registration yields a new,
//! distinct reference; revoking it frees the entry.

use super::artifact::MediaArtifact;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

const PLAYBACK_SCHEME: &str = "blob:wastewatch/";

/// Handle naming one registered artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackRef(String);

impl PlaybackRef {
    fn new() -> Self {
        Self(format!("{}{}", PLAYBACK_SCHEME, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaybackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of live playback references
#[derive(Debug, Default)]
pub struct PlaybackRegistry {
    entries: RwLock<HashMap<PlaybackRef, MediaArtifact>>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact under a fresh reference
    pub fn create(&self, artifact: &MediaArtifact) -> PlaybackRef {
        let reference = PlaybackRef::new();
        self.entries
            .write()
            .insert(reference.clone(), artifact.clone());
        tracing::debug!(
            "Playback {} -> {} ({} bytes)",
            reference,
            artifact.name(),
            artifact.size()
        );
        reference
    }

    /// The artifact a reference points at, while it is live
    pub fn resolve(&self, reference: &PlaybackRef) -> Option<MediaArtifact> {
        self.entries.read().get(reference).cloned()
    }

    /// Release a reference; returns whether it was live
    pub fn revoke(&self, reference: &PlaybackRef) -> bool {
        let removed = self.entries.write().remove(reference).is_some();
        if removed {
            tracing::debug!("Revoked playback {}", reference);
        }
        removed
    }

    /// Number of live references
    pub fn live_count(&self) -> usize {
        self.entries.read().len()
    }
}
