//! Speaker attribution.
//!
//! Resolves platform speaker identifiers to human-readable display
//! identities before a transcript line is emitted. The mapping itself is
//! populated by the external command surface (bind/unbind); this module
//! supplies the lookup seam and an in-memory store.

use crate::transport::SpeakerId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Display identity of a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub label: String,
    pub voice_preference: Option<String>,
}

/// Trait for resolving a speaker id to a display identity.
///
/// Synchronous lookup; on a miss, implementations return a fallback label
/// built from the raw identifier rather than failing.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, speaker: SpeakerId) -> Identity;
}

/// In-memory identity mapping.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    entries: RwLock<HashMap<SpeakerId, Identity>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a speaker to a display label and optional voice preference,
    /// replacing any previous binding.
    pub fn bind(&self, speaker: SpeakerId, label: impl Into<String>, voice_preference: Option<String>) {
        let identity = Identity {
            label: label.into(),
            voice_preference,
        };
        self.write().insert(speaker, identity);
    }

    /// Remove a speaker's binding. Returns true if one existed.
    pub fn unbind(&self, speaker: SpeakerId) -> bool {
        self.write().remove(&speaker).is_some()
    }

    /// Label used when a speaker has no binding.
    pub fn fallback_label(speaker: SpeakerId) -> String {
        format!("speaker-{speaker}")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SpeakerId, Identity>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl IdentityResolver for IdentityRegistry {
    fn resolve(&self, speaker: SpeakerId) -> Identity {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(&speaker).cloned().unwrap_or_else(|| Identity {
            label: Self::fallback_label(speaker),
            voice_preference: None,
        })
    }
}
