//! Transcription backend adapters.
//!
//! Backends turn converted audio into text. The variant is selected from
//! configuration once at subsystem startup. A backend's public contract
//! never fails outright: transport and API errors are carried inside the
//! returned [`TranscriptResult`], not thrown across the adapter boundary.

pub mod remote;
pub mod stub;

pub use remote::RemoteApiBackend;
pub use stub::StubBackend;

use crate::config::{BackendKind, SttConfig};
use crate::convert::AudioFormat;
use crate::error::{Result, RoomscribeError};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of one transcription call.
///
/// `text` and `error` are not mutually exclusive: a backend may return
/// partial or empty text alongside a diagnostic. Transient value; retention
/// is the downstream consumer's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptResult {
    pub text: String,
    pub error: Option<String>,
}

impl TranscriptResult {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            error: Some(error.into()),
        }
    }

    /// True when the backend reported a problem, regardless of whether any
    /// text came back.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Trait for speech-to-text backends.
///
/// This trait allows swapping implementations (offline stub vs hosted API).
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe converted audio.
    ///
    /// Never fails: any failure is captured in [`TranscriptResult::error`]
    /// so a malfunctioning backend cannot tear down a session.
    async fn transcribe(&self, audio: &[u8]) -> TranscriptResult;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the configured backend. Called once at subsystem startup, not per
/// utterance.
pub fn build_backend(config: &SttConfig) -> Result<Arc<dyn TranscriptionBackend>> {
    match config.backend {
        BackendKind::Stub => Ok(Arc::new(StubBackend::new(
            AudioFormat::transcription_target(),
        ))),
        BackendKind::RemoteApi => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| RoomscribeError::ConfigInvalidValue {
                    key: "stt.api_key".to_string(),
                    message: "required for the remote-api backend".to_string(),
                })?;
            Ok(Arc::new(RemoteApiBackend::new(
                config.endpoint.clone(),
                api_key.to_string(),
                config.model_name.clone(),
                AudioFormat::transcription_target(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SttConfig;

    #[test]
    fn test_result_from_text() {
        let result = TranscriptResult::from_text("hello");
        assert_eq!(result.text, "hello");
        assert_eq!(result.error, None);
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_result_from_error() {
        let result = TranscriptResult::from_error("backend down");
        assert!(result.text.is_empty());
        assert_eq!(result.error.as_deref(), Some("backend down"));
        assert!(result.is_degraded());
    }

    #[test]
    fn test_build_stub_backend() {
        let config = SttConfig::default();
        let backend = build_backend(&config).unwrap();
        assert_eq!(backend.name(), "stub");
    }

    #[test]
    fn test_build_remote_backend_requires_api_key() {
        let config = SttConfig {
            backend: BackendKind::RemoteApi,
            api_key: None,
            ..Default::default()
        };
        let result = build_backend(&config);
        assert!(matches!(
            result,
            Err(RoomscribeError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_build_remote_backend_rejects_empty_api_key() {
        let config = SttConfig {
            backend: BackendKind::RemoteApi,
            api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(build_backend(&config).is_err());
    }

    #[test]
    fn test_build_remote_backend_with_api_key() {
        let config = SttConfig {
            backend: BackendKind::RemoteApi,
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let backend = build_backend(&config).unwrap();
        assert_eq!(backend.name(), "remote-api");
    }

    #[test]
    fn test_backend_trait_is_object_safe() {
        let backend: Box<dyn TranscriptionBackend> =
            Box::new(StubBackend::new(AudioFormat::transcription_target()));
        assert_eq!(backend.name(), "stub");
    }
}
