use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub stt: SttConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

/// Transcription backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub model_name: String,
    pub endpoint: String,
}

/// Audio capture and conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub silence_threshold_ms: u32,
    pub converter_binary: String,
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub finalize_grace_ms: u32,
    pub max_concurrent_finalize: usize,
}

/// Transcription backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Deterministic offline placeholder, never fails.
    #[default]
    Stub,
    /// Hosted speech-to-text over HTTP.
    RemoteApi,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Stub,
            api_key: None,
            model_name: defaults::DEFAULT_MODEL.to_string(),
            endpoint: defaults::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: defaults::SILENCE_THRESHOLD_MS,
            converter_binary: defaults::CONVERTER_BINARY.to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            finalize_grace_ms: defaults::FINALIZE_GRACE_MS,
            max_concurrent_finalize: defaults::MAX_CONCURRENT_FINALIZE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - ROOMSCRIBE_BACKEND → stt.backend ("stub" or "remote-api")
    /// - ROOMSCRIBE_API_KEY → stt.api_key
    /// - ROOMSCRIBE_MODEL → stt.model_name
    /// - ROOMSCRIBE_CONVERTER → audio.converter_binary
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(backend) = std::env::var("ROOMSCRIBE_BACKEND") {
            match backend.as_str() {
                "stub" => self.stt.backend = BackendKind::Stub,
                "remote-api" => self.stt.backend = BackendKind::RemoteApi,
                _ => {}
            }
        }

        if let Ok(api_key) = std::env::var("ROOMSCRIBE_API_KEY")
            && !api_key.is_empty()
        {
            self.stt.api_key = Some(api_key);
        }

        if let Ok(model) = std::env::var("ROOMSCRIBE_MODEL")
            && !model.is_empty()
        {
            self.stt.model_name = model;
        }

        if let Ok(converter) = std::env::var("ROOMSCRIBE_CONVERTER")
            && !converter.is_empty()
        {
            self.audio.converter_binary = converter;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/roomscribe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("roomscribe")
            .join("config.toml")
    }
}
