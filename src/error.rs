//! Error types for roomscribe.

use crate::transport::RoomId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoomscribeError {
    // Session errors
    #[error("Already connected to room {room}")]
    AlreadyConnected { room: RoomId },

    #[error("Not connected to room {room}")]
    NotConnected { room: RoomId },

    // Transport errors
    #[error("Voice transport error: {message}")]
    Transport { message: String },

    // Conversion errors
    #[error("Audio conversion unavailable: {message}")]
    ConversionUnavailable { message: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RoomscribeError>;
