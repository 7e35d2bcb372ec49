//! roomscribe - multi-speaker voice capture and transcription
//!
//! Turns live speech from simultaneous voice-room participants into
//! attributed transcript lines: per-speaker capture, format conversion
//! through an external resampler, pluggable transcription, attribution.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod config;
pub mod convert;
pub mod defaults;
pub mod emit;
pub mod error;
pub mod identity;
pub mod session;
pub mod stt;
pub mod transport;

// Core seams (transport → pipeline → sink)
pub use emit::{ChannelSink, CollectorSink, LogSink, TranscriptLine, TranscriptSink};
pub use identity::{Identity, IdentityRegistry, IdentityResolver};
pub use stt::{TranscriptResult, TranscriptionBackend};
pub use transport::{
    ChannelId, MockTransport, RoomId, SpeakerId, TransportEvent, VoiceConnection, VoiceTransport,
};

// Session control
pub use session::controller::SessionController;
pub use session::pipeline::{PipelineState, Utterance, UtteranceBuffer};

// Conversion
pub use convert::{AudioFormat, FormatConverter};

// Error handling
pub use error::{Result, RoomscribeError};

// Config
pub use config::{BackendKind, Config};
