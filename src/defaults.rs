//! Default configuration constants for roomscribe.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Sample rate of raw audio delivered by the platform transport, in Hz.
///
/// Voice platforms decode their wire codec to 48kHz PCM before handing
/// frames to subscribers.
pub const SOURCE_SAMPLE_RATE: u32 = 48_000;

/// Channel count of raw audio delivered by the platform transport.
pub const SOURCE_CHANNELS: u16 = 2;

/// Sample rate expected by the transcription backends, in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and upload size for voice applications.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Channel count expected by the transcription backends.
pub const TARGET_CHANNELS: u16 = 1;

/// Default silence duration in milliseconds before an utterance is considered ended.
///
/// 800ms allows for natural pauses in speech without merging distinct
/// utterances. Overly short thresholds clip normal speech pauses; overly
/// long ones run separate utterances together.
pub const SILENCE_THRESHOLD_MS: u32 = 800;

/// Multiple of the silence threshold after which a pipeline receiving no
/// frames treats the platform's end-of-speech signal as lost and finalizes
/// on its own.
pub const MISSED_END_SIGNAL_FACTOR: u32 = 4;

/// Default grace period in milliseconds granted to finalizing pipelines
/// when a session is torn down.
///
/// Long enough for one conversion and transcription round trip; after it
/// elapses the pipeline is abandoned and its result discarded.
pub const FINALIZE_GRACE_MS: u32 = 2_000;

/// Default bound on concurrent conversion/transcription fan-out.
///
/// Shared across all sessions: the external converter process and the
/// backend connection are not session-exclusive resources.
pub const MAX_CONCURRENT_FINALIZE: usize = 4;

/// Default external converter binary, resolved through PATH.
pub const CONVERTER_BINARY: &str = "ffmpeg";

/// Default model name for the remote transcription backend.
pub const DEFAULT_MODEL: &str = "whisper-1";

/// Default endpoint for the remote transcription backend.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Capacity of the per-speaker raw frame channels and the room event channel.
pub const CHANNEL_CAPACITY: usize = 64;
