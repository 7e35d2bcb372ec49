//! Attributed transcript emission.
//!
//! Once an utterance has been transcribed and attributed, exactly one line
//! is handed to a pluggable sink. Emission is a fire-and-forget side effect:
//! the subsystem does not retry, persist, or replay emitted lines.

use crate::transport::SpeakerId;
use std::sync::Mutex;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One attributed transcript line.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptLine {
    pub speaker: SpeakerId,
    pub speaker_label: String,
    pub text: String,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

/// Pluggable transcript output handler.
/// Pairs with VoiceTransport for input - this handles attributed output.
pub trait TranscriptSink: Send + Sync {
    /// Hand one attributed line downstream.
    fn emit(&self, line: TranscriptLine);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Logs each line through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TranscriptSink for LogSink {
    fn emit(&self, line: TranscriptLine) {
        match &line.error {
            Some(error) => warn!(
                speaker = %line.speaker_label,
                %error,
                "transcript (degraded): {}",
                line.text
            ),
            None => info!(speaker = %line.speaker_label, "transcript: {}", line.text),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Forwards lines over a channel to whatever bus the host wires up.
///
/// Lines are dropped, not queued indefinitely, when the receiver falls
/// behind or goes away.
pub struct ChannelSink {
    tx: mpsc::Sender<TranscriptLine>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<TranscriptLine>) -> Self {
        Self { tx }
    }
}

impl TranscriptSink for ChannelSink {
    fn emit(&self, line: TranscriptLine) {
        if let Err(e) = self.tx.try_send(line) {
            debug!("transcript receiver unavailable, line dropped: {e}");
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Collects lines for tests and library use.
#[derive(Debug, Default)]
pub struct CollectorSink {
    lines: Mutex<Vec<TranscriptLine>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in emission order.
    pub fn lines(&self) -> Vec<TranscriptLine> {
        self.locked().clone()
    }

    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Vec<TranscriptLine>> {
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TranscriptSink for CollectorSink {
    fn emit(&self, line: TranscriptLine) {
        self.locked().push(line);
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
