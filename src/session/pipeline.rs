//! Per-speaker capture pipeline.
//!
//! Each currently-talking participant gets one pipeline that owns the
//! utterance buffer for that speech span and drives it through
//! capture → convert → transcribe → attribute → emit. Pipelines for
//! distinct speakers advance independently; nothing serializes them.

use crate::convert::{AudioFormat, FormatConverter};
use crate::defaults;
use crate::emit::{TranscriptLine, TranscriptSink};
use crate::identity::IdentityResolver;
use crate::stt::TranscriptionBackend;
use crate::transport::SpeakerId;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle of one speaker pipeline. States advance strictly forward and
/// are never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Raw frames are accumulating in the utterance buffer.
    Capturing,
    /// Speech ended; the utterance is draining through conversion and
    /// transcription. Not cancellable once entered.
    Finalizing,
    /// Terminal.
    Done,
}

/// Accumulates one speaker's raw audio frames between speech start and
/// speech end. Exclusively owned by its pipeline.
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    bytes: Vec<u8>,
    frames: usize,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw frame. Insertion order is capture order.
    pub fn push(&mut self, frame: &[u8]) {
        self.bytes.extend_from_slice(frame);
        self.frames += 1;
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Snapshot the captured audio into an immutable utterance.
    ///
    /// Empty buffers yield `None`: an utterance with zero captured bytes
    /// never reaches the converter or the backend.
    pub fn into_utterance(self, speaker: SpeakerId, format: AudioFormat) -> Option<Utterance> {
        if self.bytes.is_empty() {
            return None;
        }
        let duration_estimate = Duration::from_millis(format.duration_ms(self.bytes.len()));
        Some(Utterance {
            speaker,
            raw_samples: self.bytes,
            duration_estimate,
        })
    }
}

/// Immutable snapshot of one complete utterance, handed downstream once
/// capture ends.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub speaker: SpeakerId,
    pub raw_samples: Vec<u8>,
    pub duration_estimate: Duration,
}

/// Collaborators shared by every speaker pipeline in the process.
///
/// The converter process and backend connection are not session-exclusive;
/// `limiter` bounds their combined fan-out under many simultaneous speakers.
pub(crate) struct PipelineContext {
    pub(crate) converter: FormatConverter,
    pub(crate) backend: Arc<dyn TranscriptionBackend>,
    pub(crate) resolver: Arc<dyn IdentityResolver>,
    pub(crate) sink: Arc<dyn TranscriptSink>,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) source_format: AudioFormat,
    pub(crate) target_format: AudioFormat,
    pub(crate) silence_threshold: Duration,
}

/// Control signals from the session event loop to a capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineSignal {
    Run,
    /// Speech ended: drain the buffer and process it.
    Finalize,
    /// Session teardown during capture: discard the buffer.
    Abort,
}

/// How the capture loop ended.
#[derive(Debug, PartialEq, Eq)]
enum CaptureOutcome {
    Finalize,
    Abort,
}

/// Owning handle to one spawned speaker pipeline.
pub(crate) struct PipelineHandle {
    speaker: SpeakerId,
    signal: watch::Sender<PipelineSignal>,
    state: watch::Receiver<PipelineState>,
    task: JoinHandle<()>,
    started_at: Instant,
}

impl PipelineHandle {
    /// Spawn a pipeline for a speaker that just started talking.
    ///
    /// `predecessor` is the same speaker's previous pipeline when it has not
    /// retired yet; the new capture waits for it so buffers never interleave.
    pub(crate) fn spawn(
        ctx: Arc<PipelineContext>,
        speaker: SpeakerId,
        frames: mpsc::Receiver<Vec<u8>>,
        predecessor: Option<PipelineHandle>,
    ) -> Self {
        let (signal_tx, signal_rx) = watch::channel(PipelineSignal::Run);
        let (state_tx, state_rx) = watch::channel(PipelineState::Capturing);
        let task = tokio::spawn(run(ctx, speaker, frames, signal_rx, state_tx, predecessor));
        Self {
            speaker,
            signal: signal_tx,
            state: state_rx,
            task,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Platform speech-end signal: drain and process the buffer.
    pub(crate) fn finalize(&self) {
        self.signal.send_replace(PipelineSignal::Finalize);
    }

    /// Session teardown: discard an in-flight, unfinished buffer. A
    /// pipeline already finalizing is unaffected.
    pub(crate) fn abort_capture(&self) {
        self.signal.send_replace(PipelineSignal::Abort);
    }

    /// Wait for the pipeline task to finish.
    pub(crate) async fn wait(&mut self) {
        if (&mut self.task).await.is_err() {
            debug!(speaker = self.speaker, "pipeline task aborted");
        }
    }

    /// Wait up to `grace` for the pipeline to retire, then abandon it and
    /// discard its eventual result.
    pub(crate) async fn shutdown(mut self, grace: Duration) {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            warn!(
                speaker = self.speaker,
                capture_age = ?self.started_at.elapsed(),
                "pipeline did not drain within grace period, abandoning"
            );
            // The blocking converter call, if in flight, still runs to
            // completion on its own thread and closes both pipe ends.
            self.task.abort();
        }
    }
}

async fn run(
    ctx: Arc<PipelineContext>,
    speaker: SpeakerId,
    mut frames: mpsc::Receiver<Vec<u8>>,
    mut signal: watch::Receiver<PipelineSignal>,
    state: watch::Sender<PipelineState>,
    predecessor: Option<PipelineHandle>,
) {
    // A new utterance for a speaker must not interleave with one still
    // finalizing: wait for the previous pipeline to fully retire first.
    // Frames queue in our subscription channel meanwhile.
    if let Some(mut previous) = predecessor {
        previous.wait().await;
    }

    let capture_started = Instant::now();
    let mut buffer = UtteranceBuffer::new();

    // If the platform's end-of-speech signal is lost, self-finalize after a
    // multiple of the silence threshold without frames.
    let idle_limit = ctx.silence_threshold * defaults::MISSED_END_SIGNAL_FACTOR;

    let outcome = loop {
        tokio::select! {
            changed = signal.changed() => {
                if changed.is_err() {
                    // Session dropped the handle without signalling.
                    break CaptureOutcome::Abort;
                }
                match *signal.borrow_and_update() {
                    PipelineSignal::Finalize => break CaptureOutcome::Finalize,
                    PipelineSignal::Abort => break CaptureOutcome::Abort,
                    PipelineSignal::Run => {}
                }
            }
            frame = tokio::time::timeout(idle_limit, frames.recv()) => {
                match frame {
                    Ok(Some(bytes)) => buffer.push(&bytes),
                    // Subscription closed: the platform is done with this speaker.
                    Ok(None) => break CaptureOutcome::Finalize,
                    Err(_) => {
                        debug!(speaker, "no frames within inactivity limit, finalizing");
                        break CaptureOutcome::Finalize;
                    }
                }
            }
        }
    };

    if outcome == CaptureOutcome::Abort {
        debug!(
            speaker,
            discarded_bytes = buffer.byte_len(),
            "capture aborted, utterance discarded"
        );
        state.send_replace(PipelineState::Done);
        return;
    }

    state.send_replace(PipelineState::Finalizing);

    // Pick up frames that were already queued when speech ended.
    while let Ok(bytes) = frames.try_recv() {
        buffer.push(&bytes);
    }
    drop(frames);

    if let Some(utterance) = buffer.into_utterance(speaker, ctx.source_format) {
        finalize(&ctx, utterance, capture_started.elapsed()).await;
    } else {
        debug!(speaker, "empty utterance discarded");
    }

    state.send_replace(PipelineState::Done);
}

/// Drain one utterance through convert → transcribe → attribute → emit.
///
/// Converter and backend failures are absorbed here: they degrade this one
/// utterance and never propagate to the session.
async fn finalize(ctx: &PipelineContext, utterance: Utterance, capture_elapsed: Duration) {
    let Utterance {
        speaker,
        raw_samples,
        duration_estimate,
    } = utterance;

    let Ok(_permit) = ctx.limiter.clone().acquire_owned().await else {
        // Limiter closed: the subsystem is shutting down.
        return;
    };

    debug!(
        speaker,
        bytes = raw_samples.len(),
        duration_ms = duration_estimate.as_millis() as u64,
        capture_elapsed = ?capture_elapsed,
        "finalizing utterance"
    );

    let converted = match ctx
        .converter
        .convert_async(raw_samples, ctx.source_format, ctx.target_format)
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(speaker, "conversion degraded, utterance dropped: {e}");
            return;
        }
    };

    let result = ctx.backend.transcribe(&converted).await;
    if let Some(error) = &result.error {
        warn!(
            speaker,
            backend = ctx.backend.name(),
            "transcription degraded: {error}"
        );
    }

    let identity = ctx.resolver.resolve(speaker);
    ctx.sink.emit(TranscriptLine {
        speaker,
        speaker_label: identity.label,
        text: result.text,
        error: result.error,
        timestamp: SystemTime::now(),
    });
}
