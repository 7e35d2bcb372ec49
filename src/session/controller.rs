//! Session controller: join and leave voice rooms.

use crate::config::Config;
use crate::convert::{AudioFormat, FormatConverter};
use crate::emit::TranscriptSink;
use crate::error::{Result, RoomscribeError};
use crate::identity::IdentityResolver;
use crate::session::pipeline::PipelineContext;
use crate::session::room::VoiceSession;
use crate::stt::{self, TranscriptionBackend};
use crate::transport::{ChannelId, RoomId, VoiceTransport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::info;

/// Owns the active sessions, at most one per room.
///
/// The external command surface calls [`join`]/[`leave`]; everything in
/// between (speaker pipelines, conversion, transcription, emission) is
/// driven by the sessions themselves.
///
/// [`join`]: SessionController::join
/// [`leave`]: SessionController::leave
pub struct SessionController {
    transport: Arc<dyn VoiceTransport>,
    ctx: Arc<PipelineContext>,
    sessions: Arc<Mutex<HashMap<RoomId, Arc<VoiceSession>>>>,
    grace: Duration,
}

impl SessionController {
    /// Build a controller with the backend the configuration selects.
    /// Backend resolution happens here, once, not per utterance.
    pub fn new(
        config: &Config,
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn IdentityResolver>,
        sink: Arc<dyn TranscriptSink>,
    ) -> Result<Self> {
        let backend = stt::build_backend(&config.stt)?;
        Ok(Self::with_backend(config, transport, backend, resolver, sink))
    }

    /// Build a controller with an explicit backend (testing/library use).
    pub fn with_backend(
        config: &Config,
        transport: Arc<dyn VoiceTransport>,
        backend: Arc<dyn TranscriptionBackend>,
        resolver: Arc<dyn IdentityResolver>,
        sink: Arc<dyn TranscriptSink>,
    ) -> Self {
        let ctx = Arc::new(PipelineContext {
            converter: FormatConverter::new(config.audio.converter_binary.clone()),
            backend,
            resolver,
            sink,
            limiter: Arc::new(Semaphore::new(config.session.max_concurrent_finalize)),
            source_format: AudioFormat::platform_native(),
            target_format: AudioFormat::transcription_target(),
            silence_threshold: Duration::from_millis(config.audio.silence_threshold_ms as u64),
        });

        Self {
            transport,
            ctx,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            grace: Duration::from_millis(config.session.finalize_grace_ms as u64),
        }
    }

    /// Join a voice room and start receiving speech activity.
    ///
    /// Fails with `AlreadyConnected` while a session for the room exists;
    /// the caller must leave first.
    pub async fn join(&self, room: RoomId, channel: ChannelId) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&room) {
            return Err(RoomscribeError::AlreadyConnected { room });
        }

        let conn = self
            .transport
            .connect(room, channel, self.ctx.silence_threshold)
            .await?;
        let session = VoiceSession::spawn(
            room,
            channel,
            conn,
            self.ctx.clone(),
            self.grace,
            Arc::downgrade(&self.sessions),
        );
        sessions.insert(room, session);

        info!(room, channel, "joined voice room");
        Ok(())
    }

    /// Leave a room: destroy the connection and all child pipelines,
    /// discarding in-flight, unfinished utterances.
    ///
    /// Reports `NotConnected` when no session exists; callers treat that
    /// as a no-op, not a failure.
    pub async fn leave(&self, room: RoomId) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(&room)
            .ok_or(RoomscribeError::NotConnected { room })?;

        session.shutdown().await;
        info!(room, "left voice room");
        Ok(())
    }

    /// True while a session for the room exists.
    pub async fn is_connected(&self, room: RoomId) -> bool {
        self.sessions.lock().await.contains_key(&room)
    }

    /// Channel the room's session is bound to.
    pub async fn connected_channel(&self, room: RoomId) -> Result<ChannelId> {
        self.session(room).await.map(|s| s.channel())
    }

    /// Speakers currently being captured or finalized in a room.
    pub async fn active_speaker_count(&self, room: RoomId) -> Result<usize> {
        Ok(self.session(room).await?.active_speaker_count().await)
    }

    /// Pipelines spawned over the session's lifetime, one per speech-start.
    pub async fn pipelines_created(&self, room: RoomId) -> Result<u64> {
        Ok(self.session(room).await?.pipelines_created())
    }

    async fn session(&self, room: RoomId) -> Result<Arc<VoiceSession>> {
        self.sessions
            .lock()
            .await
            .get(&room)
            .cloned()
            .ok_or(RoomscribeError::NotConnected { room })
    }
}
