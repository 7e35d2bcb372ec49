//! One active voice room connection.
//!
//! A `VoiceSession` exclusively owns its transport connection and the
//! registry of per-speaker pipelines. Its event loop is the room-level
//! speech-activity listener: registered once when the session spawns,
//! released exactly once when the loop exits, whether through a leave
//! request or platform-side connection loss.

use crate::session::pipeline::{PipelineContext, PipelineHandle, PipelineState};
use crate::transport::{ChannelId, RoomId, SpeakerId, TransportEvent, VoiceConnection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type SessionRegistry = Mutex<HashMap<RoomId, Arc<VoiceSession>>>;

pub(crate) struct VoiceSession {
    room: RoomId,
    channel: ChannelId,
    pipelines: Arc<Mutex<HashMap<SpeakerId, PipelineHandle>>>,
    pipelines_created: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceSession {
    /// Take ownership of a fresh connection and start the event loop.
    ///
    /// `registry` points back at the controller's session map so a
    /// platform-side disconnect can forget the session on its own.
    pub(crate) fn spawn(
        room: RoomId,
        channel: ChannelId,
        conn: Box<dyn VoiceConnection>,
        ctx: Arc<PipelineContext>,
        grace: Duration,
        registry: Weak<SessionRegistry>,
    ) -> Arc<Self> {
        let pipelines = Arc::new(Mutex::new(HashMap::new()));
        let pipelines_created = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let event_task = tokio::spawn(event_loop(
            room,
            conn,
            ctx,
            pipelines.clone(),
            pipelines_created.clone(),
            shutdown_rx,
            grace,
            registry,
        ));

        Arc::new(Self {
            room,
            channel,
            pipelines,
            pipelines_created,
            shutdown: shutdown_tx,
            event_task: Mutex::new(Some(event_task)),
        })
    }

    /// Tear the session down: stop the event loop, abort capturing
    /// pipelines, grant finalizing ones their grace period, release the
    /// connection. Idempotent; the second call finds nothing to do.
    pub(crate) async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.event_task.lock().await.take();
        if let Some(task) = task
            && task.await.is_err()
        {
            debug!(room = self.room, "session event loop aborted");
        }
    }

    pub(crate) fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Pipelines spawned over this session's lifetime, one per
    /// speech-start notification.
    pub(crate) fn pipelines_created(&self) -> u64 {
        self.pipelines_created.load(Ordering::SeqCst)
    }

    /// Speakers whose pipelines have not yet retired.
    pub(crate) async fn active_speaker_count(&self) -> usize {
        self.pipelines
            .lock()
            .await
            .values()
            .filter(|handle| handle.state() != PipelineState::Done)
            .count()
    }
}

#[allow(clippy::too_many_arguments)]
async fn event_loop(
    room: RoomId,
    mut conn: Box<dyn VoiceConnection>,
    ctx: Arc<PipelineContext>,
    pipelines: Arc<Mutex<HashMap<SpeakerId, PipelineHandle>>>,
    created: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
    registry: Weak<SessionRegistry>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(room, "session shutdown requested");
                break;
            }
            event = conn.next_event() => {
                match event {
                    Some(TransportEvent::SpeechStart { speaker, frames }) => {
                        debug!(room, speaker, "speech started");
                        let mut map = pipelines.lock().await;
                        // A pipeline for this speaker that has not retired
                        // becomes the predecessor the new capture waits on.
                        let predecessor = map
                            .remove(&speaker)
                            .filter(|handle| handle.state() != PipelineState::Done);
                        let handle =
                            PipelineHandle::spawn(ctx.clone(), speaker, frames, predecessor);
                        map.insert(speaker, handle);
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(TransportEvent::SpeechEnd { speaker }) => {
                        debug!(room, speaker, "speech ended");
                        if let Some(handle) = pipelines.lock().await.get(&speaker) {
                            handle.finalize();
                        }
                    }
                    None => {
                        info!(room, "voice connection closed by platform");
                        break;
                    }
                }
            }
        }
    }

    teardown_pipelines(&pipelines, grace).await;
    conn.disconnect().await;

    // Forget the session so a later join can establish a fresh one. A
    // leave in progress has already removed it, making this a no-op.
    if let Some(sessions) = registry.upgrade() {
        sessions.lock().await.remove(&room);
    }
}

/// Abort capturing pipelines immediately and give finalizing ones one
/// shared, bounded grace window to drain.
async fn teardown_pipelines(
    pipelines: &Mutex<HashMap<SpeakerId, PipelineHandle>>,
    grace: Duration,
) {
    let handles: Vec<PipelineHandle> = pipelines
        .lock()
        .await
        .drain()
        .map(|(_, handle)| handle)
        .collect();
    if handles.is_empty() {
        return;
    }
    info!(count = handles.len(), "tearing down speaker pipelines");

    for handle in &handles {
        if handle.state() == PipelineState::Capturing {
            handle.abort_capture();
        }
    }

    let deadline = Instant::now() + grace;
    for handle in handles {
        let remaining = deadline.saturating_duration_since(Instant::now());
        handle.shutdown(remaining).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{AudioFormat, FormatConverter};
    use crate::emit::CollectorSink;
    use crate::identity::IdentityRegistry;
    use crate::stt::StubBackend;
    use crate::transport::{MockTransport, VoiceTransport};
    use tokio::sync::Semaphore;

    fn context(sink: Arc<CollectorSink>) -> Arc<PipelineContext> {
        let format = AudioFormat::transcription_target();
        Arc::new(PipelineContext {
            converter: FormatConverter::new("/definitely/not/a/binary"),
            backend: Arc::new(StubBackend::new(format)),
            resolver: Arc::new(IdentityRegistry::new()),
            sink,
            limiter: Arc::new(Semaphore::new(4)),
            source_format: format,
            target_format: format,
            silence_threshold: Duration::from_millis(800),
        })
    }

    async fn wait_until(mut check: impl AsyncFnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn test_session_runs_speaker_through_pipeline() {
        let transport = MockTransport::new();
        let handle = transport.script();
        let conn = transport
            .connect(1, 2, Duration::from_millis(800))
            .await
            .unwrap();

        let sink = Arc::new(CollectorSink::new());
        let session = VoiceSession::spawn(
            1,
            2,
            conn,
            context(sink.clone()),
            Duration::from_secs(2),
            Weak::new(),
        );

        let frames = handle.start_speaking(7).await.unwrap();
        frames.send(vec![0u8; 3200]).await.unwrap();
        handle.stop_speaking(7).await;

        wait_until(async || sink.len() == 1).await;
        assert_eq!(session.pipelines_created(), 1);
        assert_eq!(sink.lines()[0].speaker_label, "speaker-7");

        session.shutdown().await;
        assert!(handle.is_disconnected());
    }

    #[tokio::test]
    async fn test_shutdown_discards_capturing_pipeline() {
        let transport = MockTransport::new();
        let handle = transport.script();
        let conn = transport
            .connect(1, 2, Duration::from_millis(800))
            .await
            .unwrap();

        let sink = Arc::new(CollectorSink::new());
        let session = VoiceSession::spawn(
            1,
            2,
            conn,
            context(sink.clone()),
            Duration::from_secs(2),
            Weak::new(),
        );

        let frames = handle.start_speaking(7).await.unwrap();
        frames.send(vec![0u8; 3200]).await.unwrap();
        wait_until(async || session.pipelines_created() == 1).await;

        // No speech-end signal: the utterance is still capturing and must
        // be discarded, not transcribed.
        session.shutdown().await;
        assert!(sink.is_empty());
        assert!(handle.is_disconnected());
        assert_eq!(session.active_speaker_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let transport = MockTransport::new();
        let handle = transport.script();
        let conn = transport
            .connect(1, 2, Duration::from_millis(800))
            .await
            .unwrap();

        let sink = Arc::new(CollectorSink::new());
        let session = VoiceSession::spawn(
            1,
            2,
            conn,
            context(sink),
            Duration::from_secs(2),
            Weak::new(),
        );

        session.shutdown().await;
        session.shutdown().await;
        assert!(handle.is_disconnected());
    }

    #[tokio::test]
    async fn test_connection_loss_forgets_session() {
        let transport = MockTransport::new();
        let handle = transport.script();
        let conn = transport
            .connect(1, 2, Duration::from_millis(800))
            .await
            .unwrap();

        let sink = Arc::new(CollectorSink::new());
        let registry: Arc<SessionRegistry> = Arc::new(Mutex::new(HashMap::new()));
        let session = VoiceSession::spawn(
            1,
            2,
            conn,
            context(sink),
            Duration::from_secs(2),
            Arc::downgrade(&registry),
        );
        registry.lock().await.insert(1, session);

        // The platform drops the connection: the event loop must tear down
        // and remove the session from the registry on its own.
        handle.close();
        wait_until(async || registry.lock().await.is_empty()).await;
    }
}
