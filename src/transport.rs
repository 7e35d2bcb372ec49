//! Platform voice transport abstraction.
//!
//! The real-time audio transport is an external collaborator: it owns the
//! wire connection to a voice room, decodes participant audio to raw PCM,
//! and reports speech activity. This module defines the seam the session
//! layer consumes, plus a scriptable in-memory transport for tests.

use crate::error::{Result, RoomscribeError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Platform identifier of a voice room.
pub type RoomId = u64;

/// Platform identifier of a channel within a room.
pub type ChannelId = u64;

/// Platform identifier of a participant.
pub type SpeakerId = u64;

/// Room-level speech activity notification.
///
/// Events are keyed by speaker id; frames for different speakers arrive on
/// separate subscriptions and never share a stream.
#[derive(Debug)]
pub enum TransportEvent {
    /// A participant began talking. `frames` is the per-speaker raw audio
    /// subscription: decoded PCM in the platform's native layout, delivered
    /// in capture order until the speaker goes quiet.
    SpeechStart {
        speaker: SpeakerId,
        frames: mpsc::Receiver<Vec<u8>>,
    },
    /// The platform detected end of speech for a participant: the silence
    /// period configured at connect time elapsed without audio.
    SpeechEnd { speaker: SpeakerId },
}

/// Connection factory for a voice platform.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Establish the transport connection for a room and register its
    /// speech-activity listener. `silence_threshold` configures the
    /// platform-side end-of-speech boundary for every subscription.
    async fn connect(
        &self,
        room: RoomId,
        channel: ChannelId,
        silence_threshold: Duration,
    ) -> Result<Box<dyn VoiceConnection>>;
}

/// One live room connection, exclusively owned by its session.
#[async_trait]
pub trait VoiceConnection: Send {
    /// Next speech activity event. Returns `None` once the connection is
    /// closed by the platform; no further events follow.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Release the connection and unregister the speech-activity listener.
    /// Called exactly once at session teardown.
    async fn disconnect(&mut self);
}

/// Scriptable in-memory transport for tests and offline development.
///
/// Each call to [`MockTransport::script`] queues one connection; the
/// returned handle drives its events. `connect` fails once the scripted
/// connections are exhausted.
#[derive(Default)]
pub struct MockTransport {
    pending: Mutex<VecDeque<MockConnection>>,
}

/// Test-side handle driving one scripted [`MockTransport`] connection.
pub struct MockConnectionHandle {
    events: mpsc::Sender<TransportEvent>,
    disconnected: Arc<AtomicBool>,
}

struct MockConnection {
    events: mpsc::Receiver<TransportEvent>,
    disconnected: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection for the next `connect` call and return the handle
    /// that drives it.
    pub fn script(&self) -> MockConnectionHandle {
        let (tx, rx) = mpsc::channel(crate::defaults::CHANNEL_CAPACITY);
        let disconnected = Arc::new(AtomicBool::new(false));
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.push_back(MockConnection {
            events: rx,
            disconnected: disconnected.clone(),
        });
        MockConnectionHandle {
            events: tx,
            disconnected,
        }
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn connect(
        &self,
        room: RoomId,
        _channel: ChannelId,
        _silence_threshold: Duration,
    ) -> Result<Box<dyn VoiceConnection>> {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending
            .pop_front()
            .map(|conn| Box::new(conn) as Box<dyn VoiceConnection>)
            .ok_or(RoomscribeError::Transport {
                message: format!("no scripted connection available for room {room}"),
            })
    }
}

#[async_trait]
impl VoiceConnection for MockConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn disconnect(&mut self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.events.close();
    }
}

impl MockConnectionHandle {
    /// Emit a speech-start event and return the sender feeding that
    /// speaker's raw frames. Returns `None` if the session is gone.
    pub async fn start_speaking(&self, speaker: SpeakerId) -> Option<mpsc::Sender<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(crate::defaults::CHANNEL_CAPACITY);
        self.events
            .send(TransportEvent::SpeechStart {
                speaker,
                frames: rx,
            })
            .await
            .ok()?;
        Some(tx)
    }

    /// Emit the platform end-of-speech signal for a speaker.
    pub async fn stop_speaking(&self, speaker: SpeakerId) -> bool {
        self.events
            .send(TransportEvent::SpeechEnd { speaker })
            .await
            .is_ok()
    }

    /// Simulate connection loss: the session sees the event stream end.
    pub fn close(self) {
        drop(self.events);
    }

    /// True once the session has released the connection.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_delivers_scripted_events() {
        let transport = MockTransport::new();
        let handle = transport.script();

        let mut conn = transport
            .connect(1, 2, Duration::from_millis(800))
            .await
            .unwrap();

        let frames_tx = handle.start_speaking(99).await.unwrap();
        frames_tx.send(vec![1, 2, 3]).await.unwrap();

        match conn.next_event().await {
            Some(TransportEvent::SpeechStart { speaker, mut frames }) => {
                assert_eq!(speaker, 99);
                assert_eq!(frames.recv().await, Some(vec![1, 2, 3]));
            }
            other => panic!("expected SpeechStart, got {:?}", other),
        }

        assert!(handle.stop_speaking(99).await);
        match conn.next_event().await {
            Some(TransportEvent::SpeechEnd { speaker }) => assert_eq!(speaker, 99),
            other => panic!("expected SpeechEnd, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_transport_connect_without_script_fails() {
        let transport = MockTransport::new();
        let result = transport.connect(1, 2, Duration::from_millis(800)).await;
        assert!(matches!(result, Err(RoomscribeError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_mock_connection_close_ends_event_stream() {
        let transport = MockTransport::new();
        let handle = transport.script();
        let mut conn = transport
            .connect(1, 2, Duration::from_millis(800))
            .await
            .unwrap();

        handle.close();
        assert!(conn.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_mock_connection_records_disconnect() {
        let transport = MockTransport::new();
        let handle = transport.script();
        let mut conn = transport
            .connect(1, 2, Duration::from_millis(800))
            .await
            .unwrap();

        assert!(!handle.is_disconnected());
        conn.disconnect().await;
        assert!(handle.is_disconnected());
    }

    #[tokio::test]
    async fn test_each_script_backs_exactly_one_connect() {
        let transport = MockTransport::new();
        let _first = transport.script();
        let _second = transport.script();

        assert!(
            transport
                .connect(1, 0, Duration::from_millis(800))
                .await
                .is_ok()
        );
        assert!(
            transport
                .connect(2, 0, Duration::from_millis(800))
                .await
                .is_ok()
        );
        assert!(
            transport
                .connect(3, 0, Duration::from_millis(800))
                .await
                .is_err()
        );
    }
}
