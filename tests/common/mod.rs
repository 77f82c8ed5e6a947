#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use drumcall::sound::{AudioHandle, ClipPlayer};
use drumcall::{
    Clip, ClientError, EventHub, SessionEvent, SignalChannel, SignalMessage, SoundBoard,
    SoundRegistry,
};
use parking_lot::Mutex;
use tokio::sync::broadcast::Receiver;

/// Ordered record of sends and plays, shared by the fakes below.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct MockChannel {
    pub journal: Journal,
    pub sent: Mutex<Vec<SignalMessage>>,
    pub fail: AtomicBool,
    pub closed: AtomicBool,
    pub hub: EventHub,
    pub id: Option<String>,
}

impl MockChannel {
    pub fn new(journal: Journal) -> Arc<Self> {
        Self::with_id(journal, None)
    }

    pub fn with_id(journal: Journal, id: Option<&str>) -> Arc<Self> {
        Arc::new(MockChannel {
            journal,
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            hub: EventHub::new(32),
            id: id.map(String::from),
        })
    }

    pub fn failing(self: &Arc<Self>) -> Arc<Self> {
        self.fail.store(true, Ordering::SeqCst);
        self.clone()
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SignalChannel for MockChannel {
    async fn send(&self, message: SignalMessage) -> drumcall::Result<()> {
        self.journal.lock().push(format!("send:{}", message.data));
        self.sent.lock().push(message);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::DeliveryRejected {
                reason: "recipient unreachable".into(),
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> Receiver<SessionEvent> {
        self.hub.subscribe()
    }

    fn connection_id(&self) -> Option<String> {
        self.id.clone()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.hub.publish(SessionEvent::Closed);
    }
}

#[derive(Clone)]
pub struct RecordingPlayer {
    pub journal: Journal,
}

impl ClipPlayer for RecordingPlayer {
    fn play(&self, handle: &AudioHandle) -> drumcall::Result<()> {
        self.journal.lock().push(format!("play:{}", handle.clip));
        Ok(())
    }
}

pub fn full_registry() -> SoundRegistry {
    let mut registry = SoundRegistry::new();
    for clip in Clip::ALL {
        registry.insert(AudioHandle::new(clip, clip.file_name(), vec![0u8; 8]));
    }
    registry
}

pub fn sound_board(journal: &Journal) -> Arc<SoundBoard> {
    Arc::new(SoundBoard::new(
        full_registry(),
        RecordingPlayer {
            journal: journal.clone(),
        },
    ))
}

pub fn plays(journal: &Journal) -> Vec<String> {
    journal
        .lock()
        .iter()
        .filter(|entry| entry.starts_with("play:"))
        .cloned()
        .collect()
}
