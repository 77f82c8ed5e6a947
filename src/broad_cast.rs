use tokio::sync::broadcast::{self, error::RecvError, Receiver, Sender};
use tracing::{debug, warn};

use crate::model::SignalMessage;

pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Something that happened on the session, as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected {
        connection_id: String,
    },
    Signal(SignalMessage),
    ParticipantJoined {
        connection_id: String,
        client_data: Option<String>,
    },
    ParticipantLeft {
        connection_id: String,
        reason: Option<String>,
    },
    /// Asynchronous error reported by the transport. Informational only.
    Exception {
        code: String,
        message: String,
    },
    Closed,
}

/// Fan-out of session events to every subscriber.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: Sender<SessionEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventHub { tx }
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        match self.tx.send(event) {
            Ok(n) => debug!("Session event delivered to {} subscribers", n),
            Err(e) => debug!("No subscribers for session event {:?}", e.0),
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

/// Next event for a subscriber. Skips over lag, `None` once the hub is gone.
pub async fn next_event(rx: &mut Receiver<SessionEvent>) -> Option<SessionEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Session event subscriber lagged, skipped {} events", skipped)
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let hub = EventHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(SessionEvent::Signal(SignalMessage::key_signal("snare")));
        hub.publish(SessionEvent::Closed);

        for rx in [&mut a, &mut b] {
            assert_eq!(
                next_event(rx).await,
                Some(SessionEvent::Signal(SignalMessage::key_signal("snare")))
            );
            assert_eq!(next_event(rx).await, Some(SessionEvent::Closed));
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_going() {
        let hub = EventHub::new(2);
        let mut rx = hub.subscribe();
        for i in 0..5 {
            hub.publish(SessionEvent::Exception {
                code: i.to_string(),
                message: String::new(),
            });
        }
        let Some(SessionEvent::Exception { code, .. }) = next_event(&mut rx).await else {
            panic!("expected an exception event");
        };
        assert_eq!(code, "3");
    }

    #[tokio::test]
    async fn dropped_hub_ends_subscription() {
        let hub = EventHub::new(2);
        let mut rx = hub.subscribe();
        drop(hub);
        assert_eq!(next_event(&mut rx).await, None);
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        EventHub::default().publish(SessionEvent::Closed);
    }
}
