//! Session relay transport: one WebSocket carrying JSON [`RelayFrame`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast::Receiver, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, info, warn};
use url::Url;

use crate::broad_cast::{EventHub, SessionEvent};
use crate::channel::SignalChannel;
use crate::error::{ClientError, Result};
use crate::model::{RelayFrame, SignalMessage};

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub ack_timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        RelayOptions {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Relay URL for joining `session_id` with `token`.
pub fn relay_url(base: &str, session_id: &str, token: &str, client_data: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(ClientError::Config(format!(
                "relay URL must be ws:// or wss://, got {other}://"
            )))
        }
    }
    url.query_pairs_mut()
        .append_pair("sessionId", session_id)
        .append_pair("token", token)
        .append_pair("clientData", client_data);
    Ok(url)
}

type PendingAcks = Mutex<HashMap<u64, oneshot::Sender<Result<()>>>>;

struct Shared {
    hub: EventHub,
    pending: PendingAcks,
    connection_id: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl Shared {
    fn handle_text(&self, text: &str) {
        let frame = match RelayFrame::from_text(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring malformed relay frame: {} ({})", text, e);
                return;
            }
        };

        match frame {
            RelayFrame::Connected { connection_id } => {
                info!("Connected to relay as {}", connection_id);
                *self.connection_id.lock() = Some(connection_id.clone());
                self.hub.publish(SessionEvent::Connected { connection_id });
            }
            RelayFrame::Signal {
                kind,
                data,
                to,
                from,
                ..
            } => {
                self.hub.publish(SessionEvent::Signal(SignalMessage {
                    kind,
                    data,
                    to,
                    from,
                }));
            }
            RelayFrame::SignalAck { id } => self.resolve(id, Ok(())),
            RelayFrame::SignalRejected { id, reason } => {
                self.resolve(id, Err(ClientError::DeliveryRejected { reason }))
            }
            RelayFrame::ParticipantJoined {
                connection_id,
                client_data,
            } => self.hub.publish(SessionEvent::ParticipantJoined {
                connection_id,
                client_data,
            }),
            RelayFrame::ParticipantLeft {
                connection_id,
                reason,
            } => self.hub.publish(SessionEvent::ParticipantLeft {
                connection_id,
                reason,
            }),
            RelayFrame::Exception { code, message } => {
                self.hub.publish(SessionEvent::Exception { code, message })
            }
        }
    }

    fn resolve(&self, id: u64, result: Result<()>) {
        match self.pending.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!("Relay answered unknown or expired signal {}", id),
        }
    }

    /// Fail everything in flight and announce the close, once.
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = std::mem::take(&mut *self.pending.lock());
        for (_, tx) in pending {
            let _ = tx.send(Err(ClientError::ChannelClosed));
        }
        self.hub.publish(SessionEvent::Closed);
    }
}

/// Drain queued frames into the socket. A failed write closes the channel so
/// sends waiting for an ack fail at once.
async fn write_frames<S>(
    mut sink: S,
    mut outgoing_rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(msg) = outgoing_rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            warn!("Relay write failed: {}", e);
            shared.shutdown();
            break;
        }
        if closing {
            break;
        }
    }
}

pub struct RelayChannel {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message>,
    next_id: AtomicU64,
    ack_timeout: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayChannel {
    /// Connect and publish everything the relay reports to `hub`.
    pub async fn connect(url: &Url, hub: EventHub, options: RelayOptions) -> Result<Self> {
        debug!("Connecting to relay {}", url.origin().ascii_serialization());
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (sink, mut stream) = ws_stream.split();

        let shared = Arc::new(Shared {
            hub,
            pending: Mutex::new(HashMap::new()),
            connection_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(write_frames(sink, outgoing_rx, shared.clone()));

        let reader_shared = shared.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => reader_shared.handle_text(text.as_str()),
                    Ok(Message::Close(frame)) => {
                        debug!("Relay closed the connection: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay read failed: {}", e);
                        break;
                    }
                }
            }
            reader_shared.shutdown();
        });

        Ok(RelayChannel {
            shared,
            outgoing,
            next_id: AtomicU64::new(1),
            ack_timeout: options.ack_timeout,
            tasks: Mutex::new(vec![writer, reader]),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalChannel for RelayChannel {
    async fn send(&self, message: SignalMessage) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::ChannelClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RelayFrame::outbound(id, &message).to_ws()?;
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        // The reader may have shut down between the check above and the insert.
        if self.is_closed() || self.outgoing.send(frame).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(ClientError::ChannelClosed);
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ChannelClosed),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(ClientError::DeliveryTimeout {
                    timeout_ms: self.ack_timeout.as_millis() as u64,
                })
            }
        }
    }

    fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.hub.subscribe()
    }

    fn connection_id(&self) -> Option<String> {
        self.shared.connection_id.lock().clone()
    }

    async fn close(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.outgoing.send(Message::Close(None));
        self.shared.shutdown();
        info!("Left relay session");
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_url_carries_session_and_token() {
        let url = relay_url(
            "ws://127.0.0.1:4443/session",
            "SessionA",
            "tok en&1",
            "Participant7",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:4443/session?sessionId=SessionA&token=tok+en%261&clientData=Participant7"
        );
    }

    #[test]
    fn relay_url_rejects_http() {
        assert!(matches!(
            relay_url("http://127.0.0.1/", "s", "t", "c"),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn frames_route_to_hub_and_acks() {
        let shared = Shared {
            hub: EventHub::new(8),
            pending: Mutex::new(HashMap::new()),
            connection_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        let mut events = shared.hub.subscribe();
        let (tx, mut rx) = oneshot::channel();
        shared.pending.lock().insert(4, tx);

        shared.handle_text(r#"{"event":"connected","connectionId":"con_a"}"#);
        shared.handle_text("garbage");
        shared.handle_text(r#"{"event":"signal","type":"key-signal","data":"drum_1","from":"con_b"}"#);
        shared.handle_text(r#"{"event":"signalRejected","id":4,"reason":"no such peer"}"#);

        assert_eq!(shared.connection_id.lock().as_deref(), Some("con_a"));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Connected {
                connection_id: "con_a".into()
            }
        );
        let SessionEvent::Signal(msg) = events.try_recv().unwrap() else {
            panic!("expected a signal");
        };
        assert_eq!(msg.data, "drum_1");
        assert_eq!(msg.from.as_deref(), Some("con_b"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(ClientError::DeliveryRejected { reason }) if reason == "no such peer"
        ));
    }

    #[tokio::test]
    async fn failed_write_fails_pending_sends() {
        let shared = Arc::new(Shared {
            hub: EventHub::new(8),
            pending: Mutex::new(HashMap::new()),
            connection_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let mut events = shared.hub.subscribe();
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().insert(1, tx);

        let broken = Box::pin(futures_util::sink::unfold((), |(), _msg: Message| async {
            Err::<(), WsError>(WsError::ConnectionClosed)
        }));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let frame = RelayFrame::outbound(1, &SignalMessage::key_signal("snare"))
            .to_ws()
            .unwrap();
        outgoing.send(frame).unwrap();

        tokio::time::timeout(
            Duration::from_secs(1),
            write_frames(broken, outgoing_rx, shared.clone()),
        )
        .await
        .unwrap();

        assert!(matches!(rx.await.unwrap(), Err(ClientError::ChannelClosed)));
        assert!(shared.closed.load(Ordering::SeqCst));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Closed);
    }

    #[test]
    fn shutdown_fails_pending_sends_once() {
        let shared = Shared {
            hub: EventHub::new(8),
            pending: Mutex::new(HashMap::new()),
            connection_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        let mut events = shared.hub.subscribe();
        let (tx, mut rx) = oneshot::channel();
        shared.pending.lock().insert(1, tx);

        shared.shutdown();
        shared.shutdown();

        assert!(matches!(rx.try_recv().unwrap(), Err(ClientError::ChannelClosed)));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Closed);
        assert!(events.try_recv().is_err());
    }
}
