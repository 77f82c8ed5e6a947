//! Joining and leaving a session.
//!
//! An [`ActiveSession`] owns everything that exists only while the user is in
//! a session: the channel, the task dispatching inbound events and the
//! keyboard listener. Leaving, or dropping the session on any other exit
//! path, detaches the listener so no further key signals go out.

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::broadcast::Receiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broad_cast::{next_event, EventHub, SessionEvent};
use crate::channel::SignalChannel;
use crate::config::{ClientConfig, Transport};
use crate::error::Result;
use crate::keyboard::{KeySource, KeyboardListener};
use crate::relay::{relay_url, RelayChannel};
use crate::router::SignalRouter;
use crate::sdp::PeerChannel;
use crate::sound::SoundBoard;
use crate::token::TokenClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: String,
    pub client_data: Option<String>,
}

/// Remote participants in join order.
#[derive(Debug, Default)]
pub struct Roster {
    participants: IndexMap<String, Participant>,
}

impl Roster {
    pub fn insert(&mut self, participant: Participant) {
        self.participants
            .insert(participant.connection_id.clone(), participant);
    }

    pub fn remove(&mut self, connection_id: &str) -> Option<Participant> {
        self.participants.shift_remove(connection_id)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.participants.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }
}

pub struct Session;

impl Session {
    /// Connect with the configured transport and start routing.
    ///
    /// Any failure aborts the join: nothing is left attached.
    pub async fn join(
        config: &ClientConfig,
        sounds: Arc<SoundBoard>,
        keys: KeySource,
    ) -> Result<ActiveSession> {
        config.validate()?;
        let hub = EventHub::new(config.event_buffer);
        let events = hub.subscribe();

        let (session_id, channel): (String, Arc<dyn SignalChannel>) = match config.transport {
            Transport::Relay => {
                let tokens = TokenClient::new(&config.application_server_url)?;
                let (session_id, token) = tokens.get_token(&config.session_id).await?;
                let url = relay_url(&config.relay_url, &session_id, &token, &config.user_name)?;
                let channel = RelayChannel::connect(&url, hub, config.relay_options()).await?;
                (session_id, Arc::new(channel) as Arc<dyn SignalChannel>)
            }
            Transport::Peer => {
                let channel = PeerChannel::offer(
                    &config.signaling_url,
                    &config.user_name,
                    hub,
                    &config.peer_options(),
                )
                .await?;
                (config.session_id.clone(), Arc::new(channel) as Arc<dyn SignalChannel>)
            }
        };

        let router = SignalRouter::new(channel.clone(), sounds, config.user_name.clone())
            .with_feedback(config.feedback)
            .with_encoding(config.encoding);
        info!("Joined session {} as {}", session_id, config.user_name);
        Ok(ActiveSession::start(
            session_id,
            channel,
            events,
            Arc::new(router),
            keys,
        ))
    }
}

pub struct ActiveSession {
    session_id: String,
    channel: Arc<dyn SignalChannel>,
    router: Arc<SignalRouter>,
    roster: Arc<RwLock<Roster>>,
    listener: Option<KeyboardListener>,
    dispatcher: JoinHandle<()>,
    closed_rx: watch::Receiver<bool>,
}

impl ActiveSession {
    /// Start dispatching `events` (which must come from `channel`) and
    /// attach the keyboard listener.
    pub fn start(
        session_id: String,
        channel: Arc<dyn SignalChannel>,
        events: Receiver<SessionEvent>,
        router: Arc<SignalRouter>,
        keys: KeySource,
    ) -> Self {
        let roster = Arc::new(RwLock::new(Roster::default()));
        let (closed_tx, closed_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch(
            events,
            channel.clone(),
            router.clone(),
            roster.clone(),
            closed_tx,
        ));
        let listener = KeyboardListener::attach(router.clone(), keys);

        ActiveSession {
            session_id,
            channel,
            router,
            roster,
            listener: Some(listener),
            dispatcher,
            closed_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn router(&self) -> &Arc<SignalRouter> {
        &self.router
    }

    pub fn connection_id(&self) -> Option<String> {
        self.channel.connection_id()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.roster.read().to_vec()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| l.is_attached())
    }

    /// Resolves when the channel has closed underneath the session.
    pub fn closed(&self) -> impl Future<Output = ()> + 'static {
        let mut closed_rx = self.closed_rx.clone();
        async move {
            let _ = closed_rx.wait_for(|closed| *closed).await.map(|_| ());
        }
    }

    /// Resolves when the key source runs dry (e.g. stdin reached EOF).
    pub async fn keys_exhausted(&mut self) {
        match self.listener.as_mut() {
            Some(listener) => listener.wait().await,
            None => std::future::pending().await,
        }
    }

    pub async fn leave(mut self) {
        self.listener.take();
        self.channel.close().await;
        self.dispatcher.abort();
        info!("Left session {}", self.session_id);
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if self.listener.take().is_some() {
            debug!("Session {} dropped without leaving", self.session_id);
        }
        self.dispatcher.abort();
    }
}

async fn dispatch(
    mut events: Receiver<SessionEvent>,
    channel: Arc<dyn SignalChannel>,
    router: Arc<SignalRouter>,
    roster: Arc<RwLock<Roster>>,
    closed_tx: watch::Sender<bool>,
) {
    while let Some(event) = next_event(&mut events).await {
        match event {
            SessionEvent::Signal(message) => {
                let own_id = channel.connection_id();
                if message.from.is_some() && message.from == own_id {
                    debug!("Ignoring echo of our own {} signal", message.kind);
                    continue;
                }
                router.receive(&message);
            }
            SessionEvent::Connected { connection_id } => {
                roster.write().remove(&connection_id);
            }
            SessionEvent::ParticipantJoined {
                connection_id,
                client_data,
            } => {
                if channel.connection_id().as_deref() == Some(connection_id.as_str()) {
                    continue;
                }
                info!(
                    "Participant {} joined ({})",
                    connection_id,
                    client_data.as_deref().unwrap_or("no client data")
                );
                roster.write().insert(Participant {
                    connection_id,
                    client_data,
                });
            }
            SessionEvent::ParticipantLeft {
                connection_id,
                reason,
            } => {
                if roster.write().remove(&connection_id).is_some() {
                    info!(
                        "Participant {} left ({})",
                        connection_id,
                        reason.as_deref().unwrap_or("no reason given")
                    );
                }
            }
            SessionEvent::Exception { code, message } => {
                warn!("Session exception: {} - {}", code, message);
            }
            SessionEvent::Closed => break,
        }
    }
    debug!("Session event dispatcher stopped");
    let _ = closed_tx.send(true);
}
