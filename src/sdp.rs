//! Peer transport: key signals over a WebRTC data channel.
//!
//! The offer/answer pair travels as an [`SdpOfferAnswer`] envelope, either
//! through a WebSocket signaling endpoint ([`PeerChannel::offer`]) or handed
//! over by the caller ([`PeerChannel::create_offer`] / [`PeerChannel::answer`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast::Receiver, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::broad_cast::{EventHub, SessionEvent};
use crate::channel::SignalChannel;
use crate::error::{ClientError, Result};
use crate::model::{SdpOfferAnswer, SignalMessage};
use crate::KEY_SIGNAL_TYPE;

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const UNKNOWN_PEER: &str = "peer";

#[derive(Debug, Clone)]
pub struct PeerOptions {
    pub ice_servers: Vec<String>,
    pub open_timeout: Duration,
}

impl Default for PeerOptions {
    fn default() -> Self {
        PeerOptions {
            ice_servers: Vec::new(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

/// Connection id for one peer channel: the display name plus a random
/// suffix, so two participants sharing a name never look like each other.
pub fn peer_connection_id(user_name: &str) -> String {
    format!("{}-{:08x}", user_name, rand::random::<u32>())
}

async fn new_peer_connection(ice_servers: &[String]) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = Registry::new();
    let config = RTCConfiguration {
        ice_servers: if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        },
        ..Default::default()
    };

    let peer_connection = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build()
        .new_peer_connection(config)
        .await?;
    Ok(Arc::new(peer_connection))
}

/// Set the local description and wait for ICE gathering, so the returned
/// SDP carries every candidate.
async fn gather_local_description(
    peer_connection: &RTCPeerConnection,
    description: RTCSessionDescription,
) -> Result<String> {
    let mut gather_complete = peer_connection.gathering_complete_promise().await;
    peer_connection.set_local_description(description).await?;
    let _ = gather_complete.recv().await;

    let local = peer_connection
        .local_description()
        .await
        .ok_or_else(|| ClientError::Signaling("no local description after gathering".into()))?;
    Ok(serde_json::to_string(&local)?)
}

/// Send an offer envelope to the signaling endpoint and wait for its answer.
pub async fn exchange_sdp(signaling_url: &str, offer: &SdpOfferAnswer) -> Result<SdpOfferAnswer> {
    let (mut ws_stream, _) = connect_async(signaling_url).await?;
    ws_stream.send(offer.to_ws()?).await?;

    while let Some(msg) = ws_stream.next().await {
        match msg? {
            Message::Text(text) => match serde_json::from_str::<SdpOfferAnswer>(text.as_str()) {
                Ok(envelope) if envelope.answer.is_some() => {
                    let _ = ws_stream.close(None).await;
                    return Ok(envelope);
                }
                Ok(_) => debug!("Ignoring signaling message without an answer"),
                Err(e) => warn!("Ignoring malformed signaling message: {}", e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    Err(ClientError::Signaling(
        "signaling server closed before sending an SDP answer".into(),
    ))
}

struct PeerShared {
    hub: EventHub,
    data_channel: Mutex<Option<Arc<RTCDataChannel>>>,
    remote_id: Mutex<String>,
    open_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl PeerShared {
    fn remote_id(&self) -> String {
        self.remote_id.lock().clone()
    }

    fn attach(self: &Arc<Self>, data_channel: Arc<RTCDataChannel>) {
        if data_channel.label() != KEY_SIGNAL_TYPE {
            debug!("Ignoring data channel '{}'", data_channel.label());
            return;
        }

        let shared = self.clone();
        data_channel.on_open(Box::new(move || {
            Box::pin(async move {
                let remote = shared.remote_id();
                info!("Data channel to {} is open", remote);
                let _ = shared.open_tx.send(true);
                shared.hub.publish(SessionEvent::ParticipantJoined {
                    connection_id: remote,
                    client_data: None,
                });
            })
        }));

        let shared = self.clone();
        data_channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let shared = shared.clone();
            Box::pin(async move {
                match serde_json::from_slice::<SignalMessage>(&msg.data) {
                    Ok(mut signal) => {
                        signal.from = Some(shared.remote_id());
                        shared.hub.publish(SessionEvent::Signal(signal));
                    }
                    Err(e) => warn!("Ignoring malformed data channel message: {}", e),
                }
            })
        }));

        let shared = self.clone();
        data_channel.on_close(Box::new(move || {
            let shared = shared.clone();
            Box::pin(async move {
                debug!("Data channel closed");
                shared.shutdown();
            })
        }));

        *self.data_channel.lock() = Some(data_channel);
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let was_open = self.open_tx.send_replace(false);
        if was_open {
            self.hub.publish(SessionEvent::ParticipantLeft {
                connection_id: self.remote_id(),
                reason: None,
            });
        }
        self.hub.publish(SessionEvent::Closed);
    }
}

pub struct PeerChannel {
    peer_connection: Arc<RTCPeerConnection>,
    shared: Arc<PeerShared>,
    open_rx: watch::Receiver<bool>,
    local_id: String,
    open_timeout: Duration,
}

impl PeerChannel {
    async fn new(user_name: &str, hub: EventHub, options: &PeerOptions) -> Result<Self> {
        let peer_connection = new_peer_connection(&options.ice_servers).await?;
        let (open_tx, open_rx) = watch::channel(false);
        let shared = Arc::new(PeerShared {
            hub,
            data_channel: Mutex::new(None),
            remote_id: Mutex::new(UNKNOWN_PEER.to_string()),
            open_tx,
            closed: AtomicBool::new(false),
        });

        let state_shared = shared.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let shared = state_shared.clone();
                Box::pin(async move {
                    debug!("Peer connection state: {}", state);
                    if matches!(
                        state,
                        RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                    ) {
                        shared.shutdown();
                    }
                })
            },
        ));

        Ok(PeerChannel {
            peer_connection,
            shared,
            open_rx,
            local_id: peer_connection_id(user_name),
            open_timeout: options.open_timeout,
        })
    }

    /// Offerer side, with the answer supplied later through [`accept_answer`].
    ///
    /// [`accept_answer`]: PeerChannel::accept_answer
    pub async fn create_offer(
        user_name: &str,
        hub: EventHub,
        options: &PeerOptions,
    ) -> Result<(Self, SdpOfferAnswer)> {
        let channel = PeerChannel::new(user_name, hub, options).await?;
        let data_channel = channel
            .peer_connection
            .create_data_channel(KEY_SIGNAL_TYPE, None)
            .await?;
        channel.shared.attach(data_channel);

        let offer = channel.peer_connection.create_offer(None).await?;
        let offer = gather_local_description(&channel.peer_connection, offer).await?;
        let envelope = SdpOfferAnswer::new(Some(offer), None, Some(channel.local_id.clone()));
        Ok((channel, envelope))
    }

    pub async fn accept_answer(&self, answer: &SdpOfferAnswer) -> Result<()> {
        let sdp = answer
            .answer
            .as_deref()
            .ok_or_else(|| ClientError::Signaling("envelope carries no answer".into()))?;
        let description: RTCSessionDescription = serde_json::from_str(sdp)?;
        if let Some(remote) = &answer.client_id {
            *self.shared.remote_id.lock() = remote.clone();
        }
        self.peer_connection
            .set_remote_description(description)
            .await?;
        Ok(())
    }

    /// Offer through the signaling endpoint and wait until the data channel opens.
    pub async fn offer(
        signaling_url: &str,
        user_name: &str,
        hub: EventHub,
        options: &PeerOptions,
    ) -> Result<Self> {
        let (channel, offer) = PeerChannel::create_offer(user_name, hub, options).await?;
        let answer = exchange_sdp(signaling_url, &offer).await?;
        channel.accept_answer(&answer).await?;
        channel.wait_open().await?;
        Ok(channel)
    }

    /// Answerer side. The data channel arrives once the offerer connects.
    pub async fn answer(
        offer: &SdpOfferAnswer,
        user_name: &str,
        hub: EventHub,
        options: &PeerOptions,
    ) -> Result<(Self, SdpOfferAnswer)> {
        let sdp = offer
            .offer
            .as_deref()
            .ok_or_else(|| ClientError::Signaling("envelope carries no offer".into()))?;
        let description: RTCSessionDescription = serde_json::from_str(sdp)?;

        let channel = PeerChannel::new(user_name, hub, options).await?;
        if let Some(remote) = &offer.client_id {
            *channel.shared.remote_id.lock() = remote.clone();
        }

        let shared = channel.shared.clone();
        channel
            .peer_connection
            .on_data_channel(Box::new(move |data_channel: Arc<RTCDataChannel>| {
                let shared = shared.clone();
                Box::pin(async move {
                    shared.attach(data_channel);
                })
            }));

        channel
            .peer_connection
            .set_remote_description(description)
            .await?;
        let answer = channel.peer_connection.create_answer(None).await?;
        let answer = gather_local_description(&channel.peer_connection, answer).await?;
        let envelope = SdpOfferAnswer::new(None, Some(answer), Some(channel.local_id.clone()));
        Ok((channel, envelope))
    }

    pub async fn wait_open(&self) -> Result<()> {
        let mut open_rx = self.open_rx.clone();
        let opened = tokio::time::timeout(self.open_timeout, open_rx.wait_for(|open| *open))
            .await
            .map(|waited| waited.map(|_| ()));
        match opened {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ClientError::ChannelClosed),
            Err(_) => Err(ClientError::Signaling(format!(
                "data channel did not open within {} ms",
                self.open_timeout.as_millis()
            ))),
        }
    }

    pub fn remote_id(&self) -> String {
        self.shared.remote_id()
    }

    fn open_data_channel(&self) -> Option<Arc<RTCDataChannel>> {
        self.shared
            .data_channel
            .lock()
            .clone()
            .filter(|dc| dc.ready_state() == RTCDataChannelState::Open)
    }
}

#[async_trait]
impl SignalChannel for PeerChannel {
    async fn send(&self, message: SignalMessage) -> Result<()> {
        let data_channel = self.open_data_channel().ok_or(ClientError::ChannelClosed)?;
        let text = serde_json::to_string(&message)?;
        data_channel
            .send_text(text)
            .await
            .map_err(|e| ClientError::DeliveryRejected {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.hub.subscribe()
    }

    fn connection_id(&self) -> Option<String> {
        Some(self.local_id.clone())
    }

    async fn close(&self) {
        let data_channel = self.shared.data_channel.lock().take();
        if let Some(dc) = data_channel {
            if let Err(e) = dc.close().await {
                warn!("Closing data channel failed: {}", e);
            }
        }
        if let Err(e) = self.peer_connection.close().await {
            warn!("Closing peer connection failed: {}", e);
        }
        self.shared.shutdown();
    }
}

impl Drop for PeerChannel {
    fn drop(&mut self) {
        // The data channel handlers hold the shared state, break that cycle.
        let data_channel = self.shared.data_channel.lock().take();
        if self.shared.closed.load(Ordering::SeqCst) && data_channel.is_none() {
            return;
        }
        let peer_connection = self.peer_connection.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Some(dc) = data_channel {
                    let _ = dc.close().await;
                }
                let _ = peer_connection.close().await;
            });
        }
    }
}
