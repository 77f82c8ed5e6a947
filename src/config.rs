use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::codec::SignalEncoding;
use crate::error::{ClientError, Result};
use crate::relay::RelayOptions;
use crate::router::FeedbackPolicy;
use crate::sdp::PeerOptions;

pub const DEFAULT_APPLICATION_SERVER_URL: &str = "http://localhost:5000/";
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:4443/session";
pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8080";
pub const DEFAULT_SESSION_ID: &str = "SessionA";
pub const DEFAULT_ASSET_DIR: &str = "drum";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// WebSocket session relay, joined with a token from the application server.
    #[default]
    Relay,
    /// Direct WebRTC data channel, negotiated through the signaling endpoint.
    Peer,
}

pub fn random_user_name() -> String {
    format!("Participant{}", rand::thread_rng().gen_range(0..100))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub application_server_url: String,
    pub relay_url: String,
    pub signaling_url: String,
    pub session_id: String,
    pub user_name: String,
    pub asset_dir: PathBuf,
    pub transport: Transport,
    pub feedback: FeedbackPolicy,
    pub encoding: SignalEncoding,
    pub ack_timeout_ms: u64,
    pub open_timeout_ms: u64,
    pub event_buffer: usize,
    pub ice_servers: Vec<String>,
    /// Play through the audio device instead of only logging playback.
    pub audio_output: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            application_server_url: DEFAULT_APPLICATION_SERVER_URL.to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            user_name: random_user_name(),
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            transport: Transport::default(),
            feedback: FeedbackPolicy::default(),
            encoding: SignalEncoding::default(),
            ack_timeout_ms: 5_000,
            open_timeout_ms: 10_000,
            event_buffer: crate::broad_cast::DEFAULT_EVENT_BUFFER,
            ice_servers: Vec::new(),
            audio_output: false,
        }
    }
}

impl ClientConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(ClientError::Config("session_id must not be empty".into()));
        }
        if self.user_name.trim().is_empty() {
            return Err(ClientError::Config("user_name must not be empty".into()));
        }
        if self.ack_timeout_ms == 0 {
            return Err(ClientError::Config("ack_timeout_ms must be positive".into()));
        }
        if self.event_buffer == 0 {
            return Err(ClientError::Config("event_buffer must be positive".into()));
        }
        Ok(())
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
        }
    }

    pub fn peer_options(&self) -> PeerOptions {
        PeerOptions {
            ice_servers: self.ice_servers.clone(),
            open_timeout: Duration::from_millis(self.open_timeout_ms),
        }
    }
}
