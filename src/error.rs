use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Application server returned {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Signaling failed: {0}")]
    Signaling(String),

    #[error("Signal delivery rejected: {reason}")]
    DeliveryRejected { reason: String },

    #[error("Signal delivery not acknowledged within {timeout_ms} ms")]
    DeliveryTimeout { timeout_ms: u64 },

    #[error("Signal channel is closed")]
    ChannelClosed,

    #[error("No sound clip registered for '{0}'")]
    UnknownClip(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

impl ClientError {
    /// Failures of a single outbound signal, as opposed to setup failures.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            ClientError::DeliveryRejected { .. }
                | ClientError::DeliveryTimeout { .. }
                | ClientError::ChannelClosed
        )
    }
}
