use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::{error::Result, CLIENT_SDP_OFFER, KEY_SIGNAL_TYPE};

/// A typed message exchanged between participants of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: String,
    /// Recipient connection ids. Empty means everyone in the session.
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl SignalMessage {
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        SignalMessage {
            kind: kind.into(),
            data: data.into(),
            to: Vec::new(),
            from: None,
        }
    }

    /// Broadcast key signal carrying an already encoded payload.
    pub fn key_signal(data: impl Into<String>) -> Self {
        Self::new(KEY_SIGNAL_TYPE, data)
    }

    pub fn is_key_signal(&self) -> bool {
        self.kind == KEY_SIGNAL_TYPE
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }
}

/// Frames spoken on the session relay WebSocket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RelayFrame {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: String },
    Signal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: String,
        #[serde(default)]
        to: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },
    SignalAck { id: u64 },
    SignalRejected {
        id: u64,
        #[serde(default)]
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        connection_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_data: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        connection_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Exception { code: String, message: String },
}

impl RelayFrame {
    /// Outbound signal frame tagged with the id the relay will ack.
    pub fn outbound(id: u64, message: &SignalMessage) -> Self {
        RelayFrame::Signal {
            id: Some(id),
            kind: message.kind.clone(),
            data: message.data.clone(),
            to: message.to.clone(),
            from: None,
        }
    }

    pub fn to_ws(&self) -> Result<Message> {
        Ok(Message::text(serde_json::to_string(self)?))
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// SDP envelope exchanged with the signaling endpoint for peer sessions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SdpOfferAnswer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl SdpOfferAnswer {
    pub fn new(offer: Option<String>, answer: Option<String>, client_id: Option<String>) -> Self {
        SdpOfferAnswer {
            flag: Some(CLIENT_SDP_OFFER.to_string()),
            offer,
            answer,
            client_id,
        }
    }

    pub fn to_ws(&self) -> Result<Message> {
        Ok(Message::text(serde_json::to_string(self)?))
    }
}
