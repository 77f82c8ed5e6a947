use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::channel::SignalChannel;
use crate::codec::{self, SignalEncoding};
use crate::model::SignalMessage;
use crate::sound::{clip_for_key, Clip, SoundBoard};

/// When the sender hears its own key press.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackPolicy {
    /// After the channel confirms delivery.
    #[default]
    Acknowledged,
    /// Immediately, before the signal is sent, whatever happens to it.
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(Clip),
    Unbound,
    DeliveryFailed(Clip),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Played(Clip),
    /// Decoded, but the clip has no audio or the player failed.
    NotPlayed(Clip),
    Undecodable,
    Ignored,
}

/// Turns key presses into key signals and key signals into sound.
pub struct SignalRouter {
    channel: Arc<dyn SignalChannel>,
    sounds: Arc<SoundBoard>,
    feedback: FeedbackPolicy,
    encoding: SignalEncoding,
    user_name: String,
}

impl SignalRouter {
    pub fn new(
        channel: Arc<dyn SignalChannel>,
        sounds: Arc<SoundBoard>,
        user_name: impl Into<String>,
    ) -> Self {
        SignalRouter {
            channel,
            sounds,
            feedback: FeedbackPolicy::default(),
            encoding: SignalEncoding::default(),
            user_name: user_name.into(),
        }
    }

    pub fn with_feedback(mut self, feedback: FeedbackPolicy) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_encoding(mut self, encoding: SignalEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn feedback(&self) -> FeedbackPolicy {
        self.feedback
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Broadcast the clip bound to `key`. Failures are logged, not returned.
    pub async fn send(&self, key: &str) -> SendOutcome {
        let Some(clip) = clip_for_key(key) else {
            debug!("Key {:?} is not bound to a clip", key);
            return SendOutcome::Unbound;
        };

        if self.feedback == FeedbackPolicy::Optimistic {
            self.sounds.play(clip);
        }

        let data = codec::encode(self.encoding, clip, &self.user_name);
        match self.channel.send(SignalMessage::key_signal(data)).await {
            Ok(()) => {
                info!("Sent key-signal {} for key {:?}", clip, key);
                if self.feedback == FeedbackPolicy::Acknowledged {
                    self.sounds.play(clip);
                }
                SendOutcome::Sent(clip)
            }
            Err(e) if e.is_delivery_failure() => {
                warn!("Key-signal {} was not delivered: {}", clip, e);
                SendOutcome::DeliveryFailed(clip)
            }
            Err(e) => {
                error!("Error sending key-signal {}: {}", clip, e);
                SendOutcome::DeliveryFailed(clip)
            }
        }
    }

    /// Play the clip named by an inbound key signal. Never answers back.
    pub fn receive(&self, message: &SignalMessage) -> ReceiveOutcome {
        if !message.is_key_signal() {
            debug!("Ignoring signal of type {:?}", message.kind);
            return ReceiveOutcome::Ignored;
        }

        let from = message.from.as_deref().unwrap_or("unknown");
        let Some(decoded) = codec::decode(&message.data) else {
            warn!(
                "Key signal from {} names no known clip: {:?}",
                from, message.data
            );
            return ReceiveOutcome::Undecodable;
        };

        info!(
            "Received key-signal {} from {} ({})",
            decoded.clip,
            from,
            decoded.user_name.as_deref().unwrap_or("anonymous")
        );
        if self.sounds.play(decoded.clip) {
            ReceiveOutcome::Played(decoded.clip)
        } else {
            ReceiveOutcome::NotPlayed(decoded.clip)
        }
    }
}
