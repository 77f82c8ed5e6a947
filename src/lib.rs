pub mod broad_cast;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod keyboard;
pub mod logging;
pub mod model;
#[cfg(feature = "playback")]
pub mod playback;
pub mod relay;
pub mod router;
pub mod sdp;
pub mod session;
pub mod sound;
pub mod token;

pub const CLIENT_SDP_OFFER: &str = "client_sdp_offer";
/// Signal type carrying a drum hit.
pub const KEY_SIGNAL_TYPE: &str = "key-signal";

pub use broad_cast::{EventHub, SessionEvent};
pub use channel::SignalChannel;
pub use codec::SignalEncoding;
pub use config::{ClientConfig, Transport};
pub use error::{ClientError, Result};
pub use model::SignalMessage;
pub use router::{FeedbackPolicy, ReceiveOutcome, SendOutcome, SignalRouter};
pub use session::{ActiveSession, Participant, Session};
pub use sound::{Clip, ClipPlayer, SoundBoard, SoundRegistry};
