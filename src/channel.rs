use async_trait::async_trait;
use tokio::sync::broadcast::Receiver;

use crate::broad_cast::SessionEvent;
use crate::error::Result;
use crate::model::SignalMessage;

/// An established session channel.
///
/// Delivery is reliable and ordered. `send` resolves once the transport
/// has confirmed the message, or fails if it could not be delivered.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    async fn send(&self, message: SignalMessage) -> Result<()>;

    fn subscribe(&self) -> Receiver<SessionEvent>;

    /// Our own connection id, once the transport has assigned one.
    fn connection_id(&self) -> Option<String>;

    async fn close(&self);
}
