use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::events::Event;

/// How a consumed event was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// First delivery: the inbox row and the business effect committed together.
    Applied,
    /// The message id was already in the inbox; nothing was reapplied.
    Duplicate,
}

/// Applies one event exactly once per message id.
///
/// Implementations must claim the inbox row (insert-if-absent on the message
/// id) and apply the effect inside one local transaction, reporting
/// `Duplicate` when the claim found an existing row. An `Err` means nothing
/// was committed and the message must not be acknowledged.
#[async_trait]
pub trait EventHandler: Send + Sync {
    type Event: Event;

    async fn handle(&self, event: Self::Event) -> Result<Delivery>;
}

/// Decodes a raw payload and hands it to `handler`.
pub async fn dispatch<H: EventHandler>(handler: &H, payload: &[u8]) -> Result<Delivery> {
    let event: H::Event = serde_json::from_slice(payload)?;
    let message_id = event.message_id();

    let delivery = handler.handle(event).await?;
    match delivery {
        Delivery::Applied => debug!(%message_id, "event applied"),
        Delivery::Duplicate => info!(%message_id, "redelivered event absorbed by inbox"),
    }
    Ok(delivery)
}
