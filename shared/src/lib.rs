//! Building blocks shared by the orders and payments services: the event
//! contracts exchanged over Kafka, the transactional outbox and the
//! deduplicating inbox, plus the Postgres/Kafka plumbing they run on.

pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod inbox;
pub mod kafka;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod outbox;
pub mod pg;
pub mod telemetry;

pub use error::{InfraError, Result};
pub use events::*;
pub use inbox::{Delivery, EventHandler};
pub use outbox::{EventSink, OutboxEntry, OutboxMessage, OutboxPublisher, OutboxSource};
