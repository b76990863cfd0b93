use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::sql_types::{BigInt, Jsonb, Nullable, Text, Timestamptz};
use diesel::QueryableByName;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::events::Event;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// A row of a service's outbox table.
#[derive(Debug, Clone, PartialEq, QueryableByName)]
pub struct OutboxMessage {
    #[diesel(sql_type = BigInt)]
    pub seq: i64,
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub message_id: Uuid,
    #[diesel(sql_type = Text)]
    pub topic: String,
    #[diesel(sql_type = Text)]
    pub key: String,
    #[diesel(sql_type = Jsonb)]
    pub payload: serde_json::Value,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub published_at: Option<DateTime<Utc>>,
}

/// An event staged for the outbox, written in the same transaction as the
/// state change that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub message_id: Uuid,
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
}

impl OutboxEntry {
    pub fn for_event<E: Event>(event: &E) -> Result<Self> {
        Ok(Self {
            message_id: event.message_id(),
            topic: E::TOPIC.to_owned(),
            key: event.key(),
            payload: serde_json::to_value(event)?,
        })
    }
}

/// Read side of an outbox table, as seen by the publisher.
#[async_trait]
pub trait OutboxSource: Send + Sync {
    /// The oldest row whose `published_at` is still null.
    async fn next_unpublished(&self) -> Result<Option<OutboxMessage>>;

    async fn mark_published(&self, message_id: Uuid) -> Result<()>;
}

/// Where published events go. Implemented over Kafka in production.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()>;
}

/// Drains an outbox one message per tick, oldest first.
///
/// A row is marked published only after the sink accepted it. Any failure
/// leaves the row in place for the next tick, so delivery is at-least-once:
/// a crash between hand-off and marking re-sends the row, which the
/// receiving inbox absorbs.
pub struct OutboxPublisher<S, K> {
    source: S,
    sink: K,
    interval: Duration,
}

impl<S: OutboxSource, K: EventSink> OutboxPublisher<S, K> {
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "outbox publisher started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "outbox tick failed, retrying next tick");
                    }
                }
            }
        }

        info!("outbox publisher stopped");
    }

    /// Publishes at most one message. Returns its id, or `None` when the
    /// outbox is drained.
    pub async fn tick(&self) -> Result<Option<Uuid>> {
        let Some(message) = self.source.next_unpublished().await? else {
            return Ok(None);
        };

        let payload = serde_json::to_vec(&message.payload)?;
        self.sink
            .publish(&message.topic, &message.key, &payload)
            .await?;
        self.source.mark_published(message.message_id).await?;

        debug!(
            message_id = %message.message_id,
            topic = %message.topic,
            key = %message.key,
            "published outbox message"
        );
        Ok(Some(message.message_id))
    }
}
