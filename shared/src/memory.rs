//! In-memory stand-ins for the outbox/inbox tables and the broker.
//!
//! Services embed `OutboxRows` and `InboxIds` in their own in-memory stores
//! so a whole "transaction" runs under one lock and commits by swapping the
//! state back in.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::error::{InfraError, Result};
use crate::outbox::{EventSink, OutboxEntry, OutboxMessage, OutboxSource};

#[derive(Debug, Clone, Default)]
pub struct OutboxRows {
    rows: Vec<OutboxMessage>,
    next_seq: i64,
}

impl OutboxRows {
    pub fn push(&mut self, entry: &OutboxEntry) {
        self.next_seq += 1;
        self.rows.push(OutboxMessage {
            seq: self.next_seq,
            message_id: entry.message_id,
            topic: entry.topic.clone(),
            key: entry.key.clone(),
            payload: entry.payload.clone(),
            published_at: None,
        });
    }

    pub fn next_unpublished(&self) -> Option<OutboxMessage> {
        self.rows
            .iter()
            .filter(|m| m.published_at.is_none())
            .min_by_key(|m| m.seq)
            .cloned()
    }

    pub fn mark_published(&mut self, message_id: Uuid) {
        if let Some(row) = self
            .rows
            .iter_mut()
            .find(|m| m.message_id == message_id && m.published_at.is_none())
        {
            row.published_at = Some(Utc::now());
        }
    }

    pub fn messages(&self) -> &[OutboxMessage] {
        &self.rows
    }
}

#[derive(Debug, Clone, Default)]
pub struct InboxIds {
    seen: HashSet<Uuid>,
}

impl InboxIds {
    /// Insert-if-absent. `true` means first delivery.
    pub fn claim(&mut self, message_id: Uuid) -> bool {
        self.seen.insert(message_id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A standalone outbox table.
#[derive(Clone, Default)]
pub struct MemoryOutbox {
    rows: Arc<Mutex<OutboxRows>>,
}

impl MemoryOutbox {
    pub fn enqueue(&self, entry: &OutboxEntry) {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn snapshot(&self) -> Vec<OutboxMessage> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .messages()
            .to_vec()
    }
}

#[async_trait]
impl OutboxSource for MemoryOutbox {
    async fn next_unpublished(&self) -> Result<Option<OutboxMessage>> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_unpublished())
    }

    async fn mark_published(&self, message_id: Uuid) -> Result<()> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark_published(message_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Broker double: records every accepted message and can be switched off to
/// simulate an outage.
#[derive(Clone)]
pub struct RecordingSink {
    published: Arc<Mutex<Vec<Published>>>,
    reachable: Arc<AtomicBool>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            published: Arc::default(),
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl RecordingSink {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(InfraError::StreamUnavailable("broker unreachable".to_owned()));
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Published {
                topic: topic.to_owned(),
                key: key.to_owned(),
                payload: payload.to_vec(),
            });
        Ok(())
    }
}
