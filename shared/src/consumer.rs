use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::{ClientContext, Message};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

use crate::inbox::{self, EventHandler};

/// Pause after a stream-level failure before polling again.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Decides which offsets may be committed.
///
/// Kafka offsets are cumulative per partition: committing a later message
/// acknowledges every earlier one. Once a message on a partition fails, no
/// further offset on that partition is committed until the partition is
/// reassigned, so the failed message is redelivered after a restart or
/// rebalance. Later messages are still processed; their redelivery is
/// absorbed by the inbox.
#[derive(Debug, Clone, Default)]
pub struct OffsetGate {
    stuck: Arc<Mutex<HashSet<i32>>>,
}

impl OffsetGate {
    /// Records the outcome for a message and returns whether its offset may
    /// be committed.
    pub fn settle(&self, partition: i32, handled: bool) -> bool {
        let mut stuck = self.stuck.lock().unwrap_or_else(PoisonError::into_inner);
        if !handled {
            stuck.insert(partition);
            return false;
        }
        !stuck.contains(&partition)
    }

    pub fn is_stuck(&self, partition: i32) -> bool {
        self.stuck
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&partition)
    }

    /// Forgets failures on `partitions`. Consumption restarts there from the
    /// last committed offset, so the failed message comes round again.
    pub fn release(&self, partitions: impl IntoIterator<Item = i32>) {
        let mut stuck = self.stuck.lock().unwrap_or_else(PoisonError::into_inner);
        for partition in partitions {
            if stuck.remove(&partition) {
                info!(partition, "partition reassigned, offset commits resumed");
            }
        }
    }
}

/// Consumer context that releases the [`OffsetGate`] for every partition
/// moved by a rebalance.
#[derive(Default)]
pub struct GateContext {
    gate: OffsetGate,
}

impl GateContext {
    pub fn gate(&self) -> &OffsetGate {
        &self.gate
    }
}

impl ClientContext for GateContext {}

impl ConsumerContext for GateContext {
    fn post_rebalance<'a>(&self, rebalance: &Rebalance<'a>) {
        match rebalance {
            Rebalance::Assign(partitions) | Rebalance::Revoke(partitions) => {
                self.gate
                    .release(partitions.elements().iter().map(|p| p.partition()));
            }
            Rebalance::Error(e) => warn!(error = %e, "rebalance failed"),
        }
    }
}

pub type GatedConsumer = StreamConsumer<GateContext>;

/// Consumes one topic through an [`EventHandler`], committing offsets by hand
/// only after the handler's transaction committed.
pub struct InboxConsumer<H> {
    consumer: GatedConsumer,
    topic: &'static str,
    handler: H,
}

impl<H: EventHandler> InboxConsumer<H> {
    pub fn new(consumer: GatedConsumer, topic: &'static str, handler: H) -> Self {
        Self {
            consumer,
            topic,
            handler,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        while let Err(e) = self.consumer.subscribe(&[self.topic]) {
            warn!(topic = self.topic, error = %e, "subscribe failed, retrying");
            time::sleep(RETRY_BACKOFF).await;
        }
        info!(topic = self.topic, "inbox consumer started");

        let gate = self.consumer.context().gate().clone();
        let mut message_stream = self.consumer.stream();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = message_stream.next() => match next {
                    Some(Ok(message)) => self.process(&message, &gate).await,
                    Some(Err(e)) => {
                        warn!(topic = self.topic, error = %e, "error receiving message, backing off");
                        time::sleep(RETRY_BACKOFF).await;
                    }
                    None => {
                        warn!(topic = self.topic, "message stream ended");
                        break;
                    }
                },
            }
        }

        info!(topic = self.topic, "inbox consumer stopped");
    }

    async fn process(&self, message: &BorrowedMessage<'_>, gate: &OffsetGate) {
        let partition = message.partition();
        let offset = message.offset();
        let payload = message.payload().unwrap_or_default();

        let handled = match inbox::dispatch(&self.handler, payload).await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    topic = self.topic,
                    partition,
                    offset,
                    error = %e,
                    "failed to handle message, leaving it unacknowledged"
                );
                false
            }
        };

        if !gate.settle(partition, handled) {
            if handled {
                warn!(
                    topic = self.topic,
                    partition, offset, "partition has an unacknowledged failure, not committing"
                );
            }
            return;
        }

        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            warn!(topic = self.topic, partition, offset, error = %e, "error committing offset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_while_partition_is_healthy() {
        let gate = OffsetGate::default();

        assert!(gate.settle(0, true));
        assert!(gate.settle(0, true));
        assert!(!gate.is_stuck(0));
    }

    #[test]
    fn failure_blocks_only_its_partition() {
        let gate = OffsetGate::default();

        assert!(!gate.settle(1, false));
        assert!(!gate.settle(1, true));
        assert!(gate.settle(2, true));
        assert!(gate.is_stuck(1));
        assert!(!gate.is_stuck(2));
    }

    #[test]
    fn reassignment_resumes_commits_for_redelivered_message() {
        let gate = OffsetGate::default();
        assert!(!gate.settle(1, false));
        assert!(!gate.settle(3, false));

        gate.release([1]);

        assert!(gate.settle(1, true));
        assert!(!gate.settle(3, true));
    }

    #[test]
    fn context_shares_its_gate() {
        let context = GateContext::default();
        let gate = context.gate().clone();
        assert!(!gate.settle(4, false));

        assert!(context.gate().is_stuck(4));
        context.gate().release([4]);
        assert!(gate.settle(4, true));
    }
}
