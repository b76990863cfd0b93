use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::info;

use crate::consumer::{GateContext, GatedConsumer};
use crate::error::Result;
use crate::outbox::EventSink;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub fn producer(brokers: &str) -> Result<FutureProducer> {
    let producer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "5000")
        .set("acks", "all")
        .create()?;

    info!(brokers, "kafka producer created");
    Ok(producer)
}

/// A consumer that never commits on its own: offsets are committed by the
/// inbox consumer after each local transaction, through the gate carried in
/// the consumer context.
pub fn consumer(brokers: &str, group_id: &str) -> Result<GatedConsumer> {
    let consumer = ClientConfig::new()
        .set("group.id", group_id)
        .set("bootstrap.servers", brokers)
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create_with_context(GateContext::default())?;

    info!(brokers, group_id, "kafka consumer created");
    Ok(consumer)
}

#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer,
}

impl KafkaSink {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl EventSink for KafkaSink {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).payload(payload).key(key);

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| e)?;

        Ok(())
    }
}
