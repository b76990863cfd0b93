mod api;
mod error;
mod handlers;
#[cfg(test)]
mod memory;
mod models;
mod saga;
mod schema;
mod service;
mod store;

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

use anyhow::Result;
use clap::Parser;
use shared::config::{KafkaArgs, StoreArgs};
use shared::consumer::InboxConsumer;
use shared::kafka::{self, KafkaSink};
use shared::pg::{self, PgOutbox};
use shared::{telemetry, topics, OutboxPublisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::handlers::PaymentResultHandler;
use crate::service::Orders;
use crate::store::PgOrderStore;

#[derive(Parser)]
#[command(name = "order-service")]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    kafka: KafkaArgs,

    #[arg(long, env = "CONSUMER_GROUP", default_value = "orders-service")]
    consumer_group: String,

    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let args = Args::parse();

    pg::run_migrations(&args.store.database_url, MIGRATIONS)?;
    let pool = pg::connect(&args.store.database_url).await?;
    let producer = kafka::producer(&args.kafka.kafka_brokers)?;
    let consumer = kafka::consumer(&args.kafka.kafka_brokers, &args.consumer_group)?;

    let store = PgOrderStore::new(pool.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let outbox_publisher = OutboxPublisher::new(
        PgOutbox::new(pool.clone(), store::OUTBOX_TABLE),
        KafkaSink::new(producer),
    )
    .with_interval(Duration::from_millis(args.kafka.outbox_poll_ms));
    let result_consumer = InboxConsumer::new(
        consumer,
        topics::PAYMENTS_RESULT,
        PaymentResultHandler::new(store.clone()),
    );

    let publisher_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { outbox_publisher.run(shutdown).await }
    });
    let consumer_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { result_consumer.run(shutdown).await }
    });

    let app = api::create_router(Arc::new(Orders::new(store)));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    info!("Order service listening on http://0.0.0.0:{}", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shutting down background loops");
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(publisher_task, consumer_task);

    Ok(())
}
