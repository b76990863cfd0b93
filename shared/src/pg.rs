//! Postgres plumbing: the pool, embedded migrations, and the outbox/inbox
//! statements. Each service has its own outbox and inbox tables with the
//! same shape, so the statements take the table name.

use anyhow::anyhow;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{Jsonb, Text};
use diesel::PgConnection;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::{OutboxEntry, OutboxMessage, OutboxSource};

pub type DbPool = Pool<AsyncPgConnection>;

/// Upper bound for a synchronous request's store work.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(3);

pub fn run_migrations(database_url: &str, migrations: EmbeddedMigrations) -> anyhow::Result<()> {
    info!("Running database migrations...");
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(migrations)
        .map_err(|e| anyhow!("Migration error: {}", e))?;
    info!("Migrations completed successfully");
    Ok(())
}

pub async fn connect(database_url: &str) -> Result<DbPool> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_timeout(STORE_TIMEOUT)
        .build(config)
        .await?;
    Ok(pool)
}

/// Stages an outbox row on `conn`, which must be inside the transaction that
/// performs the business write.
pub async fn enqueue(conn: &mut AsyncPgConnection, table: &str, entry: &OutboxEntry) -> QueryResult<()> {
    diesel::sql_query(format!(
        "insert into {table} (message_id, topic, key, payload) values ($1, $2, $3, $4)"
    ))
    .bind::<diesel::sql_types::Uuid, _>(entry.message_id)
    .bind::<Text, _>(entry.topic.clone())
    .bind::<Text, _>(entry.key.clone())
    .bind::<Jsonb, _>(entry.payload.clone())
    .execute(conn)
    .await?;
    Ok(())
}

/// Insert-if-absent on the inbox. `true` means this is the first delivery of
/// `message_id`; `false` means the row already existed.
pub async fn claim(conn: &mut AsyncPgConnection, table: &str, message_id: Uuid) -> QueryResult<bool> {
    let inserted = diesel::sql_query(format!(
        "insert into {table} (message_id) values ($1) on conflict (message_id) do nothing"
    ))
    .bind::<diesel::sql_types::Uuid, _>(message_id)
    .execute(conn)
    .await?;
    Ok(inserted == 1)
}

#[derive(Clone)]
pub struct PgOutbox {
    pool: DbPool,
    table: &'static str,
}

impl PgOutbox {
    pub fn new(pool: DbPool, table: &'static str) -> Self {
        Self { pool, table }
    }
}

#[async_trait]
impl OutboxSource for PgOutbox {
    async fn next_unpublished(&self) -> Result<Option<OutboxMessage>> {
        let mut conn = self.pool.get().await?;

        let message = diesel::sql_query(format!(
            "select seq, message_id, topic, key, payload, published_at from {} \
             where published_at is null order by seq limit 1",
            self.table
        ))
        .get_result::<OutboxMessage>(&mut conn)
        .await
        .optional()?;

        Ok(message)
    }

    async fn mark_published(&self, message_id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::sql_query(format!(
            "update {} set published_at = now() where message_id = $1 and published_at is null",
            self.table
        ))
        .bind::<diesel::sql_types::Uuid, _>(message_id)
        .execute(&mut conn)
        .await?;

        Ok(())
    }
}
