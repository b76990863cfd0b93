use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::pg::{self, DbPool, STORE_TIMEOUT};
use shared::{InfraError, OutboxEntry, Result};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::ledger::{self, Credit, LedgerTx, PayOutcome};
use crate::models::*;
use crate::schema::*;

pub const OUTBOX_TABLE: &str = "payments_outbox";
pub const INBOX_TABLE: &str = "payments_inbox";

/// Two concurrent payments for one order race on the payments primary key.
/// The loser is replayed once and then finds the winner's row.
const MAX_ATTEMPTS: u32 = 2;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates the account with a zero balance unless it exists, then
    /// returns its balance.
    async fn create_account(&self, user_id: &str) -> Result<i64>;

    async fn top_up(&self, user_id: &str, amount: i64) -> Result<Credit>;

    async fn balance(&self, user_id: &str) -> Result<Option<i64>>;

    async fn pay(&self, request: &PaymentRequest) -> Result<PayOutcome>;

    /// `pay` behind an inbox claim on `message_id`; `None` for a redelivery.
    async fn pay_once(&self, message_id: Uuid, request: &PaymentRequest) -> Result<Option<PayOutcome>>;
}

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn create_account(&self, user_id: &str) -> Result<i64> {
        let mut conn = self.pool.get().await?;

        timeout(
            STORE_TIMEOUT,
            diesel::insert_into(accounts::table)
                .values((accounts::user_id.eq(user_id), accounts::balance.eq(0_i64)))
                .on_conflict_do_nothing()
                .execute(&mut conn),
        )
        .await??;

        let balance = timeout(
            STORE_TIMEOUT,
            accounts::table
                .find(user_id)
                .select(accounts::balance)
                .first::<i64>(&mut conn),
        )
        .await??;
        Ok(balance)
    }

    async fn top_up(&self, user_id: &str, amount: i64) -> Result<Credit> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        let user_id = user_id.to_owned();

        let work = conn.transaction::<_, InfraError, _>(|conn| {
            Box::pin(async move { ledger::top_up_in_tx(conn, &user_id, amount).await })
        });
        timeout(STORE_TIMEOUT, work).await?
    }

    async fn balance(&self, user_id: &str) -> Result<Option<i64>> {
        let mut conn = self.pool.get().await?;

        let balance = timeout(
            STORE_TIMEOUT,
            accounts::table
                .find(user_id)
                .select(accounts::balance)
                .first::<i64>(&mut conn),
        )
        .await?
        .optional()?;
        Ok(balance)
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PayOutcome> {
        let mut attempt = 1;
        loop {
            let mut conn = self.pool.get().await?;
            let conn: &mut AsyncPgConnection = &mut conn;
            let request = request.clone();

            let work = conn.transaction::<_, InfraError, _>(|conn| {
                Box::pin(async move { ledger::pay_in_tx(conn, &request).await })
            });
            match timeout(STORE_TIMEOUT, work).await? {
                Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                    debug!(error = %e, attempt, "replaying payment transaction");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn pay_once(&self, message_id: Uuid, request: &PaymentRequest) -> Result<Option<PayOutcome>> {
        let mut attempt = 1;
        loop {
            let mut conn = self.pool.get().await?;
            let conn: &mut AsyncPgConnection = &mut conn;
            let request = request.clone();

            let outcome = conn
                .transaction::<_, InfraError, _>(|conn| {
                    Box::pin(async move { ledger::pay_once_in_tx(conn, message_id, &request).await })
                })
                .await;
            match outcome {
                Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                    debug!(error = %e, attempt, %message_id, "replaying payment transaction");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[async_trait]
impl LedgerTx for AsyncPgConnection {
    async fn find_payment(&mut self, order_id: Uuid) -> Result<Option<Payment>> {
        let row = payments::table
            .find(order_id)
            .select(DbPayment::as_select())
            .first::<DbPayment>(self)
            .await
            .optional()?;
        row.map(Payment::try_from).transpose()
    }

    async fn lock_balance(&mut self, user_id: &str) -> Result<Option<i64>> {
        let balance = accounts::table
            .find(user_id)
            .select(accounts::balance)
            .for_update()
            .first::<i64>(self)
            .await
            .optional()?;
        Ok(balance)
    }

    async fn debit(&mut self, user_id: &str, amount: i64) -> Result<()> {
        diesel::update(accounts::table.find(user_id))
            .set(accounts::balance.eq(accounts::balance - amount))
            .execute(self)
            .await?;
        Ok(())
    }

    async fn credit(&mut self, user_id: &str, amount: i64) -> Result<()> {
        diesel::update(accounts::table.find(user_id))
            .set(accounts::balance.eq(accounts::balance + amount))
            .execute(self)
            .await?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        diesel::insert_into(payments::table)
            .values(DbPayment::from(payment))
            .execute(self)
            .await?;
        Ok(())
    }

    async fn enqueue(&mut self, entry: &OutboxEntry) -> Result<()> {
        Ok(pg::enqueue(self, OUTBOX_TABLE, entry).await?)
    }

    async fn claim_inbox(&mut self, message_id: Uuid) -> Result<bool> {
        Ok(pg::claim(self, INBOX_TABLE, message_id).await?)
    }
}
