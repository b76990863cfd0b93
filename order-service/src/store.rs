use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::pg::{self, DbPool, STORE_TIMEOUT};
use shared::{InfraError, OutboxEntry, PaymentResult, Result};
use tokio::time::timeout;
use uuid::Uuid;

use crate::models::*;
use crate::saga::{self, OrderTx, Settlement};
use crate::schema::*;

pub const OUTBOX_TABLE: &str = "orders_outbox";
pub const INBOX_TABLE: &str = "orders_inbox";

/// Transactional access to the orders database.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order and its `payments.request` event atomically.
    async fn place(&self, order: NewOrder) -> Result<Order>;

    async fn status(&self, id: Uuid) -> Result<Option<OrderStatus>>;

    /// Orders of `user_id`, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>>;

    /// Claims the result's message id in the inbox and settles the order, in
    /// one transaction.
    async fn settle_once(&self, result: PaymentResult) -> Result<Settlement>;
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn place(&self, order: NewOrder) -> Result<Order> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        let work = conn.transaction::<_, InfraError, _>(|conn| {
            Box::pin(async move { saga::place_in_tx(conn, &order).await })
        });
        timeout(STORE_TIMEOUT, work).await?
    }

    async fn status(&self, id: Uuid) -> Result<Option<OrderStatus>> {
        let mut conn = self.pool.get().await?;

        let status = timeout(
            STORE_TIMEOUT,
            orders::table
                .find(id)
                .select(orders::status)
                .first::<String>(&mut conn),
        )
        .await?
        .optional()?;

        status.map(|s| s.parse()).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;

        let rows = timeout(
            STORE_TIMEOUT,
            orders::table
                .filter(orders::user_id.eq(user_id))
                .order(orders::created_at.desc())
                .select(DbOrder::as_select())
                .load::<DbOrder>(&mut conn),
        )
        .await??;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn settle_once(&self, result: PaymentResult) -> Result<Settlement> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        conn.transaction::<_, InfraError, _>(|conn| {
            Box::pin(async move { saga::settle_in_tx(conn, &result).await })
        })
        .await
    }
}

#[async_trait]
impl OrderTx for AsyncPgConnection {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order> {
        let row = diesel::insert_into(orders::table)
            .values(order)
            .returning(DbOrder::as_returning())
            .get_result(self)
            .await?;
        Order::try_from(row)
    }

    async fn enqueue(&mut self, entry: &OutboxEntry) -> Result<()> {
        Ok(pg::enqueue(self, OUTBOX_TABLE, entry).await?)
    }

    async fn claim_inbox(&mut self, message_id: Uuid) -> Result<bool> {
        Ok(pg::claim(self, INBOX_TABLE, message_id).await?)
    }

    async fn transition(&mut self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let updated = diesel::update(
            orders::table
                .filter(orders::id.eq(id))
                .filter(orders::status.eq(from.as_str())),
        )
        .set(orders::status.eq(to.as_str()))
        .execute(self)
        .await?;
        Ok(updated == 1)
    }
}
