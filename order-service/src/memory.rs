use async_trait::async_trait;
use chrono::Utc;
use shared::memory::{InboxIds, OutboxRows};
use shared::{InfraError, OutboxEntry, OutboxMessage, OutboxSource, PaymentResult, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{NewOrder, Order, OrderStatus};
use crate::saga::{self, OrderTx, Settlement};
use crate::store::OrderStore;

/// The orders tables held in memory. A transaction works on a clone of the
/// state and swaps it back in only on success.
#[derive(Clone, Default)]
pub struct OrdersState {
    orders: Vec<Order>,
    outbox: OutboxRows,
    inbox: InboxIds,
}

#[async_trait]
impl OrderTx for OrdersState {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order> {
        if self.orders.iter().any(|o| o.id == order.id) {
            return Err(InfraError::Conflict(format!("order {} exists", order.id)));
        }
        let order = Order {
            id: order.id,
            user_id: order.user_id.clone(),
            amount: order.amount,
            description: order.description.clone(),
            status: order.status.parse()?,
            created_at: Utc::now(),
        };
        self.orders.push(order.clone());
        Ok(order)
    }

    async fn enqueue(&mut self, entry: &OutboxEntry) -> Result<()> {
        self.outbox.push(entry);
        Ok(())
    }

    async fn claim_inbox(&mut self, message_id: Uuid) -> Result<bool> {
        Ok(self.inbox.claim(message_id))
    }

    async fn transition(&mut self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        match self.orders.iter_mut().find(|o| o.id == id && o.status == from) {
            Some(order) => {
                order.status = to;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    state: Arc<Mutex<OrdersState>>,
}

impl MemoryOrderStore {
    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.messages().to_vec()
    }

    pub async fn inbox_len(&self) -> usize {
        self.state.lock().await.inbox.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn place(&self, order: NewOrder) -> Result<Order> {
        let mut committed = self.state.lock().await;
        let mut tx = committed.clone();
        let order = saga::place_in_tx(&mut tx, &order).await?;
        *committed = tx;
        Ok(order)
    }

    async fn status(&self, id: Uuid) -> Result<Option<OrderStatus>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).map(|o| o.status))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn settle_once(&self, result: PaymentResult) -> Result<Settlement> {
        let mut committed = self.state.lock().await;
        let mut tx = committed.clone();
        let settlement = saga::settle_in_tx(&mut tx, &result).await?;
        *committed = tx;
        Ok(settlement)
    }
}

#[async_trait]
impl OutboxSource for MemoryOrderStore {
    async fn next_unpublished(&self) -> Result<Option<OutboxMessage>> {
        Ok(self.state.lock().await.outbox.next_unpublished())
    }

    async fn mark_published(&self, message_id: Uuid) -> Result<()> {
        self.state.lock().await.outbox.mark_published(message_id);
        Ok(())
    }
}
