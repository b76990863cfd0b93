//! The orders half of the payment saga.
//!
//! An order enters NEW together with a `payments.request` outbox row, and
//! leaves NEW only when a `payments.result` for it is consumed. Both steps
//! are written against [`OrderTx`], one open local transaction.

use async_trait::async_trait;
use shared::{OutboxEntry, PaymentRequested, PaymentResult, Result};
use uuid::Uuid;

use crate::models::{NewOrder, Order, OrderStatus};

#[async_trait]
pub trait OrderTx: Send {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order>;

    async fn enqueue(&mut self, entry: &OutboxEntry) -> Result<()>;

    /// Insert-if-absent on the inbox; `true` on first delivery.
    async fn claim_inbox(&mut self, message_id: Uuid) -> Result<bool>;

    /// Compare-and-set on the status column. `false` when no order with `id`
    /// is currently in `from`.
    async fn transition(&mut self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The result was already consumed.
    Duplicate,
    /// The order left NEW.
    Settled(OrderStatus),
    /// No order in NEW with that id: unknown, or already terminal.
    Unmatched,
}

pub async fn place_in_tx<T: OrderTx + ?Sized>(tx: &mut T, order: &NewOrder) -> Result<Order> {
    let order = tx.insert_order(order).await?;
    let request =
        PaymentRequested::new(order.id, &order.user_id, order.amount, &order.description);
    tx.enqueue(&OutboxEntry::for_event(&request)?).await?;
    Ok(order)
}

pub async fn settle_in_tx<T: OrderTx + ?Sized>(tx: &mut T, result: &PaymentResult) -> Result<Settlement> {
    if !tx.claim_inbox(result.message_id).await? {
        return Ok(Settlement::Duplicate);
    }

    let target = OrderStatus::settled_by(result);
    if tx.transition(result.order_id, OrderStatus::New, target).await? {
        Ok(Settlement::Settled(target))
    } else {
        Ok(Settlement::Unmatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryOrderStore;
    use crate::store::OrderStore;
    use shared::{topics, PaymentStatus};

    async fn placed(store: &MemoryOrderStore) -> Order {
        store.place(NewOrder::new("u1", 100, "book")).await.unwrap()
    }

    fn result(order_id: Uuid, status: &str) -> PaymentResult {
        PaymentResult {
            message_id: Uuid::new_v4(),
            order_id,
            status: status.to_owned(),
        }
    }

    #[tokio::test]
    async fn placing_an_order_stages_a_payment_request() {
        let store = MemoryOrderStore::default();

        let order = placed(&store).await;

        assert_eq!(order.status, OrderStatus::New);
        let outbox = store.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].topic, topics::PAYMENTS_REQUEST);
        assert_eq!(outbox[0].key, order.id.to_string());
        assert!(outbox[0].published_at.is_none());
        let request: PaymentRequested = serde_json::from_value(outbox[0].payload.clone()).unwrap();
        assert_eq!(request.order_id, order.id);
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.amount, 100);
        assert_eq!(request.description, "book");
        assert_eq!(request.message_id, outbox[0].message_id);
    }

    #[tokio::test]
    async fn successful_payment_finishes_the_order() {
        let store = MemoryOrderStore::default();
        let order = placed(&store).await;

        let settlement = store
            .settle_once(PaymentResult::new(order.id, PaymentStatus::Success))
            .await
            .unwrap();

        assert_eq!(settlement, Settlement::Settled(OrderStatus::Finished));
        assert_eq!(store.status(order.id).await.unwrap(), Some(OrderStatus::Finished));
    }

    #[tokio::test]
    async fn any_other_result_cancels_the_order() {
        let store = MemoryOrderStore::default();
        let failed = placed(&store).await;
        let odd = placed(&store).await;

        store.settle_once(result(failed.id, "FAILED")).await.unwrap();
        store.settle_once(result(odd.id, "TIMEOUT")).await.unwrap();

        assert_eq!(store.status(failed.id).await.unwrap(), Some(OrderStatus::Cancelled));
        assert_eq!(store.status(odd.id).await.unwrap(), Some(OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn redelivered_result_is_absorbed() {
        let store = MemoryOrderStore::default();
        let order = placed(&store).await;
        let event = PaymentResult::new(order.id, PaymentStatus::Success);

        let first = store.settle_once(event.clone()).await.unwrap();
        let second = store.settle_once(event).await.unwrap();

        assert_eq!(first, Settlement::Settled(OrderStatus::Finished));
        assert_eq!(second, Settlement::Duplicate);
        assert_eq!(store.status(order.id).await.unwrap(), Some(OrderStatus::Finished));
    }

    #[tokio::test]
    async fn terminal_status_never_reverts() {
        let store = MemoryOrderStore::default();
        let order = placed(&store).await;

        store.settle_once(result(order.id, "SUCCESS")).await.unwrap();
        let late = store.settle_once(result(order.id, "FAILED")).await.unwrap();

        assert_eq!(late, Settlement::Unmatched);
        assert_eq!(store.status(order.id).await.unwrap(), Some(OrderStatus::Finished));
    }

    #[tokio::test]
    async fn result_for_unknown_order_is_consumed_without_effect() {
        let store = MemoryOrderStore::default();
        let event = result(Uuid::new_v4(), "SUCCESS");

        let settlement = store.settle_once(event.clone()).await.unwrap();

        assert_eq!(settlement, Settlement::Unmatched);
        assert_eq!(store.settle_once(event).await.unwrap(), Settlement::Duplicate);
    }
}
