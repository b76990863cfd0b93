use tracing::info;
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{NewOrder, Order, OrderStatus};
use crate::store::OrderStore;

pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Synchronous entry points of the orders service.
pub struct Orders<S> {
    store: S,
}

impl<S: OrderStore> Orders<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a NEW order; its payment request leaves through the outbox.
    pub async fn create_order(
        &self,
        user_id: &str,
        amount: i64,
        description: &str,
    ) -> Result<Order, OrderError> {
        if user_id.is_empty() {
            return Err(OrderError::EmptyUserId);
        }
        if amount <= 0 {
            return Err(OrderError::InvalidAmount);
        }
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(OrderError::DescriptionTooLong);
        }

        let order = self
            .store
            .place(NewOrder::new(user_id, amount, description))
            .await?;

        info!(order_id = %order.id, user_id, amount, "order created, payment requested");
        Ok(order)
    }

    pub async fn get_status(&self, id: Uuid) -> Result<OrderStatus, OrderError> {
        self.store
            .status(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    pub async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryOrderStore;

    fn orders() -> (Orders<MemoryOrderStore>, MemoryOrderStore) {
        let store = MemoryOrderStore::default();
        (Orders::new(store.clone()), store)
    }

    #[tokio::test]
    async fn rejects_invalid_orders_without_side_effects() {
        let (orders, store) = orders();

        assert!(matches!(
            orders.create_order("", 100, "book").await,
            Err(OrderError::EmptyUserId)
        ));
        assert!(matches!(
            orders.create_order("u1", 0, "book").await,
            Err(OrderError::InvalidAmount)
        ));
        assert!(matches!(
            orders.create_order("u1", -5, "book").await,
            Err(OrderError::InvalidAmount)
        ));
        assert!(matches!(
            orders.create_order("u1", 100, &"x".repeat(201)).await,
            Err(OrderError::DescriptionTooLong)
        ));
        assert!(store.outbox().await.is_empty());
        assert!(orders.list_orders("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn description_limit_counts_characters() {
        let (orders, _) = orders();

        let order = orders
            .create_order("u1", 100, &"ж".repeat(MAX_DESCRIPTION_CHARS))
            .await
            .unwrap();

        assert_eq!(order.description.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[tokio::test]
    async fn new_order_starts_in_new() {
        let (orders, _) = orders();

        let order = orders.create_order("u1", 100, "book").await.unwrap();

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(orders.get_status(order.id).await.unwrap(), OrderStatus::New);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (orders, _) = orders();
        let id = Uuid::new_v4();

        assert!(matches!(
            orders.get_status(id).await,
            Err(OrderError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn lists_only_the_users_orders_newest_first() {
        let (orders, _) = orders();
        let first = orders.create_order("u1", 100, "book").await.unwrap();
        orders.create_order("u2", 50, "pen").await.unwrap();
        let second = orders.create_order("u1", 300, "lamp").await.unwrap();

        let listed = orders.list_orders("u1").await.unwrap();

        let ids: Vec<Uuid> = listed.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
