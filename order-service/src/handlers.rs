use async_trait::async_trait;
use shared::{Delivery, EventHandler, PaymentResult, Result};
use tracing::{info, warn};

use crate::saga::Settlement;
use crate::store::OrderStore;

/// Consumes `payments.result` and moves the matching order out of NEW.
pub struct PaymentResultHandler<S> {
    store: S,
}

impl<S: OrderStore> PaymentResultHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: OrderStore> EventHandler for PaymentResultHandler<S> {
    type Event = PaymentResult;

    async fn handle(&self, result: PaymentResult) -> Result<Delivery> {
        let order_id = result.order_id;
        let status = result.status.clone();

        match self.store.settle_once(result).await? {
            Settlement::Duplicate => Ok(Delivery::Duplicate),
            Settlement::Settled(to) => {
                info!(%order_id, payment = %status, order_status = %to, "order settled");
                Ok(Delivery::Applied)
            }
            Settlement::Unmatched => {
                warn!(%order_id, payment = %status, "payment result for unknown or settled order ignored");
                Ok(Delivery::Applied)
            }
        }
    }
}
