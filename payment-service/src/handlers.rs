use async_trait::async_trait;
use shared::{Delivery, EventHandler, PaymentRequested, Result};
use tracing::info;

use crate::models::PaymentRequest;
use crate::store::LedgerStore;

/// Consumes `payments.request` and charges the account. Declines are
/// business outcomes already recorded with their result event, so they
/// acknowledge the message like a success does.
pub struct PaymentRequestHandler<S> {
    store: S,
}

impl<S: LedgerStore> PaymentRequestHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: LedgerStore> EventHandler for PaymentRequestHandler<S> {
    type Event = PaymentRequested;

    async fn handle(&self, event: PaymentRequested) -> Result<Delivery> {
        let request = PaymentRequest::from(&event);

        let Some(outcome) = self.store.pay_once(event.message_id, &request).await? else {
            return Ok(Delivery::Duplicate);
        };

        let order_id = request.order_id;
        let status = outcome.payment.status;
        match (outcome.replayed, outcome.decline) {
            (true, _) => info!(%order_id, %status, "payment for order already recorded"),
            (false, None) => info!(%order_id, amount = request.amount, %status, "order paid"),
            (false, Some(decline)) => {
                info!(%order_id, amount = request.amount, %status, ?decline, "payment declined")
            }
        }
        Ok(Delivery::Applied)
    }
}
