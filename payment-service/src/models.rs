use diesel::prelude::*;
use serde::Serialize;
use shared::{InfraError, PaymentRequested, PaymentStatus};
use uuid::Uuid;

/// The single recorded outcome of paying for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbPayment {
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub status: String,
}

impl From<&Payment> for DbPayment {
    fn from(payment: &Payment) -> Self {
        Self {
            order_id: payment.order_id,
            user_id: payment.user_id.clone(),
            amount: payment.amount,
            status: payment.status.as_str().to_owned(),
        }
    }
}

impl TryFrom<DbPayment> for Payment {
    type Error = InfraError;

    fn try_from(db_payment: DbPayment) -> Result<Self, Self::Error> {
        Ok(Self {
            order_id: db_payment.order_id,
            user_id: db_payment.user_id,
            amount: db_payment.amount,
            status: db_payment.status.parse().map_err(InfraError::Corrupt)?,
        })
    }
}

/// What a caller asks the ledger to charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: i64,
}

impl From<&PaymentRequested> for PaymentRequest {
    fn from(event: &PaymentRequested) -> Self {
        Self {
            order_id: event.order_id,
            user_id: event.user_id.clone(),
            amount: event.amount,
        }
    }
}
