use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::{InfraError, PaymentResult};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Finished,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Finished => "FINISHED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal status an order takes when `result` arrives.
    pub fn settled_by(result: &PaymentResult) -> Self {
        if result.succeeded() {
            OrderStatus::Finished
        } else {
            OrderStatus::Cancelled
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "FINISHED" => Ok(OrderStatus::Finished),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(InfraError::Corrupt(format!("order status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbOrder {
    pub id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
    pub status: String,
}

impl NewOrder {
    pub fn new(user_id: &str, amount: i64, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            amount,
            description: description.to_owned(),
            status: OrderStatus::New.as_str().to_owned(),
        }
    }
}

impl TryFrom<DbOrder> for Order {
    type Error = InfraError;

    fn try_from(db_order: DbOrder) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db_order.id,
            user_id: db_order.user_id,
            amount: db_order.amount,
            description: db_order.description,
            status: db_order.status.parse()?,
            created_at: db_order.created_at,
        })
    }
}
