use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod topics {
    pub const PAYMENTS_REQUEST: &str = "payments.request";
    pub const PAYMENTS_RESULT: &str = "payments.result";
}

/// An event that travels through an outbox and is consumed through an inbox.
///
/// `message_id` is the inbox dedup key; `key` picks the Kafka partition, so
/// all events about one order stay ordered.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TOPIC: &'static str;

    fn message_id(&self) -> Uuid;
    fn key(&self) -> String;
}

/// Orders -> payments: charge `amount` for `order_id` to `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequested {
    pub message_id: Uuid,
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
}

impl PaymentRequested {
    pub fn new(order_id: Uuid, user_id: &str, amount: i64, description: &str) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            order_id,
            user_id: user_id.to_owned(),
            amount,
            description: description.to_owned(),
        }
    }
}

impl Event for PaymentRequested {
    const TOPIC: &'static str = topics::PAYMENTS_REQUEST;

    fn message_id(&self) -> Uuid {
        self.message_id
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

/// Payments -> orders: the recorded outcome of a payment attempt.
///
/// `status` stays a plain string on the wire; only `"SUCCESS"` counts as paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub message_id: Uuid,
    pub order_id: Uuid,
    pub status: String,
}

impl PaymentResult {
    pub fn new(order_id: Uuid, status: PaymentStatus) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            order_id,
            status: status.as_str().to_owned(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == PaymentStatus::Success.as_str()
    }
}

impl Event for PaymentResult {
    const TOPIC: &'static str = topics::PAYMENTS_RESULT;

    fn message_id(&self) -> Uuid {
        self.message_id
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status {other:?}")),
        }
    }
}
