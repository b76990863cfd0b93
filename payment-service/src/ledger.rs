//! The prepaid balance ledger.
//!
//! `pay_in_tx` is the money-moving step of the saga. It runs inside one local
//! transaction with the account row locked, and every path that does not
//! find an earlier payment writes exactly one payment row and exactly one
//! `payments.result` outbox row. A decline is a recorded outcome, not a
//! rollback.

use async_trait::async_trait;
use shared::{InfraError, OutboxEntry, PaymentResult, PaymentStatus, Result};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{Payment, PaymentRequest};
use crate::store::LedgerStore;

#[async_trait]
pub trait LedgerTx: Send {
    async fn find_payment(&mut self, order_id: Uuid) -> Result<Option<Payment>>;

    /// Reads the balance and holds the account row until the transaction ends.
    async fn lock_balance(&mut self, user_id: &str) -> Result<Option<i64>>;

    async fn debit(&mut self, user_id: &str, amount: i64) -> Result<()>;

    async fn credit(&mut self, user_id: &str, amount: i64) -> Result<()>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn enqueue(&mut self, entry: &OutboxEntry) -> Result<()>;

    /// Insert-if-absent on the inbox; `true` on first delivery.
    async fn claim_inbox(&mut self, message_id: Uuid) -> Result<bool>;
}

/// Why a payment was recorded as FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decline {
    InvalidAmount,
    NoAccount,
    InsufficientFunds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayOutcome {
    pub payment: Payment,
    /// Set when this call recorded a FAILED payment.
    pub decline: Option<Decline>,
    /// The payment already existed and was returned untouched.
    pub replayed: bool,
}

pub async fn pay_in_tx<T: LedgerTx + ?Sized>(tx: &mut T, request: &PaymentRequest) -> Result<PayOutcome> {
    if let Some(payment) = tx.find_payment(request.order_id).await? {
        return Ok(PayOutcome {
            payment,
            decline: None,
            replayed: true,
        });
    }

    let decline = if request.amount <= 0 {
        Some(Decline::InvalidAmount)
    } else {
        match tx.lock_balance(&request.user_id).await? {
            None => Some(Decline::NoAccount),
            Some(balance) if balance < request.amount => Some(Decline::InsufficientFunds),
            Some(_) => {
                tx.debit(&request.user_id, request.amount).await?;
                None
            }
        }
    };

    let status = match decline {
        None => PaymentStatus::Success,
        Some(_) => PaymentStatus::Failed,
    };
    let payment = Payment {
        order_id: request.order_id,
        user_id: request.user_id.clone(),
        amount: request.amount,
        status,
    };
    tx.insert_payment(&payment).await?;

    let result = PaymentResult::new(request.order_id, status);
    tx.enqueue(&OutboxEntry::for_event(&result)?).await?;

    Ok(PayOutcome {
        payment,
        decline,
        replayed: false,
    })
}

/// Result of adding money to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    Applied(i64),
    NoAccount,
    /// The new balance would not fit in an `i64`; nothing was written.
    Overflow,
}

pub async fn top_up_in_tx<T: LedgerTx + ?Sized>(tx: &mut T, user_id: &str, amount: i64) -> Result<Credit> {
    let Some(balance) = tx.lock_balance(user_id).await? else {
        return Ok(Credit::NoAccount);
    };
    let Some(new_balance) = balance.checked_add(amount) else {
        return Ok(Credit::Overflow);
    };
    tx.credit(user_id, amount).await?;
    Ok(Credit::Applied(new_balance))
}

/// The inbox-guarded variant used for `payments.request` events. `None`
/// means the message id was already consumed.
pub async fn pay_once_in_tx<T: LedgerTx + ?Sized>(
    tx: &mut T,
    message_id: Uuid,
    request: &PaymentRequest,
) -> Result<Option<PayOutcome>> {
    if !tx.claim_inbox(message_id).await? {
        return Ok(None);
    }
    pay_in_tx(tx, request).await.map(Some)
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("empty user_id")]
    EmptyUserId,

    #[error("amount must be greater than 0")]
    InvalidAmount,

    #[error("balance limit exceeded")]
    BalanceOverflow,

    #[error("no account")]
    NoAccount,

    #[error("not enough money")]
    InsufficientFunds,

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl From<Decline> for LedgerError {
    fn from(decline: Decline) -> Self {
        match decline {
            Decline::InvalidAmount => LedgerError::InvalidAmount,
            Decline::NoAccount => LedgerError::NoAccount,
            Decline::InsufficientFunds => LedgerError::InsufficientFunds,
        }
    }
}

/// Synchronous entry points of the payments service.
pub struct Ledger<S> {
    store: S,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Opens a zero-balance account, or leaves an existing one alone.
    /// Returns the current balance either way.
    pub async fn create_account(&self, user_id: &str) -> Result<i64, LedgerError> {
        if user_id.is_empty() {
            return Err(LedgerError::EmptyUserId);
        }
        Ok(self.store.create_account(user_id).await?)
    }

    pub async fn top_up(&self, user_id: &str, amount: i64) -> Result<i64, LedgerError> {
        if user_id.is_empty() {
            return Err(LedgerError::EmptyUserId);
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = match self.store.top_up(user_id, amount).await? {
            Credit::Applied(balance) => balance,
            Credit::NoAccount => return Err(LedgerError::NoAccount),
            Credit::Overflow => return Err(LedgerError::BalanceOverflow),
        };

        info!(user_id, amount, balance, "account topped up");
        Ok(balance)
    }

    pub async fn balance(&self, user_id: &str) -> Result<i64, LedgerError> {
        if user_id.is_empty() {
            return Err(LedgerError::EmptyUserId);
        }
        self.store
            .balance(user_id)
            .await?
            .ok_or(LedgerError::NoAccount)
    }

    /// Charges `amount` for `order_id`. A decline is committed as a FAILED
    /// payment with its result event before the error is returned; a second
    /// call for the same order returns the stored payment unchanged.
    pub async fn pay(&self, order_id: Uuid, user_id: &str, amount: i64) -> Result<Payment, LedgerError> {
        if user_id.is_empty() {
            return Err(LedgerError::EmptyUserId);
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let request = PaymentRequest {
            order_id,
            user_id: user_id.to_owned(),
            amount,
        };
        let outcome = self.store.pay(&request).await?;

        if outcome.replayed {
            info!(%order_id, status = %outcome.payment.status, "payment already recorded");
        } else {
            info!(%order_id, user_id, amount, status = %outcome.payment.status, "payment recorded");
        }

        match outcome.decline {
            None => Ok(outcome.payment),
            Some(decline) => Err(decline.into()),
        }
    }
}
