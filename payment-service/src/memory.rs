use async_trait::async_trait;
use shared::memory::{InboxIds, OutboxRows};
use shared::{InfraError, OutboxEntry, OutboxMessage, OutboxSource, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ledger::{self, Credit, LedgerTx, PayOutcome};
use crate::models::{Payment, PaymentRequest};
use crate::store::LedgerStore;

/// The ledger tables held in memory. Transactions run on a clone and are
/// swapped in on success, so a failed step leaves nothing behind.
#[derive(Clone, Default)]
pub struct LedgerState {
    accounts: HashMap<String, i64>,
    payments: HashMap<Uuid, Payment>,
    outbox: OutboxRows,
    inbox: InboxIds,
}

#[async_trait]
impl LedgerTx for LedgerState {
    async fn find_payment(&mut self, order_id: Uuid) -> Result<Option<Payment>> {
        Ok(self.payments.get(&order_id).cloned())
    }

    async fn lock_balance(&mut self, user_id: &str) -> Result<Option<i64>> {
        Ok(self.accounts.get(user_id).copied())
    }

    async fn debit(&mut self, user_id: &str, amount: i64) -> Result<()> {
        let balance = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| InfraError::Corrupt(format!("account {user_id} vanished")))?;
        if *balance < amount {
            return Err(InfraError::Corrupt("balance would go negative".to_owned()));
        }
        *balance -= amount;
        Ok(())
    }

    async fn credit(&mut self, user_id: &str, amount: i64) -> Result<()> {
        let balance = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| InfraError::Corrupt(format!("account {user_id} vanished")))?;
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| InfraError::Corrupt("balance overflow".to_owned()))?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if self.payments.contains_key(&payment.order_id) {
            return Err(InfraError::Conflict(format!("payment for {} exists", payment.order_id)));
        }
        self.payments.insert(payment.order_id, payment.clone());
        Ok(())
    }

    async fn enqueue(&mut self, entry: &OutboxEntry) -> Result<()> {
        self.outbox.push(entry);
        Ok(())
    }

    async fn claim_inbox(&mut self, message_id: Uuid) -> Result<bool> {
        Ok(self.inbox.claim(message_id))
    }
}

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedgerStore {
    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.messages().to_vec()
    }

    pub async fn payment(&self, order_id: Uuid) -> Option<Payment> {
        self.state.lock().await.payments.get(&order_id).cloned()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_account(&self, user_id: &str) -> Result<i64> {
        let mut state = self.state.lock().await;
        Ok(*state.accounts.entry(user_id.to_owned()).or_insert(0))
    }

    async fn top_up(&self, user_id: &str, amount: i64) -> Result<Credit> {
        let mut committed = self.state.lock().await;
        let mut tx = committed.clone();
        let credit = ledger::top_up_in_tx(&mut tx, user_id, amount).await?;
        *committed = tx;
        Ok(credit)
    }

    async fn balance(&self, user_id: &str) -> Result<Option<i64>> {
        Ok(self.state.lock().await.accounts.get(user_id).copied())
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PayOutcome> {
        let mut committed = self.state.lock().await;
        let mut tx = committed.clone();
        let outcome = ledger::pay_in_tx(&mut tx, request).await?;
        *committed = tx;
        Ok(outcome)
    }

    async fn pay_once(&self, message_id: Uuid, request: &PaymentRequest) -> Result<Option<PayOutcome>> {
        let mut committed = self.state.lock().await;
        let mut tx = committed.clone();
        let outcome = ledger::pay_once_in_tx(&mut tx, message_id, request).await?;
        *committed = tx;
        Ok(outcome)
    }
}

#[async_trait]
impl OutboxSource for MemoryLedgerStore {
    async fn next_unpublished(&self) -> Result<Option<OutboxMessage>> {
        Ok(self.state.lock().await.outbox.next_unpublished())
    }

    async fn mark_published(&self, message_id: Uuid) -> Result<()> {
        self.state.lock().await.outbox.mark_published(message_id);
        Ok(())
    }
}
