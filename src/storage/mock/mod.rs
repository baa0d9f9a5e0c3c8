//! Mock storage implementations for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CommitOutcome, DeliveryStore, LedgerEntry, LedgerStore, Result, StorageError,
};
use crate::model::{Account, Delivery, Transaction, TransactionType};

/// Mock delivery store that keeps records in memory.
#[derive(Default)]
pub struct MockDeliveryStore {
    deliveries: RwLock<Vec<Delivery>>,
    fail_on_write: RwLock<bool>,
}

impl MockDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("Mock write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryStore for MockDeliveryStore {
    async fn insert(&self, delivery: &Delivery) -> Result<()> {
        self.check_write().await?;
        self.deliveries.write().await.push(delivery.clone());
        Ok(())
    }

    async fn update(&self, delivery: &Delivery) -> Result<()> {
        self.check_write().await?;
        let mut deliveries = self.deliveries.write().await;
        if let Some(existing) = deliveries.iter_mut().find(|d| d.id == delivery.id) {
            *existing = delivery.clone();
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Delivery>> {
        Ok(self
            .deliveries
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Delivery>> {
        Ok(self.deliveries.read().await.clone())
    }
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    dedup: HashMap<String, Uuid>,
}

/// Mock ledger store that keeps accounts and transactions in memory.
///
/// `commit` mutates balance and history under one write lock, matching the
/// atomicity of the SQL store.
#[derive(Default)]
pub struct MockLedgerStore {
    state: RwLock<LedgerState>,
    fail_on_commit: RwLock<bool>,
}

impl MockLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `commit` fail without touching state.
    pub async fn set_fail_on_commit(&self, fail: bool) {
        *self.fail_on_commit.write().await = fail;
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MockLedgerStore {
    async fn get_or_create_account(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account> {
        let mut state = self.state.write().await;
        Ok(state
            .accounts
            .entry(id)
            .or_insert_with(|| Account::empty(id, now))
            .clone())
    }

    async fn commit(&self, entry: LedgerEntry) -> Result<CommitOutcome> {
        if *self.fail_on_commit.read().await {
            return Err(StorageError::Unavailable("Mock commit failure".to_string()));
        }

        let mut state = self.state.write().await;

        if let Some(key) = &entry.dedup_key {
            if let Some(existing_id) = state.dedup.get(key) {
                let existing = state
                    .transactions
                    .iter()
                    .find(|t| t.id == *existing_id)
                    .cloned()
                    .ok_or_else(|| StorageError::Unavailable(format!("dangling dedup key {}", key)))?;
                return Ok(CommitOutcome::Duplicate(existing));
            }
        }

        let tx = entry.transaction;
        let account = state
            .accounts
            .entry(tx.account_id)
            .or_insert_with(|| Account::empty(tx.account_id, tx.created_date));
        account.current_balance += tx.signed_amount();
        account.as_of_date = tx.created_date;
        let account = account.clone();

        if let Some(key) = entry.dedup_key {
            state.dedup.insert(key, tx.id);
        }
        state.transactions.push(tx.clone());

        Ok(CommitOutcome::Applied {
            account,
            transaction: tx,
        })
    }

    async fn write_offs_since(&self, account_id: Uuid, since: DateTime<Utc>) -> Result<f64> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .iter()
            .filter(|t| {
                t.account_id == account_id
                    && t.transaction_type == TransactionType::WriteOff
                    && t.created_date >= since
            })
            .map(|t| t.amount)
            .sum())
    }

    async fn transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }
}
