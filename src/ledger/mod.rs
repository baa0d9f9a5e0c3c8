//! Loyalty-point ledger engine.
//!
//! Validates and applies balance-affecting operations. Called synchronously
//! from the bonus HTTP surface and asynchronously from the completion-event
//! consumer.
//!
//! Every mutation on one account runs under that account's lock: read the
//! balance, validate, then commit the balance delta and the transaction
//! together through [`LedgerStore::commit`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::model::{Balance, DeliveryCompletedEvent, Transaction, TransactionType};
use crate::storage::{CommitOutcome, LedgerEntry, LedgerStore};

mod error;
pub mod rules;

pub use error::LedgerError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Input of [`LedgerEngine::accrue`].
#[derive(Debug, Clone)]
pub struct AccrualRequest {
    pub account_id: Uuid,
    pub amount: f64,
    pub order_id: Uuid,
    pub delivery_id: Option<Uuid>,
    pub reason: String,
}

/// Input of [`LedgerEngine::write_off`].
#[derive(Debug, Clone)]
pub struct WriteOffRequest {
    pub account_id: Uuid,
    pub amount: f64,
    pub order_id: Uuid,
    pub reason: String,
}

/// Result of an event-driven accrual.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
    /// Credited now.
    Applied(Transaction),
    /// The event was already credited; nothing changed.
    Duplicate(Transaction),
}

impl AccrualOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            AccrualOutcome::Applied(tx) | AccrualOutcome::Duplicate(tx) => tx,
        }
    }
}

/// The ledger accounting engine.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Public API
impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Credit an account, scaling the amount by its size-based multiplier.
    pub async fn accrue(&self, request: AccrualRequest) -> Result<Transaction> {
        let result = self.apply_accrual(request.clone(), None).await;
        Self::log_result("accrual", request.account_id, request.amount, &result);
        match result? {
            AccrualOutcome::Applied(tx) | AccrualOutcome::Duplicate(tx) => Ok(tx),
        }
    }

    /// Credit the fixed delivery bonus for a completion event.
    ///
    /// The event's dedup key is committed with the transaction, so a
    /// redelivered event yields [`AccrualOutcome::Duplicate`] instead of a
    /// second credit.
    pub async fn accrue_for_delivery(
        &self,
        account_id: Uuid,
        event: &DeliveryCompletedEvent,
    ) -> Result<AccrualOutcome> {
        let delivery_label = event
            .delivery_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let request = AccrualRequest {
            account_id,
            amount: self.config.delivery_bonus,
            order_id: event.order_id.unwrap_or(account_id),
            delivery_id: event.delivery_id,
            reason: format!("Accrual for completed delivery {}", delivery_label),
        };

        let result = self.apply_accrual(request, event.dedup_key()).await;
        match &result {
            Ok(AccrualOutcome::Duplicate(tx)) => {
                info!(
                    account = %account_id,
                    delivery = %delivery_label,
                    transaction = %tx.id,
                    "delivery bonus already credited, skipping"
                );
            }
            other => Self::log_result(
                "delivery accrual",
                account_id,
                self.config.delivery_bonus,
                other,
            ),
        }
        result
    }

    /// Debit an account. An unknown account is treated as a zero balance.
    pub async fn write_off(&self, request: WriteOffRequest) -> Result<Transaction> {
        let result = self.apply_write_off(request.clone()).await;
        Self::log_result("write-off", request.account_id, request.amount, &result);
        result
    }

    /// Current balance, creating the account on first touch.
    pub async fn get_balance(&self, account_id: Uuid) -> Result<Balance> {
        let account = self
            .store
            .get_or_create_account(account_id, Utc::now())
            .await?;
        Ok(account.balance())
    }

    /// Transaction history of an account, oldest first.
    pub async fn transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        Ok(self.store.transactions(account_id).await?)
    }
}

/// Private API
impl LedgerEngine {
    /// Small helper to log operation results
    fn log_result<T, E: std::fmt::Display>(
        operation: &str,
        account: Uuid,
        amount: f64,
        result: &std::result::Result<T, E>,
    ) {
        match result {
            Ok(_) => info!(account = %account, amount, "{operation} applied"),
            Err(e) => warn!(account = %account, amount, reason = %e, "{operation} rejected"),
        }
    }

    async fn account_lock(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other task holds or waits on the lock.
    async fn release_account_lock(&self, account_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&account_id);
        }
    }

    async fn apply_accrual(
        &self,
        request: AccrualRequest,
        dedup_key: Option<String>,
    ) -> Result<AccrualOutcome> {
        let amount = rules::validate_accrual(request.amount, self.config.max_accrual)?;
        let (credited, bonus_applied) = rules::apply_bonus(amount);

        let account_id = request.account_id;
        let lock = self.account_lock(account_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.commit_accrual(request, credited, bonus_applied, dedup_key).await
        };
        self.release_account_lock(account_id, lock).await;
        result
    }

    async fn commit_accrual(
        &self,
        request: AccrualRequest,
        credited: f64,
        bonus_applied: bool,
        dedup_key: Option<String>,
    ) -> Result<AccrualOutcome> {
        let transaction = Transaction {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            transaction_type: TransactionType::Accrual,
            amount: credited,
            order_id: request.order_id,
            delivery_id: request.delivery_id,
            reason: rules::accrual_reason(&request.reason, bonus_applied),
            created_date: Utc::now(),
        };

        match self
            .store
            .commit(LedgerEntry {
                transaction,
                dedup_key,
            })
            .await?
        {
            CommitOutcome::Applied { transaction, .. } => Ok(AccrualOutcome::Applied(transaction)),
            CommitOutcome::Duplicate(existing) => Ok(AccrualOutcome::Duplicate(existing)),
        }
    }

    async fn apply_write_off(&self, request: WriteOffRequest) -> Result<Transaction> {
        let account_id = request.account_id;
        let lock = self.account_lock(account_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.commit_write_off(request).await
        };
        self.release_account_lock(account_id, lock).await;
        result
    }

    /// Read, validate and commit. Callers hold the account lock.
    async fn commit_write_off(&self, request: WriteOffRequest) -> Result<Transaction> {
        let now = Utc::now();
        let account = self
            .store
            .get_or_create_account(request.account_id, now)
            .await?;

        let amount = rules::validate_write_off(
            request.amount,
            account.current_balance,
            self.config.min_write_off,
        )?;

        if self.config.daily_write_off_limit.is_some() {
            let today = self
                .store
                .write_offs_since(request.account_id, start_of_day(now))
                .await?;
            rules::check_daily_limit(today, amount, self.config.daily_write_off_limit)?;
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            transaction_type: TransactionType::WriteOff,
            amount,
            order_id: request.order_id,
            delivery_id: None,
            reason: request.reason,
            created_date: now,
        };

        match self
            .store
            .commit(LedgerEntry {
                transaction,
                dedup_key: None,
            })
            .await?
        {
            CommitOutcome::Applied { transaction, .. } | CommitOutcome::Duplicate(transaction) => {
                Ok(transaction)
            }
        }
    }
}

/// Midnight UTC of the day containing `ts`.
fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(ts)
}
