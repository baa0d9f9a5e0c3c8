//! Storage for deliveries and the loyalty ledger.
//!
//! Each service owns its own store. The ledger store exposes a single
//! `commit` that applies a balance delta and appends the matching transaction
//! as one atomic unit, so the account balance always equals the sum of its
//! entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::model::{Account, Delivery, Transaction};

pub mod helpers;
pub mod mock;
pub mod schema;
pub mod sqlite;

pub use mock::{MockDeliveryStore, MockLedgerStore};
pub use sqlite::{SqliteDeliveryStore, SqliteLedgerStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown enum value: {0}")]
    UnknownEnum(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for delivery records.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Insert a new delivery.
    async fn insert(&self, delivery: &Delivery) -> Result<()>;

    /// Overwrite the mutable fields of an existing delivery.
    async fn update(&self, delivery: &Delivery) -> Result<()>;

    /// Fetch a delivery by id.
    async fn get(&self, id: Uuid) -> Result<Option<Delivery>>;

    /// All deliveries, oldest first.
    async fn list(&self) -> Result<Vec<Delivery>>;
}

/// A balance-affecting entry to commit atomically.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub transaction: Transaction,
    /// When set, a second commit with the same key is reported as a duplicate
    /// and changes nothing.
    pub dedup_key: Option<String>,
}

/// Result of [`LedgerStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Balance updated and transaction appended.
    Applied {
        account: Account,
        transaction: Transaction,
    },
    /// The dedup key was already committed; this is the original transaction.
    Duplicate(Transaction),
}

/// Persistence for accounts and their transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch an account, creating it with a zero balance if unknown.
    async fn get_or_create_account(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account>;

    /// Apply the entry's signed amount to the account balance and append the
    /// transaction in one unit. Creates the account if needed.
    async fn commit(&self, entry: LedgerEntry) -> Result<CommitOutcome>;

    /// Sum of write-off amounts for an account created at or after `since`.
    async fn write_offs_since(&self, account_id: Uuid, since: DateTime<Utc>) -> Result<f64>;

    /// Transaction history of an account, oldest first.
    async fn transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>>;
}

/// Open the SQLite pool described by the storage config.
pub async fn connect(config: &StorageConfig) -> std::result::Result<SqlitePool, Box<dyn std::error::Error>> {
    info!(path = %config.path, "Storage: sqlite");

    if config.path == ":memory:" {
        // One connection, otherwise each pooled connection sees its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        return Ok(pool);
    }

    if let Some(parent) = std::path::Path::new(&config.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}
