//! Bootstrap utilities for waybill binaries.
//!
//! Shared initialization code for the delivery and bonus services.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LOG_ENV_VAR};
use crate::storage::{self, SqliteDeliveryStore, SqliteLedgerStore};

/// Initialize tracing with WAYBILL_LOG environment variable.
///
/// Defaults to "info" level if WAYBILL_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the configured database and create the delivery table.
pub async fn open_delivery_store(
    config: &Config,
) -> Result<Arc<SqliteDeliveryStore>, Box<dyn std::error::Error>> {
    let pool = storage::connect(&config.storage).await?;
    let store = SqliteDeliveryStore::new(pool);
    store.init().await?;
    info!(path = %config.storage.path, "Delivery store ready");
    Ok(Arc::new(store))
}

/// Open the configured database and create the ledger tables.
pub async fn open_ledger_store(
    config: &Config,
) -> Result<Arc<SqliteLedgerStore>, Box<dyn std::error::Error>> {
    let pool = storage::connect(&config.storage).await?;
    let store = SqliteLedgerStore::new(pool);
    store.init().await?;
    info!(path = %config.storage.path, "Ledger store ready");
    Ok(Arc::new(store))
}
