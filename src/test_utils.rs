//! Test utilities.
//!
//! Builders for common fixtures plus store constructors backed by an
//! in-memory SQLite database, so tests run without a broker or a file on disk.

use std::sync::Arc;

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::bus::{ChannelBus, CompletionNotifier, MockEventBus};
use crate::config::LedgerConfig;
use crate::delivery::DeliveryService;
use crate::ledger::LedgerEngine;
use crate::model::{DeliveryCompletedEvent, NewDelivery};
use crate::storage::{LedgerStore, MockDeliveryStore, SqliteDeliveryStore, SqliteLedgerStore};

/// Single-connection in-memory SQLite pool.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

pub async fn sqlite_ledger_store() -> Arc<SqliteLedgerStore> {
    let store = SqliteLedgerStore::new(memory_pool().await);
    store.init().await.expect("ledger schema");
    Arc::new(store)
}

pub async fn sqlite_delivery_store() -> Arc<SqliteDeliveryStore> {
    let store = SqliteDeliveryStore::new(memory_pool().await);
    store.init().await.expect("delivery schema");
    Arc::new(store)
}

/// Ledger engine with default rules over the given store.
pub fn ledger_engine(store: Arc<dyn LedgerStore>) -> Arc<LedgerEngine> {
    Arc::new(LedgerEngine::new(store, LedgerConfig::default()))
}

/// A completion event as the delivery service emits it: account = order.
pub fn completion_event(delivery_id: Uuid, order_id: Uuid) -> DeliveryCompletedEvent {
    DeliveryCompletedEvent::new(delivery_id, order_id, Some(order_id), Utc::now())
}

pub fn new_delivery(order_id: Uuid) -> NewDelivery {
    NewDelivery {
        order_id,
        address_from: "1 Depot Road".to_string(),
        address_to: "42 Harbour Street".to_string(),
        recipient_name: "Sam Carter".to_string(),
        recipient_phone: "+15550100".to_string(),
    }
}

/// Delivery service over a mock store, publishing to a mock bus.
pub fn mock_delivery_service() -> (Arc<MockEventBus>, DeliveryService) {
    let bus = Arc::new(MockEventBus::new());
    let service = DeliveryService::new(
        Arc::new(MockDeliveryStore::new()),
        CompletionNotifier::new(bus.clone()),
    );
    (bus, service)
}

/// Delivery service over a mock store, publishing to an in-process queue.
pub fn channel_delivery_service() -> (ChannelBus, DeliveryService) {
    let bus = ChannelBus::new();
    let service = DeliveryService::new(
        Arc::new(MockDeliveryStore::new()),
        CompletionNotifier::new(Arc::new(bus.clone())),
    );
    (bus, service)
}
