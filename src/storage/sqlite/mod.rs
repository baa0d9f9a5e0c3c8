//! SQLite implementations of storage interfaces.

mod delivery_store;
mod ledger_store;

pub use delivery_store::SqliteDeliveryStore;
pub use ledger_store::SqliteLedgerStore;
