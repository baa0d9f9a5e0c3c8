//! Shared data model for the delivery and ledger domains.

pub mod delivery;
pub mod event;
pub mod ledger;

pub use delivery::{Delivery, DeliveryPatch, DeliveryStatus, NewDelivery};
pub use event::{DeliveryCompletedEvent, DELIVERY_COMPLETED_QUEUE};
pub use ledger::{Account, Balance, Transaction, TransactionType};
