//! Waybill - delivery tracking with an eventually consistent loyalty ledger.
//!
//! The delivery service records shipments and, when one is first delivered,
//! publishes a completion event to a durable queue. The bonus service consumes
//! those events and credits the correlated loyalty account, alongside direct
//! accrual and write-off calls over HTTP.

pub mod api;
pub mod bus;
pub mod config;
pub mod delivery;
pub mod ledger;
pub mod model;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
