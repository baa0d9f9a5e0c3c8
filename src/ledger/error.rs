//! Error types for ledger operations.

use thiserror::Error;

use crate::storage::StorageError;

/// Error returned by [`LedgerEngine`](super::LedgerEngine) operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Amount for {operation} must be positive, got {amount}")]
    InvalidAmount { operation: &'static str, amount: f64 },

    #[error("Amount too large for single accrual: {amount} exceeds {max}")]
    AmountTooLarge { amount: f64, max: f64 },

    #[error("Insufficient funds. Available: {available}, requested: {requested}")]
    InsufficientFunds { available: f64, requested: f64 },

    #[error("Minimum write-off amount is {minimum}, requested: {requested}")]
    BelowMinimum { minimum: f64, requested: f64 },

    #[error("Transaction amount exceeds daily limit of {limit} (already written off today: {used}, requested: {requested})")]
    DailyLimitExceeded {
        limit: f64,
        used: f64,
        requested: f64,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// True for business-rule rejections, false for infrastructure failures.
    pub fn is_validation(&self) -> bool {
        !matches!(self, LedgerError::Storage(_))
    }
}
