//! Delivery errors.

use uuid::Uuid;

use crate::model::DeliveryStatus;
use crate::storage::StorageError;

/// Errors raised by the delivery state machine and service.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
