//! Delivery lifecycle.
//!
//! Status only moves forward through a fixed table:
//!
//! ```text
//! CREATED   -> ASSIGNED
//! ASSIGNED  -> DELIVERED
//! DELIVERED -> (terminal)
//! ```
//!
//! `assigned_date` and `delivered_date` are written once, on first arrival in
//! the matching status.

use chrono::{DateTime, Utc};

use crate::model::{Delivery, DeliveryStatus};

mod error;
mod service;

pub use error::DeliveryError;
pub use service::DeliveryService;

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// What a successful transition changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
    /// `DELIVERED` was reached and `delivered_date` was set by this call.
    pub first_delivery: bool,
}

/// Allowed next statuses.
pub fn allowed_transitions(status: DeliveryStatus) -> &'static [DeliveryStatus] {
    match status {
        DeliveryStatus::Created => &[DeliveryStatus::Assigned],
        DeliveryStatus::Assigned => &[DeliveryStatus::Delivered],
        DeliveryStatus::Delivered => &[],
    }
}

impl DeliveryStatus {
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        allowed_transitions(*self).contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        allowed_transitions(*self).is_empty()
    }
}

impl Delivery {
    /// Move to `next`, stamping the status timestamp if it is still unset.
    pub fn transition(
        &mut self,
        next: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(DeliveryError::InvalidTransition { from, to: next });
        }

        let mut first_delivery = false;
        match next {
            DeliveryStatus::Assigned if self.assigned_date.is_none() => {
                self.assigned_date = Some(now);
            }
            DeliveryStatus::Delivered if self.delivered_date.is_none() => {
                self.delivered_date = Some(now);
                first_delivery = true;
            }
            _ => {}
        }
        self.status = next;

        Ok(TransitionOutcome {
            from,
            to: next,
            first_delivery,
        })
    }
}
