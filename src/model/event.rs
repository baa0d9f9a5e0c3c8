//! The completion fact exchanged between the two services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable queue carrying completion events.
pub const DELIVERY_COMPLETED_QUEUE: &str = "delivery_completed";

/// Wire payload emitted when a delivery first reaches `DELIVERED`.
///
/// Every field is optional on the wire so that a partially filled message can
/// still be decoded and then discarded by the consumer with a log line instead
/// of being treated as poison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCompletedEvent {
    pub delivery_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeliveryCompletedEvent {
    pub fn new(
        delivery_id: Uuid,
        order_id: Uuid,
        account_id: Option<Uuid>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            delivery_id: Some(delivery_id),
            order_id: Some(order_id),
            account_id,
            completed_at: Some(completed_at),
        }
    }

    /// Account to credit: `account_id`, falling back to `order_id`.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.account_id.or(self.order_id)
    }

    /// Key identifying this fact for duplicate detection.
    pub fn dedup_key(&self) -> Option<String> {
        self.delivery_id
            .map(|id| format!("{}:{}", DELIVERY_COMPLETED_QUEUE, id))
    }

    /// Names of fields a well-formed event should carry but this one lacks.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.delivery_id.is_none() {
            missing.push("delivery_id");
        }
        if self.order_id.is_none() {
            missing.push("order_id");
        }
        if self.account_id.is_none() {
            missing.push("account_id");
        }
        if self.completed_at.is_none() {
            missing.push("completed_at");
        }
        missing
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}
