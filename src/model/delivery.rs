//! Delivery records and the status enum.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Created,
    Assigned,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Created => "CREATED",
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(DeliveryStatus::Created),
            "ASSIGNED" => Ok(DeliveryStatus::Assigned),
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            other => Err(format!("unknown delivery status: {}", other)),
        }
    }
}

/// A shipment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DeliveryStatus,
    pub address_from: String,
    pub address_to: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub courier_id: Option<Uuid>,
    pub created_date: DateTime<Utc>,
    pub assigned_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Build a fresh delivery in the `CREATED` state.
    pub fn create(new: NewDelivery, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: new.order_id,
            status: DeliveryStatus::Created,
            address_from: new.address_from,
            address_to: new.address_to,
            recipient_name: new.recipient_name,
            recipient_phone: new.recipient_phone,
            courier_id: None,
            created_date: now,
            assigned_date: None,
            delivered_date: None,
        }
    }
}

/// Body of the create-delivery operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDelivery {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    #[serde(alias = "addressFrom")]
    pub address_from: String,
    #[serde(alias = "addressTo")]
    pub address_to: String,
    #[serde(alias = "recipientName")]
    pub recipient_name: String,
    #[serde(alias = "recipientPhone")]
    pub recipient_phone: String,
}

/// Body of the update operation. Both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPatch {
    #[serde(default, alias = "courierId")]
    pub courier_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&DeliveryStatus::Assigned).unwrap();
        assert_eq!(json, "\"ASSIGNED\"");
        let parsed: DeliveryStatus = serde_json::from_str("\"DELIVERED\"").unwrap();
        assert_eq!(parsed, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_status_from_str_roundtrip() {
        for status in [
            DeliveryStatus::Created,
            DeliveryStatus::Assigned,
            DeliveryStatus::Delivered,
        ] {
            assert_eq!(status.as_str().parse::<DeliveryStatus>(), Ok(status));
        }
        assert!("LOST".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_patch_accepts_camel_case_courier() {
        let courier = Uuid::new_v4();
        let body = format!(r#"{{"courierId":"{}"}}"#, courier);
        let patch: DeliveryPatch = serde_json::from_str(&body).unwrap();
        assert_eq!(patch.courier_id, Some(courier));
        assert!(patch.status.is_none());
    }
}
