//! Loyalty ledger records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Accrual,
    WriteOff,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Accrual => "ACCRUAL",
            TransactionType::WriteOff => "WRITE_OFF",
        }
    }

    /// Sign applied to the amount when folding into a balance.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            TransactionType::Accrual => amount,
            TransactionType::WriteOff => -amount,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCRUAL" => Ok(TransactionType::Accrual),
            "WRITE_OFF" => Ok(TransactionType::WriteOff),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// A loyalty-point balance holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub current_balance: f64,
    pub as_of_date: DateTime<Utc>,
}

impl Account {
    /// Default account created on first touch.
    pub fn empty(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            current_balance: 0.0,
            as_of_date: now,
        }
    }

    pub fn balance(&self) -> Balance {
        Balance {
            account_id: self.id,
            current_balance: self.current_balance,
            as_of_date: self.as_of_date,
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub order_id: Uuid,
    pub delivery_id: Option<Uuid>,
    pub reason: String,
    pub created_date: DateTime<Utc>,
}

impl Transaction {
    /// Amount with the sign this entry contributes to the balance.
    pub fn signed_amount(&self) -> f64 {
        self.transaction_type.signed(self.amount)
    }
}

/// Balance view returned by the balance query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: Uuid,
    pub current_balance: f64,
    pub as_of_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&TransactionType::WriteOff).unwrap(),
            "\"WRITE_OFF\""
        );
        assert_eq!("ACCRUAL".parse::<TransactionType>(), Ok(TransactionType::Accrual));
    }

    #[test]
    fn test_signed_amounts() {
        assert_eq!(TransactionType::Accrual.signed(12.5), 12.5);
        assert_eq!(TransactionType::WriteOff.signed(12.5), -12.5);
    }

    #[test]
    fn test_transaction_serializes_type_field() {
        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            transaction_type: TransactionType::Accrual,
            amount: 50.0,
            order_id: Uuid::new_v4(),
            delivery_id: None,
            reason: "x".to_string(),
            created_date: Utc::now(),
        };
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["type"], "ACCRUAL");
        assert!(value.get("transaction_type").is_none());
    }
}
