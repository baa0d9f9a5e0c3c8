//! Ledger business-rule configuration.

use serde::Deserialize;

/// Limits and amounts applied by the ledger engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Largest single accrual accepted. Default: 10000.
    pub max_accrual: f64,
    /// Smallest write-off accepted. Default: 10. `None` disables the floor.
    pub min_write_off: Option<f64>,
    /// Ceiling on write-offs per account per UTC day. Default: 1000.
    pub daily_write_off_limit: Option<f64>,
    /// Points credited for each completed delivery. Default: 50.
    pub delivery_bonus: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_accrual: 10000.0,
            min_write_off: Some(10.0),
            daily_write_off_limit: Some(1000.0),
            delivery_bonus: 50.0,
        }
    }
}

impl LedgerConfig {
    /// Positivity and sufficiency checks only, no floor or daily ceiling.
    pub fn unrestricted() -> Self {
        Self {
            min_write_off: None,
            daily_write_off_limit: None,
            ..Self::default()
        }
    }
}
