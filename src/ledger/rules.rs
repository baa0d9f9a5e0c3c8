//! Business rules for accruals and write-offs.
//!
//! Pure functions over explicit parameters so each rule can be exercised
//! without an engine or a store.

use super::LedgerError;

/// Multiplier applied to an accrual based on its size.
pub fn bonus_multiplier(amount: f64) -> f64 {
    if amount > 1000.0 {
        1.1
    } else if amount > 500.0 {
        1.05
    } else {
        1.0
    }
}

/// Scale an accrual by its multiplier. Returns the credited amount and
/// whether the multiplier raised it.
pub fn apply_bonus(amount: f64) -> (f64, bool) {
    let multiplier = bonus_multiplier(amount);
    (amount * multiplier, multiplier > 1.0)
}

/// Reject non-positive accruals and accruals above `max_accrual`.
pub fn validate_accrual(amount: f64, max_accrual: f64) -> Result<f64, LedgerError> {
    if !(amount > 0.0) {
        return Err(LedgerError::InvalidAmount {
            operation: "accrual",
            amount,
        });
    }
    if amount > max_accrual {
        return Err(LedgerError::AmountTooLarge {
            amount,
            max: max_accrual,
        });
    }
    Ok(amount)
}

/// Reject non-positive write-offs, write-offs above the balance and, when a
/// floor is configured, write-offs below it.
pub fn validate_write_off(
    amount: f64,
    balance: f64,
    min_write_off: Option<f64>,
) -> Result<f64, LedgerError> {
    if !(amount > 0.0) {
        return Err(LedgerError::InvalidAmount {
            operation: "write-off",
            amount,
        });
    }
    if amount > balance {
        return Err(LedgerError::InsufficientFunds {
            available: balance,
            requested: amount,
        });
    }
    if let Some(minimum) = min_write_off {
        if amount < minimum {
            return Err(LedgerError::BelowMinimum {
                minimum,
                requested: amount,
            });
        }
    }
    Ok(amount)
}

/// Reject a write-off that would push today's total past `limit`.
pub fn check_daily_limit(
    already_today: f64,
    amount: f64,
    limit: Option<f64>,
) -> Result<(), LedgerError> {
    match limit {
        Some(limit) if already_today + amount > limit => Err(LedgerError::DailyLimitExceeded {
            limit,
            used: already_today,
            requested: amount,
        }),
        _ => Ok(()),
    }
}

/// Reason recorded on an accrual, marked when the multiplier applied.
pub fn accrual_reason(reason: &str, bonus_applied: bool) -> String {
    if bonus_applied {
        format!("{} (with bonus)", reason)
    } else {
        reason.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_tiers() {
        assert_eq!(bonus_multiplier(1.0), 1.0);
        assert_eq!(bonus_multiplier(500.0), 1.0);
        assert_eq!(bonus_multiplier(500.5), 1.05);
        assert_eq!(bonus_multiplier(1000.0), 1.05);
        assert_eq!(bonus_multiplier(1000.01), 1.1);
        assert_eq!(bonus_multiplier(10000.0), 1.1);
    }

    #[test]
    fn test_apply_bonus() {
        assert_eq!(apply_bonus(200.0), (200.0, false));
        let (credited, applied) = apply_bonus(600.0);
        assert!(applied);
        assert!((credited - 630.0).abs() < 1e-9);
        let (credited, applied) = apply_bonus(2000.0);
        assert!(applied);
        assert!((credited - 2200.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_accrual_bounds() {
        assert!(matches!(
            validate_accrual(0.0, 10000.0),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            validate_accrual(-5.0, 10000.0),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            validate_accrual(f64::NAN, 10000.0),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            validate_accrual(10000.01, 10000.0),
            Err(LedgerError::AmountTooLarge { .. })
        ));
        assert_eq!(validate_accrual(10000.0, 10000.0).unwrap(), 10000.0);
    }

    #[test]
    fn test_insufficient_funds_for_every_amount_above_balance() {
        let balance = 150.0;
        for amount in [150.01, 151.0, 200.0, 999.0, 1000.0, 5000.0, 1e9] {
            match validate_write_off(amount, balance, Some(10.0)) {
                Err(LedgerError::InsufficientFunds {
                    available,
                    requested,
                }) => {
                    assert_eq!(available, balance);
                    assert_eq!(requested, amount);
                }
                other => panic!("amount {} gave {:?}", amount, other),
            }
        }
    }

    #[test]
    fn test_write_off_minimum_is_optional() {
        assert!(matches!(
            validate_write_off(5.0, 100.0, Some(10.0)),
            Err(LedgerError::BelowMinimum { .. })
        ));
        assert_eq!(validate_write_off(5.0, 100.0, None).unwrap(), 5.0);
        assert!(matches!(
            validate_write_off(0.0, 100.0, None),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_daily_limit() {
        assert!(check_daily_limit(0.0, 1000.0, Some(1000.0)).is_ok());
        assert!(matches!(
            check_daily_limit(990.0, 20.0, Some(1000.0)),
            Err(LedgerError::DailyLimitExceeded { .. })
        ));
        assert!(check_daily_limit(1e9, 1e9, None).is_ok());
    }

    #[test]
    fn test_accrual_reason_marker() {
        assert_eq!(accrual_reason("x", false), "x");
        assert_eq!(accrual_reason("x", true), "x (with bonus)");
    }
}
