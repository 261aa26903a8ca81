//! Amount helpers shared by the split calculator and the debt ledger.
//!
//! All amounts are [`Decimal`] values quantized to two decimal places.
//! Comparisons that tolerate rounding dust use [`EPSILON`] (one cent).

use crate::core::errors::LedgerError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Tolerance for amount comparisons, one currency cent.
pub const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Largest single expense or payment accepted.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn within_epsilon(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= EPSILON
}

pub fn is_dust(value: Decimal) -> bool {
    value.abs() < EPSILON
}

pub fn validate_amount(field: &str, amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_input(
            field,
            "Invalid Amount",
            "Amount must be greater than 0",
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::invalid_input(
            field,
            "Amount Too Large",
            "Amount cannot exceed 1,000,000",
        ));
    }
    if amount != round2(amount) {
        return Err(LedgerError::invalid_input(
            field,
            "Invalid Amount",
            "Amount cannot have more than 2 decimal places",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_is_one_cent() {
        assert_eq!(EPSILON, Decimal::new(1, 2));
        assert_eq!(MAX_AMOUNT, Decimal::new(1_000_000, 0));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(Decimal::new(3335, 3)), Decimal::new(334, 2));
        assert_eq!(round2(Decimal::new(3334, 3)), Decimal::new(333, 2));
    }

    #[test]
    fn rejects_sub_cent_and_non_positive_amounts() {
        assert!(validate_amount("amount", Decimal::new(1005, 3)).is_err());
        assert!(validate_amount("amount", Decimal::ZERO).is_err());
        assert!(validate_amount("amount", Decimal::new(-5, 0)).is_err());
        assert!(validate_amount("amount", Decimal::new(1999, 2)).is_ok());
    }
}
