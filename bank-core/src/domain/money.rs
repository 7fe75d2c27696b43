//! Fixed-point money helpers
//!
//! Every monetary value is a `Decimal` carrying exactly two fractional digits,
//! matching the DECIMAL(18,2) columns in the ledger tables. Amounts coming
//! from users are parsed from strings, never from floats.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::result::{Error, Result};

/// Number of fractional digits stored for balances and amounts
pub const SCALE: u32 = 2;

/// Largest value a DECIMAL(18,2) column can hold
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999_999, SCALE)
}

/// Rescale a value to the ledger precision (pads, never rounds valid amounts)
pub fn to_fixed(value: Decimal) -> Decimal {
    let mut fixed = value;
    fixed.rescale(SCALE);
    fixed
}

/// Parse a user supplied amount string into a validated fixed-point amount
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let trimmed = input.trim();
    let amount = Decimal::from_str(trimmed)
        .map_err(|_| Error::validation(format!("invalid amount: '{}'", trimmed)))?;
    check_amount(amount)
}

/// Validate a transaction amount: positive, at most two decimals, storable
pub fn check_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("amount must be greater than 0"));
    }
    if amount.normalize().scale() > SCALE {
        return Err(Error::validation(format!(
            "amount must have at most {} decimal places",
            SCALE
        )));
    }
    if amount > max_amount() {
        return Err(Error::validation("amount exceeds the maximum supported value"));
    }
    Ok(to_fixed(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pads_to_two_decimals() {
        assert_eq!(parse_amount("50").unwrap().to_string(), "50.00");
        assert_eq!(parse_amount(" 12.5 ").unwrap().to_string(), "12.50");
        assert_eq!(parse_amount("1.230").unwrap().to_string(), "1.23");
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("0.00").is_err());
        assert!(parse_amount("-10").is_err());
    }

    #[test]
    fn test_rejects_sub_cent_precision() {
        let err = parse_amount("1.234").unwrap_err();
        assert!(err.to_string().contains("at most 2 decimal places"));
    }

    #[test]
    fn test_rejects_garbage_and_overflow() {
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("10000000000000000.00").is_err());
        assert!(parse_amount("9999999999999999.99").is_ok());
    }
}
