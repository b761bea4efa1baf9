//! Decimal amount handling shared by quoting and matching.
//!
//! Orders carry their quoted crypto amount as an exact decimal string. Chains report raw
//! integer units. Both sides are reduced to the same canonical string before they are compared.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Largest scale `rust_decimal` can represent.
const MAX_SCALE: u32 = 28;

/// Converts `raw` smallest units with `decimals` places into a decimal value.
pub fn from_units(raw: u128, decimals: u32) -> Option<Decimal> {
    if decimals > MAX_SCALE {
        return None;
    }
    let raw = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .ok()
        .map(|d| d.normalize())
}

/// Parses an amount string, accepting plain and scientific notation.
pub fn parse(amount: &str) -> Option<Decimal> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = if trimmed.contains(['e', 'E']) {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    };
    parsed.ok().map(|d| d.normalize())
}

/// Canonical rendering: no trailing zeros, no exponent.
pub fn canonical(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Canonical rendering of a quoted amount string, or `None` when it is not a number.
pub fn canonical_str(amount: &str) -> Option<String> {
    parse(amount).map(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_units_normalize_like_quotes() {
        let raw = from_units(1_000_000, 6).unwrap();
        assert_eq!(canonical(raw), canonical_str("1").unwrap());
        assert_eq!(canonical(raw), "1");
    }

    #[test]
    fn trailing_zeros_do_not_change_the_key() {
        assert_eq!(canonical_str("10.00").unwrap(), "10");
        assert_eq!(canonical_str("12.340").unwrap(), "12.34");
        assert_eq!(canonical(from_units(12_340_000, 6).unwrap()), "12.34");
    }

    #[test]
    fn eighteen_decimal_tokens_fit() {
        let raw = 15_500_000_000_000_000_000u128;
        assert_eq!(canonical(from_units(raw, 18).unwrap()), "15.5");
    }

    #[test]
    fn scientific_notation_is_accepted() {
        assert_eq!(canonical_str("1.5E7").unwrap(), "15000000");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(canonical_str("").is_none());
        assert!(canonical_str("ten").is_none());
        assert!(from_units(1, 40).is_none());
    }
}
