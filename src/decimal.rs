//! Arbitrary-precision amount arithmetic
//!
//! Every comparison and computation over user amounts, fees, and min/max
//! bounds routes through here so decimal precision is never lost to native
//! floating point. Rounding is always explicit and defaults to rounding
//! down, since over-reporting a transferable amount is worse than
//! under-reporting it.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;
use tracing::warn;

/// Parse a user- or API-supplied decimal string.
///
/// Commas are accepted as decimal separators and only the first decimal
/// point is kept, matching how loosely upstream APIs and users spell
/// amounts. Returns `None` when nothing numeric remains.
pub fn parse(value: &str) -> Option<BigDecimal> {
    let mut sanitized = value.trim().replace(',', ".");

    if let Some(first_dot) = sanitized.find('.') {
        let (head, tail) = sanitized.split_at(first_dot + 1);
        sanitized = format!("{head}{}", tail.replace('.', ""));
    }

    BigDecimal::from_str(&sanitized).ok()
}

/// Round down to `decimals` places and strip trailing zeros
pub fn round_down(value: &BigDecimal, decimals: u32) -> BigDecimal {
    value
        .with_scale_round(decimals as i64, RoundingMode::Down)
        .normalized()
}

/// Render a decimal at the token's precision, rounding down
pub fn format_decimal(value: &BigDecimal, decimals: u32) -> String {
    round_down(value, decimals).to_plain_string()
}

/// Format a decimal string at the token's precision, rounding down.
///
/// Unparseable input formats as `"0"`.
pub fn format(value: &str, decimals: u32) -> String {
    match parse(value) {
        Some(parsed) => format_decimal(&parsed, decimals),
        None => {
            warn!(value, "unparseable amount, formatting as zero");
            "0".to_string()
        }
    }
}

/// Convert a major-unit amount into the token's smallest (minor) unit
pub fn to_minor_units(value: &str, decimals: u32) -> Option<String> {
    let parsed = parse(value)?;
    let shifted = parsed.with_scale_round(decimals as i64, RoundingMode::Down)
        * pow_ten(decimals as i64);
    Some(shifted.with_scale_round(0, RoundingMode::Down).to_plain_string())
}

/// Convert a minor-unit integer amount back into major units
pub fn to_major_units(value: &str, decimals: u32) -> Option<String> {
    let parsed = parse(value)?;
    Some((parsed * unit_step(decimals)).normalized().to_plain_string())
}

/// One unit at the token's smallest representable decimal place
/// (`10^-decimals`; `1` for zero-decimal tokens)
pub fn unit_step(decimals: u32) -> BigDecimal {
    BigDecimal::new(BigInt::from(1), decimals as i64)
}

/// Clamp a value into `[min, max]`
pub fn clamp(value: &BigDecimal, min: &BigDecimal, max: &BigDecimal) -> BigDecimal {
    if value < min {
        min.clone()
    } else if value > max {
        max.clone()
    } else {
        value.clone()
    }
}

/// Uplift an aggregator-quoted minimum by 1% and one smallest unit.
///
/// Quoted minimums are occasionally insufficient in practice, so the bound
/// handed to users is `quoted * 1.01`, floored to the token's precision,
/// plus one unit at the smallest decimal place.
pub fn min_with_safety_margin(quoted_min: &BigDecimal, decimals: u32) -> BigDecimal {
    let uplifted = quoted_min * BigDecimal::from_str("1.01").expect("constant parses");
    round_down(&uplifted, decimals) + unit_step(decimals)
}

fn pow_ten(exponent: i64) -> BigDecimal {
    BigDecimal::new(BigInt::from(1), -exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::Zero;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_format_rounds_down() {
        assert_eq!(format("3.999", 2), "3.99");
        assert_eq!(format("0.123456789", 8), "0.12345678");
        assert_eq!(format("5", 8), "5");
    }

    #[test]
    fn test_format_strips_trailing_zeros() {
        assert_eq!(format("3.1000", 4), "3.1");
        assert_eq!(format("2.00", 8), "2");
    }

    #[test]
    fn test_format_sanitizes_input() {
        assert_eq!(format("1,5", 2), "1.5");
        assert_eq!(format("1.2.3", 2), "1.23");
        assert_eq!(format("not a number", 2), "0");
        assert_eq!(format("", 2), "0");
    }

    #[test]
    fn test_minor_major_units() {
        assert_eq!(to_minor_units("1.5", 8).unwrap(), "150000000");
        assert_eq!(to_minor_units("0.00000001", 8).unwrap(), "1");
        assert_eq!(to_minor_units("3", 0).unwrap(), "3");
        assert_eq!(to_major_units("150000000", 8).unwrap(), "1.5");
        assert_eq!(to_major_units("1", 8).unwrap(), "0.00000001");
        assert!(to_minor_units("garbage", 8).is_none());
    }

    #[test]
    fn test_clamp() {
        let min = dec("0.01");
        let max = dec("3");
        assert_eq!(clamp(&dec("1"), &min, &max), dec("1"));
        assert_eq!(clamp(&dec("0.001"), &min, &max), min);
        assert_eq!(clamp(&dec("5"), &min, &max), max);
    }

    #[test]
    fn test_unit_step() {
        assert_eq!(unit_step(0), dec("1"));
        assert_eq!(unit_step(8), dec("0.00000001"));
    }

    #[test]
    fn test_clamp_floors_negative_spendable_amounts() {
        let zero = BigDecimal::zero();
        let cap = dec("3");
        assert_eq!(clamp(&dec("-0.05"), &zero, &cap), zero);
    }

    #[test]
    fn test_safety_margin_zero_decimals_stays_integral() {
        // 0-decimal token: 10 * 1.01 = 10.1, floored to 10, plus one unit
        let min = min_with_safety_margin(&dec("10"), 0);
        let rendered = format_decimal(&min, 0);
        assert_eq!(rendered, "11");
        assert!(!rendered.contains('.'));
    }

    #[test]
    fn test_safety_margin_eight_decimals() {
        let min = min_with_safety_margin(&dec("0.1"), 8);
        let rendered = format_decimal(&min, 8);
        assert_eq!(rendered, "0.10100001");
        let fraction = rendered.split('.').nth(1).unwrap();
        assert!(fraction.len() <= 8);
    }
}
