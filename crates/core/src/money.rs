//! Conversion between language-service money values (major units, loosely
//! typed) and the ledger's integer minor units.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

/// Converts a major-unit amount (`10`, `10.5`, `"$12,50"`) into cents.
///
/// Returns `None` for values that are not a finite number.
pub fn major_units_to_cents(value: &Value) -> Option<i64> {
    let decimal = match value {
        Value::Number(number) => parse_decimal(&number.to_string())?,
        Value::String(text) => parse_decimal(&clean_amount_text(text)?)?,
        _ => return None,
    };

    (decimal * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Reads a value that is already expressed in cents.
pub fn cents_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => {
            number.as_i64().or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v.round() as i64))
        }
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Formats cents as `$1,234.50`, with a leading minus for negatives.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    let whole = absolute / 100;
    let fraction = absolute % 100;
    format!("{sign}${}.{fraction:02}", group_thousands(whole))
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw).ok().or_else(|| Decimal::from_scientific(raw).ok())
}

fn clean_amount_text(text: &str) -> Option<String> {
    let kept: String =
        text.chars().filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-')).collect();
    if kept.is_empty() || !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    // "12,50" is a decimal comma; "1,250.00" uses it as a thousands separator.
    let normalized = if kept.contains('.') {
        kept.replace(',', "")
    } else if kept.matches(',').count() == 1 {
        kept.replace(',', ".")
    } else {
        kept.replace(',', "")
    };
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{cents_value, format_cents, major_units_to_cents};

    #[test]
    fn major_units_convert_exactly() {
        assert_eq!(major_units_to_cents(&json!(10)), Some(1000));
        assert_eq!(major_units_to_cents(&json!(10.5)), Some(1050));
        assert_eq!(major_units_to_cents(&json!(0.1)), Some(10));
        assert_eq!(major_units_to_cents(&json!(19.99)), Some(1999));
        assert_eq!(major_units_to_cents(&json!(0.005)), Some(1));
    }

    #[test]
    fn amount_strings_tolerate_symbols_and_decimal_commas() {
        assert_eq!(major_units_to_cents(&json!("$12,50")), Some(1250));
        assert_eq!(major_units_to_cents(&json!("1,250.00 USD")), Some(125_000));
        assert_eq!(major_units_to_cents(&json!("treinta")), None);
        assert_eq!(major_units_to_cents(&json!(null)), None);
    }

    #[test]
    fn cents_values_accept_integers_and_numeric_strings() {
        assert_eq!(cents_value(&json!(3500)), Some(3500));
        assert_eq!(cents_value(&json!("3500")), Some(3500));
        assert_eq!(cents_value(&json!(true)), None);
    }

    #[test]
    fn cents_format_with_grouping() {
        assert_eq!(format_cents(17_500), "$175.00");
        assert_eq!(format_cents(123_456_789), "$1,234,567.89");
        assert_eq!(format_cents(-2_005), "-$20.05");
        assert_eq!(format_cents(0), "$0.00");
    }
}
