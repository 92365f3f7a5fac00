//! Utility functions for formatting and common operations
//!
//! Centralized formatting of currency and share quantities so report
//! sections and CLI tables agree on presentation.

use rust_decimal::Decimal;

/// Format a Decimal as US dollars: thousands separated by `,`, two
/// decimal places, `$` prefix.
///
/// # Examples
/// ```
/// use vantage::utils::format_currency;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_currency(dec!(1234.56)), "$1,234.56");
/// assert_eq!(format_currency(dec!(-500)), "$-500.00");
/// ```
pub fn format_currency(value: Decimal) -> String {
    let is_negative = value < Decimal::ZERO;
    let abs_value = value.abs();

    let formatted = format!("{:.2}", abs_value);
    let parts: Vec<&str> = formatted.split('.').collect();

    let integer_part = parts[0];
    let decimal_part = parts.get(1).unwrap_or(&"00");

    let with_separators = group_thousands(integer_part);
    let sign = if is_negative { "-" } else { "" };
    format!("${}{}.{}", sign, with_separators, decimal_part)
}

/// Format a share count with thousands separators: `1,234,567`.
///
/// # Examples
/// ```
/// use vantage::utils::format_shares;
///
/// assert_eq!(format_shares(915560382), "915,560,382");
/// assert_eq!(format_shares(42), "42");
/// ```
pub fn format_shares(shares: i64) -> String {
    let is_negative = shares < 0;
    let digits = shares.unsigned_abs().to_string();
    let grouped = group_thousands(&digits);
    if is_negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn group_thousands(digits: &str) -> String {
    digits
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec![',', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect()
}
