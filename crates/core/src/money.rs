//! Shared monetary rounding and formatting.
//!
//! Every payable, contract or display amount goes through [`round_money`] and
//! [`format_money`] so a summary view and a generated contract never disagree
//! on the same quote.

use rust_decimal::{Decimal, RoundingStrategy};

pub const MONEY_SCALE: u32 = 2;

/// Largest amount accepted from callers. Sums and percentages of amounts
/// under this ceiling stay far inside the `Decimal` range.
pub fn max_amount() -> Decimal {
    Decimal::new(1_000_000_000_000_000, 0)
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Saturates at the `Decimal` bounds instead of overflowing.
pub fn percent_of(amount: Decimal, pct: Decimal) -> Decimal {
    amount.saturating_mul(pct / Decimal::ONE_HUNDRED)
}

pub fn checked_percent_of(amount: Decimal, pct: Decimal) -> Option<Decimal> {
    amount.checked_mul(pct / Decimal::ONE_HUNDRED)
}

/// Formats an amount as `$1,234.57` (negative amounts as `-$30.00`).
pub fn format_money(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let mut magnitude = rounded.abs();
    magnitude.rescale(MONEY_SCALE);
    let fixed = magnitude.to_string();
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}${grouped}.{fraction}")
}
