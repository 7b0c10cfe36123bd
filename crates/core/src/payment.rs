//! Closing-time payment resolution.
//!
//! Turns a list price plus the negotiated adjustments of a quote into the
//! amount the client owes, split into an advance and a deferred remainder.
//! [`resolve_payment`] is total over its input; boundaries that accept raw
//! numbers call [`validate_payment_input`] first.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::condition::AdvanceRule;
use crate::errors::DomainError;
use crate::money::{format_money, max_amount, percent_of, round_money};

pub const DEFAULT_DEFERRED_DAYS_BEFORE_EVENT: u32 = 15;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    pub list_price: Decimal,
    #[serde(default)]
    pub discount_pct: Option<Decimal>,
    #[serde(default)]
    pub discounted_price: Option<Decimal>,
    #[serde(default)]
    pub negotiated_price: Option<Decimal>,
    #[serde(default)]
    pub courtesy_total: Option<Decimal>,
    #[serde(default)]
    pub bonus: Option<Decimal>,
    #[serde(default)]
    pub closing_override: Option<Decimal>,
    #[serde(default)]
    pub advance: AdvanceRule,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
}

/// When the deferred remainder falls due, relative to the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredPaymentPolicy {
    pub days_before_event: u32,
}

impl Default for DeferredPaymentPolicy {
    fn default() -> Self {
        Self { days_before_event: DEFAULT_DEFERRED_DAYS_BEFORE_EVENT }
    }
}

impl DeferredPaymentPolicy {
    pub fn due_date(&self, event_date: NaiveDate) -> Option<NaiveDate> {
        event_date.checked_sub_days(Days::new(u64::from(self.days_before_event)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalSource {
    ClosingOverride,
    NegotiatedPrice,
    ListLessAdjustments,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentLineKind {
    Discount,
    Courtesies,
    Bonus,
    NegotiationSavings,
    ClosingAdjustment,
}

impl PaymentLineKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Discount => "Descuento",
            Self::Courtesies => "Cortesías",
            Self::Bonus => "Bono",
            Self::NegotiationSavings => "Ahorro negociado",
            Self::ClosingAdjustment => "Ajuste por cierre",
        }
    }
}

/// Informational line; signed the way it moves the price the client sees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub kind: PaymentLineKind,
    pub label: String,
    pub amount: Decimal,
    pub display: String,
}

impl PaymentLine {
    fn new(kind: PaymentLineKind, amount: Decimal) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            amount,
            display: format_money(amount),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub list_price: Decimal,
    pub discount_amount: Decimal,
    pub courtesy_total: Decimal,
    pub bonus: Decimal,
    pub savings: Option<Decimal>,
    pub closing_adjustment: Option<Decimal>,
    pub total: Decimal,
    pub total_source: TotalSource,
    pub advance: Decimal,
    pub deferred: Decimal,
    pub advance_clamped: bool,
    pub deferred_due_date: Option<NaiveDate>,
    pub lines: Vec<PaymentLine>,
}

impl PaymentBreakdown {
    pub fn total_display(&self) -> String {
        format_money(self.total)
    }
}

pub fn validate_payment_input(input: &PaymentInput) -> Result<(), DomainError> {
    let amounts = [
        ("list_price", Some(input.list_price)),
        ("discounted_price", input.discounted_price),
        ("negotiated_price", input.negotiated_price),
        ("courtesy_total", input.courtesy_total),
        ("bonus", input.bonus),
        ("closing_override", input.closing_override),
    ];
    for (field, value) in amounts {
        if let Some(value) = value.filter(|value| *value < Decimal::ZERO) {
            return Err(DomainError::invalid_input(format!("{field} must be >= 0, got {value}")));
        }
    }
    let fixed_advance = match input.advance {
        AdvanceRule::FixedAmount(value) => Some(value),
        AdvanceRule::Percentage(_) => None,
    };
    let ceiling = max_amount();
    for (field, value) in amounts.into_iter().chain([("advance", fixed_advance)]) {
        if let Some(value) = value.filter(|value| *value > ceiling) {
            return Err(DomainError::invalid_input(format!(
                "{field} {value} exceeds the supported maximum {ceiling}"
            )));
        }
    }

    if let Some(pct) = input.discount_pct {
        if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
            return Err(DomainError::invalid_input(format!(
                "discount percentage {pct} is outside 0..=100"
            )));
        }
    }
    if let Some(discounted) = input.discounted_price {
        if discounted > input.list_price {
            return Err(DomainError::invalid_input(format!(
                "discounted price {discounted} exceeds list price {}",
                input.list_price
            )));
        }
    }
    input.advance.validate()?;

    let list = round_money(input.list_price);
    let adjusted = list
        .saturating_sub(discount_amount(input, list))
        .saturating_sub(amount(input.courtesy_total));
    if input.closing_override.is_none()
        && negotiated_below_list(input, list).is_none()
        && adjusted < Decimal::ZERO
    {
        return Err(DomainError::invalid_input(format!(
            "discount and courtesies push the total below zero ({adjusted})"
        )));
    }

    Ok(())
}

pub fn resolve_payment(input: &PaymentInput, policy: &DeferredPaymentPolicy) -> PaymentBreakdown {
    let list_price = round_money(input.list_price);
    let discount_amount = discount_amount(input, list_price);
    let courtesy_total = amount(input.courtesy_total);
    let bonus = amount(input.bonus);

    let mut savings = None;
    let mut closing_adjustment = None;
    let (total, total_source) = if let Some(closing) = input.closing_override {
        let closing = round_money(closing);
        let expected = list_price.saturating_sub(courtesy_total).saturating_sub(bonus);
        closing_adjustment = Some(closing.saturating_sub(expected));
        (closing, TotalSource::ClosingOverride)
    } else if let Some(negotiated) = negotiated_below_list(input, list_price) {
        savings = Some(list_price.saturating_sub(negotiated));
        (negotiated, TotalSource::NegotiatedPrice)
    } else {
        let total = list_price.saturating_sub(discount_amount).saturating_sub(courtesy_total);
        (total, TotalSource::ListLessAdjustments)
    };

    let (advance, advance_clamped) = advance_for(input.advance, total);
    let deferred = total - advance;

    let mut lines = Vec::new();
    let adjustments = [
        (PaymentLineKind::Discount, -discount_amount),
        (PaymentLineKind::Courtesies, -courtesy_total),
        (PaymentLineKind::Bonus, -bonus),
        (PaymentLineKind::NegotiationSavings, -savings.unwrap_or_default()),
        (PaymentLineKind::ClosingAdjustment, closing_adjustment.unwrap_or_default()),
    ];
    for (kind, value) in adjustments {
        if !value.is_zero() {
            lines.push(PaymentLine::new(kind, value));
        }
    }

    PaymentBreakdown {
        list_price,
        discount_amount,
        courtesy_total,
        bonus,
        savings,
        closing_adjustment,
        total,
        total_source,
        advance,
        deferred,
        advance_clamped,
        deferred_due_date: input.event_date.and_then(|date| policy.due_date(date)),
        lines,
    }
}

fn amount(value: Option<Decimal>) -> Decimal {
    value.map(round_money).unwrap_or_default()
}

fn discount_amount(input: &PaymentInput, list_price: Decimal) -> Decimal {
    match (input.discounted_price, input.discount_pct) {
        (Some(discounted), _) => list_price.saturating_sub(round_money(discounted)),
        (None, Some(pct)) => round_money(percent_of(list_price, pct)),
        (None, None) => Decimal::ZERO,
    }
}

fn negotiated_below_list(input: &PaymentInput, list_price: Decimal) -> Option<Decimal> {
    input.negotiated_price.map(round_money).filter(|negotiated| *negotiated < list_price)
}

/// Advance never exceeds the total; the flag records that it had to be cut.
fn advance_for(rule: AdvanceRule, total: Decimal) -> (Decimal, bool) {
    let requested = match rule {
        AdvanceRule::Percentage(pct) => round_money(percent_of(total, pct)),
        AdvanceRule::FixedAmount(value) => round_money(value),
    };
    let ceiling = total.max(Decimal::ZERO);
    if requested > ceiling {
        (ceiling, matches!(rule, AdvanceRule::FixedAmount(_)))
    } else {
        (requested.max(Decimal::ZERO), false)
    }
}
