use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::pricing_config::PricingConfiguration;
use crate::domain::service::{CatalogService, UtilityKind};
use crate::errors::DomainError;
use crate::money::{checked_percent_of, percent_of, round_money};

/// One billable row fed to the calculator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableEntry {
    pub cost: Decimal,
    pub expense: Decimal,
    #[serde(default)]
    pub utility_kind: UtilityKind,
    pub public_price: Decimal,
    pub quantity: i32,
}

impl BillableEntry {
    pub fn from_service(service: &CatalogService, quantity: i32) -> Self {
        Self {
            cost: service.cost,
            expense: service.expense,
            utility_kind: service.utility_kind,
            public_price: service.public_price,
            quantity,
        }
    }

    fn validate(&self, index: usize) -> Result<(), DomainError> {
        if self.quantity < 0 {
            return Err(DomainError::invalid_input(format!(
                "entry {index}: quantity must be >= 0, got {}",
                self.quantity
            )));
        }
        for (field, value) in
            [("cost", self.cost), ("expense", self.expense), ("public_price", self.public_price)]
        {
            if value < Decimal::ZERO {
                return Err(DomainError::invalid_input(format!(
                    "entry {index}: {field} must be >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "target", rename_all = "snake_case")]
pub enum SalePriceMode {
    /// Sale price is the sum of each entry's list price times quantity.
    #[default]
    ListPriceSum,
    /// Sale price is an externally agreed package total, floored at the system price.
    TargetTotal(Decimal),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSummary {
    pub total_cost: Decimal,
    pub total_expense: Decimal,
    pub base_utility: Decimal,
    pub system_price: Decimal,
    pub list_total: Decimal,
    pub sale_price: Decimal,
    pub commission: Decimal,
    pub net_profit: Decimal,
    pub below_system_price: bool,
    pub trace: Vec<PricingTraceStep>,
}

pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        entries: &[BillableEntry],
        config: &PricingConfiguration,
        mode: SalePriceMode,
    ) -> Result<PricingSummary, DomainError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn price(
        &self,
        entries: &[BillableEntry],
        config: &PricingConfiguration,
        mode: SalePriceMode,
    ) -> Result<PricingSummary, DomainError> {
        calculate_pricing(entries, config, mode)
    }
}

pub fn calculate_pricing(
    entries: &[BillableEntry],
    config: &PricingConfiguration,
    mode: SalePriceMode,
) -> Result<PricingSummary, DomainError> {
    config.validate()?;
    if let SalePriceMode::TargetTotal(target) = mode {
        if target < Decimal::ZERO {
            return Err(DomainError::invalid_input(format!(
                "target total must be >= 0, got {target}"
            )));
        }
    }
    for (index, entry) in entries.iter().enumerate() {
        entry.validate(index)?;
    }

    if entries.is_empty() {
        return Ok(PricingSummary::default());
    }

    let mut total_cost = Decimal::ZERO;
    let mut total_expense = Decimal::ZERO;
    let mut base_utility = Decimal::ZERO;
    let mut list_total = Decimal::ZERO;

    for (index, entry) in entries.iter().enumerate() {
        let overflow = || {
            DomainError::invalid_input(format!("entry {index}: amounts exceed the supported range"))
        };
        let quantity = Decimal::from(entry.quantity);
        let cost = entry.cost.checked_mul(quantity).ok_or_else(overflow)?;
        let expense = entry.expense.checked_mul(quantity).ok_or_else(overflow)?;
        let loaded = cost.checked_add(expense).ok_or_else(overflow)?;
        let utility = checked_percent_of(loaded, config.margin_for(entry.utility_kind))
            .ok_or_else(overflow)?;
        let list = entry.public_price.checked_mul(quantity).ok_or_else(overflow)?;

        total_cost = total_cost.checked_add(cost).ok_or_else(overflow)?;
        total_expense = total_expense.checked_add(expense).ok_or_else(overflow)?;
        base_utility = base_utility.checked_add(utility).ok_or_else(overflow)?;
        list_total = list_total.checked_add(list).ok_or_else(overflow)?;
    }

    let totals_overflow =
        || DomainError::invalid_input("pricing totals exceed the supported range");
    let commission_factor = Decimal::ONE - config.commission_pct / Decimal::ONE_HUNDRED;
    let overprice_factor = Decimal::ONE + config.overprice_pct / Decimal::ONE_HUNDRED;
    let system_price = total_cost
        .checked_add(total_expense)
        .and_then(|sum| sum.checked_add(base_utility))
        .and_then(|subtotal| subtotal.checked_div(commission_factor))
        .and_then(|with_commission| with_commission.checked_mul(overprice_factor))
        .map(round_money)
        .ok_or_else(totals_overflow)?;
    let list_total = round_money(list_total);

    let sale_price = match mode {
        SalePriceMode::ListPriceSum => list_total,
        SalePriceMode::TargetTotal(target) => round_money(target).max(system_price),
    };
    let total_cost = round_money(total_cost);
    let total_expense = round_money(total_expense);
    let net_profit = sale_price - total_cost - total_expense;
    let commission = round_money(percent_of(sale_price, config.commission_pct));

    let trace = vec![
        step("cost", "sum(cost * quantity)", total_cost),
        step("expense", "sum(expense * quantity)", total_expense),
        step("utility", "sum((cost + expense) * quantity * margin%)", round_money(base_utility)),
        step("system_price", "subtotal / (1 - commission%) * (1 + overprice%)", system_price),
        step("sale_price", sale_price_detail(mode), sale_price),
        step("net_profit", "sale_price - cost - expense", net_profit),
    ];

    Ok(PricingSummary {
        total_cost,
        total_expense,
        base_utility: round_money(base_utility),
        system_price,
        list_total,
        sale_price,
        commission,
        net_profit,
        below_system_price: sale_price < system_price,
        trace,
    })
}

fn sale_price_detail(mode: SalePriceMode) -> &'static str {
    match mode {
        SalePriceMode::ListPriceSum => "sum(public_price * quantity)",
        SalePriceMode::TargetTotal(_) => "max(system_price, target_total)",
    }
}

fn step(stage: &str, detail: &str, amount: Decimal) -> PricingTraceStep {
    PricingTraceStep { stage: stage.to_string(), detail: detail.to_string(), amount }
}
