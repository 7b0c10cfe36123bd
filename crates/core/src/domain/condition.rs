use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::promise::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionId(pub String);

/// How much of the total is collected upfront.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AdvanceRule {
    Percentage(Decimal),
    FixedAmount(Decimal),
}

impl Default for AdvanceRule {
    fn default() -> Self {
        Self::Percentage(Decimal::ZERO)
    }
}

impl AdvanceRule {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Percentage(_) => "percentage",
            Self::FixedAmount(_) => "fixed_amount",
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            Self::Percentage(value) | Self::FixedAmount(value) => *value,
        }
    }

    pub fn from_parts(advance_type: &str, value: Decimal) -> Result<Self, DomainError> {
        let rule = match advance_type.trim().to_ascii_lowercase().as_str() {
            "percentage" => Self::Percentage(value),
            "fixed_amount" => Self::FixedAmount(value),
            other => {
                return Err(DomainError::invalid_input(format!(
                    "unsupported advance_type `{other}` (expected percentage|fixed_amount)"
                )))
            }
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match *self {
            Self::Percentage(pct) if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED => Err(
                DomainError::invalid_input(format!("advance percentage {pct} is outside 0..=100")),
            ),
            Self::FixedAmount(amount) if amount < Decimal::ZERO => Err(
                DomainError::invalid_input(format!("advance amount {amount} must be >= 0")),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommercialCondition {
    pub id: ConditionId,
    pub tenant_id: TenantId,
    pub name: String,
    pub discount_pct: Option<Decimal>,
    pub advance: AdvanceRule,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
}

impl CommercialCondition {
    pub fn new(
        id: ConditionId,
        tenant_id: TenantId,
        name: impl Into<String>,
        discount_pct: Option<Decimal>,
        advance: AdvanceRule,
    ) -> Result<Self, DomainError> {
        let condition = Self {
            id,
            tenant_id,
            name: name.into(),
            discount_pct,
            advance,
            valid_from: None,
            valid_until: None,
        };
        condition.validate()?;
        Ok(condition)
    }

    pub fn with_window(
        mut self,
        valid_from: Option<NaiveDate>,
        valid_until: Option<NaiveDate>,
    ) -> Result<Self, DomainError> {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(pct) = self.discount_pct {
            if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                return Err(DomainError::invalid_input(format!(
                    "discount percentage {pct} is outside 0..=100"
                )));
            }
        }
        self.advance.validate()?;

        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from > until {
                return Err(DomainError::invalid_input(format!(
                    "condition window starts {from} after it ends {until}"
                )));
            }
        }

        Ok(())
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.valid_from.map_or(true, |from| date >= from)
            && self.valid_until.map_or(true, |until| date <= until)
    }
}
