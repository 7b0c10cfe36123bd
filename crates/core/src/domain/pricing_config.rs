use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::promise::TenantId;
use crate::domain::service::UtilityKind;
use crate::errors::DomainError;

/// A tenant's active markup rules. Looked up fresh for every operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfiguration {
    pub tenant_id: TenantId,
    pub service_margin_pct: Decimal,
    pub product_margin_pct: Decimal,
    pub commission_pct: Decimal,
    pub overprice_pct: Decimal,
    /// Inactive configurations are kept for history but never priced against.
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl PricingConfiguration {
    pub fn margin_for(&self, kind: UtilityKind) -> Decimal {
        match kind {
            UtilityKind::Service => self.service_margin_pct,
            UtilityKind::Product => self.product_margin_pct,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("service_margin_pct", self.service_margin_pct),
            ("product_margin_pct", self.product_margin_pct),
            ("commission_pct", self.commission_pct),
            ("overprice_pct", self.overprice_pct),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(DomainError::invalid_input(format!(
                    "{field} must be in range 0..=100, got {value}"
                )));
            }
        }

        // The system price divides by (1 - commission), so 100% has no solution.
        if self.commission_pct >= Decimal::ONE_HUNDRED {
            return Err(DomainError::invalid_input("commission_pct must be below 100"));
        }

        Ok(())
    }
}
