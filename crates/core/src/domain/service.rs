use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::promise::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

/// Selects which configured margin applies to an entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityKind {
    #[default]
    Service,
    Product,
}

impl UtilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Product => "product",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "service" => Some(Self::Service),
            "product" => Some(Self::Product),
            _ => None,
        }
    }
}

/// A live catalog entry. Other operators may edit it at any time, so quotes
/// never reference these values directly after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    pub id: ServiceId,
    pub tenant_id: TenantId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub public_price: Decimal,
    pub cost: Decimal,
    pub expense: Decimal,
    pub utility_kind: UtilityKind,
    pub active: bool,
}
