//! Price-integrity snapshots for quote line items.
//!
//! At quote creation the freezer copies name, price, cost and expense out of the
//! live catalog. Those copies are historical fact from then on: later catalog
//! edits never reach them. Rows created before freezing existed are read back
//! through [`read_line_items`], which falls back to live values and flags them.
//! Inactive catalog services are never frozen; they count as missing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::cpq::catalog::{CatalogLookup, PricingConfigLookup};
use crate::cpq::pricing::{
    BillableEntry, DeterministicPricingEngine, PricingEngine, SalePriceMode,
};
use crate::domain::pricing_config::PricingConfiguration;
use crate::domain::promise::TenantId;
use crate::domain::quote::{LineItemId, QuoteId, QuoteLineItem};
use crate::domain::service::{CatalogService, ServiceId, UtilityKind};
use crate::errors::DomainError;
use crate::money::round_money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeRequest {
    pub service_id: ServiceId,
    pub quantity: i32,
}

impl FreezeRequest {
    pub fn new(service_id: impl Into<String>, quantity: i32) -> Self {
        Self { service_id: ServiceId(service_id.into()), quantity }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenLineItem {
    pub service_id: ServiceId,
    pub name: String,
    pub unit_price: Decimal,
    pub cost: Decimal,
    pub expense: Decimal,
    pub utility_kind: UtilityKind,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub position: i32,
}

impl FrozenLineItem {
    pub fn into_line_item(self, id: LineItemId, quote_id: QuoteId) -> QuoteLineItem {
        QuoteLineItem {
            id,
            quote_id,
            service_id: self.service_id,
            name: Some(self.name),
            unit_price: Some(self.unit_price),
            cost: Some(self.cost),
            expense: Some(self.expense),
            utility_kind: Some(self.utility_kind),
            quantity: self.quantity,
            subtotal: Some(self.subtotal),
            position: self.position,
        }
    }

    /// Rebuilds the frozen values from a stored row, if it has them.
    pub fn from_stored(item: &QuoteLineItem) -> Option<Self> {
        if !item.has_frozen_values() {
            return None;
        }
        let unit_price = item.unit_price?;
        Some(Self {
            service_id: item.service_id.clone(),
            name: item.name.clone()?,
            unit_price,
            cost: item.cost.unwrap_or_default(),
            expense: item.expense.unwrap_or_default(),
            utility_kind: item.utility_kind.unwrap_or_default(),
            quantity: item.quantity,
            subtotal: item.subtotal.unwrap_or_else(|| {
                round_money(unit_price.saturating_mul(Decimal::from(item.quantity)))
            }),
            position: item.position,
        })
    }
}

/// Some requested services were gone from the catalog and were skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFreezeWarning {
    pub requested: usize,
    pub frozen: usize,
    pub missing: Vec<ServiceId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeOutcome {
    pub items: Vec<FrozenLineItem>,
    pub list_price: Decimal,
    pub checksum: String,
    pub warning: Option<PartialFreezeWarning>,
}

impl FreezeOutcome {
    pub fn is_complete(&self) -> bool {
        self.warning.is_none()
    }
}

pub struct SnapshotFreezer<P = DeterministicPricingEngine> {
    pricing: P,
}

impl Default for SnapshotFreezer<DeterministicPricingEngine> {
    fn default() -> Self {
        Self::new(DeterministicPricingEngine)
    }
}

impl<P> SnapshotFreezer<P>
where
    P: PricingEngine,
{
    pub fn new(pricing: P) -> Self {
        Self { pricing }
    }

    pub fn freeze<C, K>(
        &self,
        tenant_id: &TenantId,
        requests: &[FreezeRequest],
        catalog: &C,
        configs: &K,
    ) -> Result<FreezeOutcome, DomainError>
    where
        C: CatalogLookup + ?Sized,
        K: PricingConfigLookup + ?Sized,
    {
        let config = configs
            .active_pricing_config(tenant_id)
            .ok_or_else(|| DomainError::ConfigurationMissing { tenant_id: tenant_id.clone() })?;
        config.validate()?;

        if let Some(request) = requests.iter().find(|request| request.quantity < 0) {
            return Err(DomainError::invalid_input(format!(
                "service {}: quantity must be >= 0, got {}",
                request.service_id.0, request.quantity
            )));
        }

        let mut items = Vec::with_capacity(requests.len());
        let mut missing = Vec::new();

        for request in requests {
            let service = catalog
                .get_service(&request.service_id)
                .filter(|service| service.active && &service.tenant_id == tenant_id);
            let Some(service) = service else {
                missing.push(request.service_id.clone());
                continue;
            };

            let unit_price = unit_price(&self.pricing, &service, &config)?;
            let position = i32::try_from(items.len())
                .map_err(|_| DomainError::invalid_input("too many line items"))?;
            let subtotal = unit_price
                .checked_mul(Decimal::from(request.quantity))
                .map(round_money)
                .ok_or_else(|| {
                    DomainError::invalid_input(format!(
                        "service {}: subtotal exceeds the supported range",
                        request.service_id.0
                    ))
                })?;
            items.push(FrozenLineItem {
                service_id: service.id,
                name: service.name,
                unit_price,
                cost: service.cost,
                expense: service.expense,
                utility_kind: service.utility_kind,
                quantity: request.quantity,
                subtotal,
                position,
            });
        }

        let warning = if missing.is_empty() {
            None
        } else {
            warn!(
                event_name = "quote.freeze.partial",
                tenant_id = %tenant_id.0,
                requested = requests.len(),
                frozen = items.len(),
                missing = ?missing.iter().map(|id| id.0.as_str()).collect::<Vec<_>>(),
                "catalog services missing during freeze; skipped"
            );
            Some(PartialFreezeWarning { requested: requests.len(), frozen: items.len(), missing })
        };

        let list_price = items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.subtotal))
            .ok_or_else(|| DomainError::invalid_input("quote total exceeds the supported range"))?;

        Ok(FreezeOutcome {
            list_price,
            checksum: snapshot_checksum(&items),
            items,
            warning,
        })
    }

}

/// Catalog price when set; otherwise the configured system price for one unit.
fn unit_price<P>(
    pricing: &P,
    service: &CatalogService,
    config: &PricingConfiguration,
) -> Result<Decimal, DomainError>
where
    P: PricingEngine + ?Sized,
{
    if service.public_price > Decimal::ZERO {
        return Ok(round_money(service.public_price));
    }

    let summary = pricing.price(
        &[BillableEntry::from_service(service, 1)],
        config,
        SalePriceMode::ListPriceSum,
    )?;
    Ok(summary.system_price)
}

pub fn snapshot_checksum(items: &[FrozenLineItem]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(
            format!(
                "{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
                item.position,
                item.service_id.0,
                item.name,
                item.unit_price.normalize(),
                item.cost.normalize(),
                item.expense.normalize(),
                item.utility_kind.as_str(),
                item.quantity,
                item.subtotal.normalize(),
            )
            .as_bytes(),
        );
    }
    format!("sha256:{:x}", hasher.finalize())
}

/// True when every stored row is frozen and the rows still hash to `checksum`.
pub fn verify_snapshot(items: &[QuoteLineItem], checksum: &str) -> bool {
    let frozen: Option<Vec<FrozenLineItem>> =
        items.iter().map(FrozenLineItem::from_stored).collect();
    frozen.is_some_and(|frozen| snapshot_checksum(&frozen) == checksum)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFrozenReason {
    /// Values come from the live catalog and may differ from what was quoted.
    LegacyLineItem,
    /// No frozen values and no live service either; amounts are zeroed.
    CatalogServiceMissing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFrozenWarning {
    pub line_item_id: LineItemId,
    pub service_id: ServiceId,
    pub reason: NotFrozenReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemView {
    pub line_item_id: LineItemId,
    pub service_id: ServiceId,
    pub name: String,
    pub unit_price: Decimal,
    pub cost: Decimal,
    pub expense: Decimal,
    pub utility_kind: UtilityKind,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub position: i32,
    pub frozen: bool,
    pub warning: Option<NotFrozenWarning>,
}

impl LineItemView {
    pub fn to_billable(&self) -> BillableEntry {
        BillableEntry {
            cost: self.cost,
            expense: self.expense,
            utility_kind: self.utility_kind,
            public_price: self.unit_price,
            quantity: self.quantity,
        }
    }
}

/// Frozen rows are returned verbatim. Legacy rows are priced the way a freeze
/// would price them today, so a service without a public price shows the
/// configured system price (zero when the tenant has no active configuration).
pub fn read_line_item<C, K>(item: &QuoteLineItem, catalog: &C, configs: &K) -> LineItemView
where
    C: CatalogLookup + ?Sized,
    K: PricingConfigLookup + ?Sized,
{
    if let Some(frozen) = FrozenLineItem::from_stored(item) {
        return LineItemView {
            line_item_id: item.id.clone(),
            service_id: frozen.service_id,
            name: frozen.name,
            unit_price: frozen.unit_price,
            cost: frozen.cost,
            expense: frozen.expense,
            utility_kind: frozen.utility_kind,
            quantity: frozen.quantity,
            subtotal: frozen.subtotal,
            position: frozen.position,
            frozen: true,
            warning: None,
        };
    }

    let warning = |reason| {
        Some(NotFrozenWarning {
            line_item_id: item.id.clone(),
            service_id: item.service_id.clone(),
            reason,
        })
    };

    match catalog.get_service(&item.service_id) {
        Some(service) => {
            let unit_price = configs
                .active_pricing_config(&service.tenant_id)
                .and_then(|config| unit_price(&DeterministicPricingEngine, &service, &config).ok())
                .unwrap_or_else(|| round_money(service.public_price));
            LineItemView {
                line_item_id: item.id.clone(),
                service_id: item.service_id.clone(),
                name: service.name,
                unit_price,
                cost: service.cost,
                expense: service.expense,
                utility_kind: service.utility_kind,
                quantity: item.quantity,
                subtotal: round_money(unit_price.saturating_mul(Decimal::from(item.quantity))),
                position: item.position,
                frozen: false,
                warning: warning(NotFrozenReason::LegacyLineItem),
            }
        }
        None => LineItemView {
            line_item_id: item.id.clone(),
            service_id: item.service_id.clone(),
            name: item
                .name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| item.service_id.0.clone()),
            unit_price: Decimal::ZERO,
            cost: Decimal::ZERO,
            expense: Decimal::ZERO,
            utility_kind: item.utility_kind.unwrap_or_default(),
            quantity: item.quantity,
            subtotal: Decimal::ZERO,
            position: item.position,
            frozen: false,
            warning: warning(NotFrozenReason::CatalogServiceMissing),
        },
    }
}

pub fn read_line_items<C, K>(
    items: &[QuoteLineItem],
    catalog: &C,
    configs: &K,
) -> Vec<LineItemView>
where
    C: CatalogLookup + ?Sized,
    K: PricingConfigLookup + ?Sized,
{
    let mut views: Vec<LineItemView> =
        items.iter().map(|item| read_line_item(item, catalog, configs)).collect();
    views.sort_by_key(|view| view.position);
    views
}
