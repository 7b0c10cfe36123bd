pub mod catalog;
pub mod freezer;
pub mod pricing;

pub use catalog::{Catalog, CatalogLookup, PricingConfigLookup, PricingConfigs};
pub use freezer::{
    read_line_item, read_line_items, snapshot_checksum, verify_snapshot, FreezeOutcome,
    FreezeRequest, FrozenLineItem, LineItemView, NotFrozenReason, NotFrozenWarning,
    PartialFreezeWarning, SnapshotFreezer,
};
pub use pricing::{
    calculate_pricing, BillableEntry, DeterministicPricingEngine, PricingEngine, PricingSummary,
    PricingTraceStep, SalePriceMode,
};
