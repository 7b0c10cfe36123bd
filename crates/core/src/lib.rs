pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod money;
pub mod payment;

pub use cpq::{
    calculate_pricing, BillableEntry, FreezeOutcome, FreezeRequest, LineItemView, PricingSummary,
    SalePriceMode, SnapshotFreezer,
};
pub use domain::condition::{AdvanceRule, CommercialCondition, ConditionId};
pub use domain::contact::{Contact, ContactId};
pub use domain::pricing_config::PricingConfiguration;
pub use domain::promise::{
    PipelineKind, PipelineStage, PipelineStageId, Promise, PromiseId, Referrer, StaffId, TenantId,
};
pub use domain::quote::{
    ClosingTerms, EventId, LineItemId, Quote, QuoteId, QuoteLineItem, QuoteStatus,
};
pub use domain::service::{CatalogService, CategoryId, ServiceId, UtilityKind};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{resolve_promise, resolve_state, PromiseState, PromiseStateView, ResolvedBy};
pub use money::{format_money, round_money};
pub use payment::{
    resolve_payment, validate_payment_input, DeferredPaymentPolicy, PaymentBreakdown, PaymentInput,
};
