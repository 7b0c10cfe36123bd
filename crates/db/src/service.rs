//! Application service composing the repositories with the pure quoting core.
//!
//! Every repository call goes through the configured [`RetryPolicy`]; the
//! pricing, freezing, state and payment rules themselves live in
//! `atelier_core` and never touch storage.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use atelier_core::config::AppConfig;
use atelier_core::cpq::{
    calculate_pricing, read_line_items, verify_snapshot, Catalog, FreezeRequest, LineItemView,
    PartialFreezeWarning, PricingConfigs, PricingSummary, SalePriceMode, SnapshotFreezer,
};
use atelier_core::domain::condition::{AdvanceRule, ConditionId};
use atelier_core::domain::promise::{InMemoryReferrerDirectory, PromiseId, TenantId};
use atelier_core::domain::quote::{
    ClosingTerms, EventId, LineItemId, Quote, QuoteId, QuoteLineItem, QuoteStatus,
};
use atelier_core::domain::service::ServiceId;
use atelier_core::errors::{ApplicationError, DomainError};
use atelier_core::lifecycle::{resolve_promise, PromiseStateView};
use atelier_core::payment::{
    resolve_payment, validate_payment_input, DeferredPaymentPolicy, PaymentBreakdown,
    PaymentInput,
};

use crate::repositories::{
    CatalogRepository, CommercialConditionRepository, InMemoryCatalogRepository,
    InMemoryCommercialConditionRepository, InMemoryPricingConfigRepository,
    InMemoryPromiseRepository, InMemoryQuoteRepository, PricingConfigRepository,
    PromiseRepository, QuoteRepository, RepositoryError, SqlCatalogRepository,
    SqlCommercialConditionRepository, SqlPricingConfigRepository, SqlPromiseRepository,
    SqlQuoteRepository,
};
use crate::retry::RetryPolicy;
use crate::DbPool;

#[derive(Clone)]
pub struct QuotingRepositories {
    pub catalog: Arc<dyn CatalogRepository>,
    pub pricing_configs: Arc<dyn PricingConfigRepository>,
    pub conditions: Arc<dyn CommercialConditionRepository>,
    pub promises: Arc<dyn PromiseRepository>,
    pub quotes: Arc<dyn QuoteRepository>,
}

impl QuotingRepositories {
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            catalog: Arc::new(SqlCatalogRepository::new(pool.clone())),
            pricing_configs: Arc::new(SqlPricingConfigRepository::new(pool.clone())),
            conditions: Arc::new(SqlCommercialConditionRepository::new(pool.clone())),
            promises: Arc::new(SqlPromiseRepository::new(pool.clone())),
            quotes: Arc::new(SqlQuoteRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalogRepository::default()),
            pricing_configs: Arc::new(InMemoryPricingConfigRepository::default()),
            conditions: Arc::new(InMemoryCommercialConditionRepository::default()),
            promises: Arc::new(InMemoryPromiseRepository::default()),
            quotes: Arc::new(InMemoryQuoteRepository::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuoteRequest {
    pub tenant_id: TenantId,
    pub promise_id: PromiseId,
    pub name: String,
    pub items: Vec<FreezeRequest>,
    #[serde(default)]
    pub condition_id: Option<ConditionId>,
    #[serde(default)]
    pub negotiated_price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedQuote {
    pub quote: Quote,
    pub line_items: Vec<QuoteLineItem>,
    pub warning: Option<PartialFreezeWarning>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedQuote {
    pub quote_id: QuoteId,
    pub line_items: Vec<LineItemView>,
    pub summary: PricingSummary,
}

/// Adjustments agreed at the closing table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseQuoteRequest {
    #[serde(default)]
    pub closing_price: Option<Decimal>,
    #[serde(default)]
    pub courtesy_total: Option<Decimal>,
    #[serde(default)]
    pub bonus: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedQuote {
    pub quote: Quote,
    pub breakdown: PaymentBreakdown,
}

pub struct QuotingService {
    repositories: QuotingRepositories,
    freezer: SnapshotFreezer,
    retry: RetryPolicy,
    deferred_policy: DeferredPaymentPolicy,
}

impl QuotingService {
    pub fn new(repositories: QuotingRepositories) -> Self {
        Self {
            repositories,
            freezer: SnapshotFreezer::default(),
            retry: RetryPolicy::default(),
            deferred_policy: DeferredPaymentPolicy::default(),
        }
    }

    pub fn from_config(pool: DbPool, config: &AppConfig) -> Self {
        Self::new(QuotingRepositories::sqlite(pool))
            .with_retry_policy(RetryPolicy::from(&config.persistence))
            .with_deferred_policy(config.payments.deferred_policy())
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deferred_policy(mut self, policy: DeferredPaymentPolicy) -> Self {
        self.deferred_policy = policy;
        self
    }

    /// Freezes the requested services into a new pending quote. Services the
    /// catalog no longer has are skipped and reported in `warning`.
    pub async fn create_quote(
        &self,
        request: CreateQuoteRequest,
    ) -> Result<CreatedQuote, ApplicationError> {
        if request.name.trim().is_empty() {
            return Err(DomainError::invalid_input("quote name must not be empty").into());
        }

        let promise = self
            .persist("promise.find_by_id", || {
                self.repositories.promises.find_by_id(&request.promise_id)
            })
            .await?
            .ok_or_else(|| DomainError::not_found("promise", request.promise_id.0.clone()))?;
        if promise.tenant_id != request.tenant_id {
            return Err(DomainError::not_found("promise", request.promise_id.0.clone()).into());
        }

        if let Some(condition_id) = &request.condition_id {
            let condition = self
                .persist("condition.find_by_id", || {
                    self.repositories.conditions.find_by_id(condition_id)
                })
                .await?
                .filter(|condition| condition.tenant_id == request.tenant_id)
                .ok_or_else(|| DomainError::not_found("commercial_condition", &condition_id.0))?;
            condition.validate()?;
            if !condition.is_active_on(Utc::now().date_naive()) {
                return Err(DomainError::invalid_input(format!(
                    "commercial condition {} is not active today",
                    condition_id.0
                ))
                .into());
            }
        }

        let config = self
            .persist("pricing_config.find_active", || {
                self.repositories.pricing_configs.find_active(&request.tenant_id)
            })
            .await?
            .ok_or_else(|| DomainError::ConfigurationMissing {
                tenant_id: request.tenant_id.clone(),
            })?;

        let service_ids: Vec<ServiceId> =
            request.items.iter().map(|item| item.service_id.clone()).collect();
        let services = self
            .persist("catalog.find_services", || {
                self.repositories.catalog.find_services(&request.tenant_id, &service_ids)
            })
            .await?;

        let outcome = self.freezer.freeze(
            &request.tenant_id,
            &request.items,
            &Catalog::new(services),
            &PricingConfigs::single(config),
        )?;

        let quote_id = QuoteId(format!("Q-{}", Uuid::new_v4().simple()));
        let line_items: Vec<QuoteLineItem> = outcome
            .items
            .into_iter()
            .map(|item| {
                let id = LineItemId(format!("LI-{}", Uuid::new_v4().simple()));
                item.into_line_item(id, quote_id.clone())
            })
            .collect();
        let quote = Quote {
            id: quote_id,
            tenant_id: request.tenant_id,
            promise_id: request.promise_id,
            name: request.name.trim().to_string(),
            status: QuoteStatus::Pending,
            list_price: outcome.list_price,
            negotiated_price: request.negotiated_price,
            condition_id: request.condition_id,
            archived: false,
            event_id: None,
            snapshot_checksum: Some(outcome.checksum),
            closing: None,
            created_at: Utc::now(),
        };

        self.persist("quote.create_with_items", || {
            self.repositories.quotes.create_with_items(quote.clone(), line_items.clone())
        })
        .await?;

        info!(
            event_name = "quote.created",
            quote_id = %quote.id.0,
            tenant_id = %quote.tenant_id.0,
            promise_id = %quote.promise_id.0,
            line_items = line_items.len(),
            list_price = %quote.list_price,
            partial = outcome.warning.is_some(),
            "quote created from frozen catalog snapshot"
        );

        Ok(CreatedQuote { quote, line_items, warning: outcome.warning })
    }

    /// Line items as they should be shown, frozen values first and live
    /// catalog values for rows that predate freezing.
    pub async fn line_items_for_display(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<LineItemView>, ApplicationError> {
        let quote = self.load_quote(quote_id).await?;
        self.read_views(&quote).await
    }

    pub async fn price_quote(
        &self,
        quote_id: &QuoteId,
        mode: SalePriceMode,
    ) -> Result<PricedQuote, ApplicationError> {
        let quote = self.load_quote(quote_id).await?;
        let config = self
            .persist("pricing_config.find_active", || {
                self.repositories.pricing_configs.find_active(&quote.tenant_id)
            })
            .await?
            .ok_or_else(|| DomainError::ConfigurationMissing {
                tenant_id: quote.tenant_id.clone(),
            })?;

        let line_items = self.read_views(&quote).await?;
        let entries: Vec<_> = line_items.iter().map(LineItemView::to_billable).collect();
        let summary = calculate_pricing(&entries, &config, mode)?;

        Ok(PricedQuote { quote_id: quote.id, line_items, summary })
    }

    /// Recomputed on every call from the promise's stage and live quotes.
    pub async fn promise_state(
        &self,
        promise_id: &PromiseId,
    ) -> Result<PromiseStateView, ApplicationError> {
        let promises = &self.repositories.promises;
        let promise = self
            .persist("promise.find_by_id", || promises.find_by_id(promise_id))
            .await?
            .ok_or_else(|| DomainError::not_found("promise", promise_id.0.clone()))?;
        let contact = self
            .persist("promise.find_contact", || promises.find_contact(&promise.contact_id))
            .await?
            .ok_or_else(|| DomainError::not_found("contact", promise.contact_id.0.clone()))?;

        let stage = match &promise.pipeline_stage_id {
            Some(stage_id) => {
                self.persist("promise.find_stage", || promises.find_stage(stage_id)).await?
            }
            None => None,
        };
        let quotes = self
            .persist("quote.list_active_for_promise", || {
                self.repositories.quotes.list_active_for_promise(promise_id)
            })
            .await?;
        let referrer_name = self
            .persist("promise.resolve_referrer_name", || {
                promises.resolve_referrer_name(&promise.referrer)
            })
            .await?;

        let directory = InMemoryReferrerDirectory::for_referrer(&promise.referrer, referrer_name);
        Ok(resolve_promise(&promise, &contact, stage.as_ref(), &quotes, &directory))
    }

    /// Resolves the payment plan, stores it on the quote and moves the quote
    /// into closing.
    pub async fn close_quote(
        &self,
        quote_id: &QuoteId,
        request: CloseQuoteRequest,
    ) -> Result<ClosedQuote, ApplicationError> {
        let mut quote = self.load_quote(quote_id).await?;
        let promise = self
            .persist("promise.find_by_id", || {
                self.repositories.promises.find_by_id(&quote.promise_id)
            })
            .await?
            .ok_or_else(|| DomainError::not_found("promise", quote.promise_id.0.clone()))?;

        let (discount_pct, advance) = match &quote.condition_id {
            Some(condition_id) => {
                let condition = self
                    .persist("condition.find_by_id", || {
                        self.repositories.conditions.find_by_id(condition_id)
                    })
                    .await?
                    .ok_or_else(|| {
                        DomainError::not_found("commercial_condition", condition_id.0.clone())
                    })?;
                (condition.discount_pct, condition.advance)
            }
            None => (None, AdvanceRule::default()),
        };

        let input = PaymentInput {
            list_price: quote.list_price,
            discount_pct,
            discounted_price: None,
            negotiated_price: quote.negotiated_price,
            courtesy_total: request.courtesy_total,
            bonus: request.bonus,
            closing_override: request.closing_price,
            advance,
            event_date: promise.event_date,
        };
        validate_payment_input(&input)?;
        let breakdown = resolve_payment(&input, &self.deferred_policy);

        if quote.status != QuoteStatus::Closing {
            quote.transition_to(QuoteStatus::Closing)?;
        }
        let closing = ClosingTerms {
            closing_price: request.closing_price,
            courtesy_total: breakdown.courtesy_total,
            bonus: breakdown.bonus,
            total_payable: breakdown.total,
            advance: breakdown.advance,
            deferred: breakdown.deferred,
            closed_at: Utc::now(),
        };

        self.persist("quote.close_with_terms", || {
            self.repositories.quotes.close_with_terms(&quote.id, quote.status, &closing)
        })
        .await?;
        quote.closing = Some(closing);

        if breakdown.advance_clamped {
            warn!(
                event_name = "quote.closing.advance_clamped",
                quote_id = %quote.id.0,
                total = %breakdown.total,
                "fixed advance exceeds the total; clamped"
            );
        }
        info!(
            event_name = "quote.closing.resolved",
            quote_id = %quote.id.0,
            total_source = ?breakdown.total_source,
            total = %breakdown.total,
            advance = %breakdown.advance,
            deferred = %breakdown.deferred,
            "closing payment resolved"
        );

        Ok(ClosedQuote { quote, breakdown })
    }

    /// Authorizes a quote and links its booked event. Linking happens once,
    /// and a promise has at most one booked quote.
    pub async fn book_event(
        &self,
        quote_id: &QuoteId,
        event_id: EventId,
    ) -> Result<Quote, ApplicationError> {
        let mut quote = self.load_quote(quote_id).await?;
        let siblings = self
            .persist("quote.list_active_for_promise", || {
                self.repositories.quotes.list_active_for_promise(&quote.promise_id)
            })
            .await?;
        let booked = siblings.iter().find(|other| other.id != quote.id && other.is_booked());
        if let Some(booked) = booked {
            return Err(DomainError::InvariantViolation(format!(
                "promise {} already has booked quote {}",
                quote.promise_id.0, booked.id.0
            ))
            .into());
        }

        if !quote.status.is_authorized_family() {
            quote.transition_to(QuoteStatus::Authorized)?;
        }
        quote.link_event(event_id.clone())?;

        self.persist("quote.authorize_with_event", || {
            self.repositories.quotes.authorize_with_event(&quote.id, quote.status, &event_id)
        })
        .await?;

        info!(
            event_name = "quote.event.linked",
            quote_id = %quote.id.0,
            event_id = %event_id.0,
            "quote linked to booked event"
        );
        Ok(quote)
    }

    async fn load_quote(&self, quote_id: &QuoteId) -> Result<Quote, ApplicationError> {
        self.persist("quote.find_by_id", || self.repositories.quotes.find_by_id(quote_id))
            .await?
            .ok_or_else(|| DomainError::not_found("quote", quote_id.0.clone()).into())
    }

    async fn read_views(&self, quote: &Quote) -> Result<Vec<LineItemView>, ApplicationError> {
        let items = self
            .persist("quote.list_line_items", || {
                self.repositories.quotes.list_line_items(&quote.id)
            })
            .await?;

        let unfrozen: Vec<ServiceId> = items
            .iter()
            .filter(|item| !item.has_frozen_values())
            .map(|item| item.service_id.clone())
            .collect();
        let services = self
            .persist("catalog.find_services", || {
                self.repositories.catalog.find_services(&quote.tenant_id, &unfrozen)
            })
            .await?;
        let configs = if unfrozen.is_empty() {
            PricingConfigs::default()
        } else {
            let config = self
                .persist("pricing_config.find_active", || {
                    self.repositories.pricing_configs.find_active(&quote.tenant_id)
                })
                .await?;
            PricingConfigs::new(config.into_iter().collect())
        };

        if let Some(checksum) = &quote.snapshot_checksum {
            if !verify_snapshot(&items, checksum) {
                warn!(
                    event_name = "quote.snapshot.mismatch",
                    quote_id = %quote.id.0,
                    "stored line items no longer match the snapshot checksum"
                );
            }
        }

        Ok(read_line_items(&items, &Catalog::new(services), &configs))
    }

    async fn persist<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ApplicationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        self.retry
            .run(operation, || {
                let pending = call();
                async move { pending.await.map_err(ApplicationError::from) }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use atelier_core::cpq::{FreezeRequest, SalePriceMode};
    use atelier_core::domain::condition::{AdvanceRule, CommercialCondition, ConditionId};
    use atelier_core::domain::contact::{Contact, ContactId};
    use atelier_core::domain::pricing_config::PricingConfiguration;
    use atelier_core::domain::promise::{
        PipelineKind, PipelineStage, PipelineStageId, Promise, PromiseId, Referrer, StaffId,
        StaffMember, TenantId,
    };
    use atelier_core::domain::quote::{EventId, QuoteId, QuoteStatus};
    use atelier_core::domain::service::{CatalogService, ServiceId, UtilityKind};
    use atelier_core::errors::{ApplicationError, DomainError};
    use atelier_core::lifecycle::{PromiseState, ResolvedBy};
    use atelier_core::payment::TotalSource;

    use super::{CloseQuoteRequest, CreateQuoteRequest, QuotingRepositories, QuotingService};
    use crate::repositories::InMemoryQuoteRepository;
    use crate::retry::RetryPolicy;
    use crate::{connect_with_settings, migrations};

    fn tenant() -> TenantId {
        TenantId("studio-1".to_string())
    }

    fn catalog_service(id: &str, price: i64) -> CatalogService {
        CatalogService {
            id: ServiceId(id.to_string()),
            tenant_id: tenant(),
            category_id: None,
            name: format!("Servicio {id}"),
            public_price: Decimal::new(price, 0),
            cost: Decimal::new(40, 0),
            expense: Decimal::new(5, 0),
            utility_kind: UtilityKind::Service,
            active: true,
        }
    }

    async fn seed(repos: &QuotingRepositories) {
        repos
            .pricing_configs
            .save(PricingConfiguration {
                tenant_id: tenant(),
                service_margin_pct: Decimal::new(30, 0),
                product_margin_pct: Decimal::new(20, 0),
                commission_pct: Decimal::new(10, 0),
                overprice_pct: Decimal::ZERO,
                active: true,
            })
            .await
            .expect("config");
        repos.catalog.save(catalog_service("foto", 100)).await.expect("foto");
        repos.catalog.save(catalog_service("video", 250)).await.expect("video");
        repos
            .conditions
            .save(
                CommercialCondition::new(
                    ConditionId("CC-30".to_string()),
                    tenant(),
                    "Anticipo 30%",
                    None,
                    AdvanceRule::Percentage(Decimal::new(30, 0)),
                )
                .expect("condition"),
            )
            .await
            .expect("save condition");
        repos
            .promises
            .save_contact(Contact {
                id: ContactId("C-1".to_string()),
                tenant_id: tenant(),
                name: "Ana Ruiz".to_string(),
                phone: None,
                email: None,
            })
            .await
            .expect("contact");
        repos
            .promises
            .save_staff_member(StaffMember {
                id: StaffId("S-1".to_string()),
                tenant_id: tenant(),
                name: "Luis Mora".to_string(),
            })
            .await
            .expect("staff");
        repos
            .promises
            .save_stage(PipelineStage {
                id: PipelineStageId("stage-negotiation".to_string()),
                pipeline: PipelineKind::Commercial,
                slug: "negotiation".to_string(),
                name: "Negociación".to_string(),
                order: 2,
                active: true,
            })
            .await
            .expect("stage");
        repos
            .promises
            .save(Promise {
                id: PromiseId("P-1".to_string()),
                tenant_id: tenant(),
                contact_id: ContactId("C-1".to_string()),
                event_type: Some("boda".to_string()),
                event_date: NaiveDate::from_ymd_opt(2026, 11, 14),
                event_date_confirmed: true,
                event_name: None,
                event_location: None,
                event_duration: None,
                pipeline_stage_id: Some(PipelineStageId("stage-negotiation".to_string())),
                referrer: Referrer::StaffMember(StaffId("S-1".to_string())),
                created_at: Utc::now(),
            })
            .await
            .expect("promise");
    }

    fn request(items: Vec<FreezeRequest>) -> CreateQuoteRequest {
        CreateQuoteRequest {
            tenant_id: tenant(),
            promise_id: PromiseId("P-1".to_string()),
            name: "Paquete boda".to_string(),
            items,
            condition_id: Some(ConditionId("CC-30".to_string())),
            negotiated_price: None,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, initial_delay_ms: 1, max_delay_ms: 2 }
    }

    async fn in_memory_service() -> (QuotingRepositories, QuotingService) {
        let repos = QuotingRepositories::in_memory();
        seed(&repos).await;
        let service = QuotingService::new(repos.clone()).with_retry_policy(fast_retry());
        (repos, service)
    }

    #[tokio::test]
    async fn frozen_prices_survive_catalog_edits() {
        let (repos, service) = in_memory_service().await;
        let created = service
            .create_quote(request(vec![FreezeRequest::new("foto", 2)]))
            .await
            .expect("create");
        assert_eq!(created.quote.list_price, Decimal::new(200, 0));

        repos.catalog.save(catalog_service("foto", 150)).await.expect("reprice");

        let views = service.line_items_for_display(&created.quote.id).await.expect("views");
        assert_eq!(views.len(), 1);
        assert!(views[0].frozen);
        assert_eq!(views[0].unit_price, Decimal::new(100, 0));
        assert_eq!(views[0].subtotal, Decimal::new(200, 0));

        let priced = service
            .price_quote(&created.quote.id, SalePriceMode::ListPriceSum)
            .await
            .expect("price");
        assert_eq!(priced.summary.list_total, Decimal::new(200, 0));
        assert_eq!(priced.summary.sale_price, Decimal::new(200, 0));
    }

    #[tokio::test]
    async fn missing_services_yield_partial_quote_with_warning() {
        let (_, service) = in_memory_service().await;
        let created = service
            .create_quote(request(vec![
                FreezeRequest::new("foto", 1),
                FreezeRequest::new("gone", 1),
                FreezeRequest::new("video", 1),
            ]))
            .await
            .expect("create");

        assert_eq!(created.line_items.len(), 2);
        let warning = created.warning.expect("partial warning");
        assert_eq!(warning.requested, 3);
        assert_eq!(warning.missing, vec![ServiceId("gone".to_string())]);
        assert_eq!(created.quote.list_price, Decimal::new(350, 0));
    }

    #[tokio::test]
    async fn promise_of_another_tenant_is_not_found() {
        let repos = QuotingRepositories::in_memory();
        seed(&repos).await;
        let other = QuotingService::new(repos).with_retry_policy(fast_retry());

        let mut req = request(vec![FreezeRequest::new("foto", 1)]);
        req.tenant_id = TenantId("studio-2".to_string());
        let error = other.create_quote(req).await.expect_err("foreign tenant");
        assert!(matches!(error, ApplicationError::Domain(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn configuration_missing_surfaces_as_domain_error() {
        let repos = QuotingRepositories::in_memory();
        repos.catalog.save(catalog_service("foto", 100)).await.expect("foto");
        repos
            .promises
            .save(Promise {
                id: PromiseId("P-1".to_string()),
                tenant_id: tenant(),
                contact_id: ContactId("C-1".to_string()),
                event_type: None,
                event_date: None,
                event_date_confirmed: false,
                event_name: None,
                event_location: None,
                event_duration: None,
                pipeline_stage_id: None,
                referrer: Referrer::None,
                created_at: Utc::now(),
            })
            .await
            .expect("promise");
        let service = QuotingService::new(repos).with_retry_policy(fast_retry());

        let mut req = request(vec![FreezeRequest::new("foto", 1)]);
        req.condition_id = None;
        let error = service.create_quote(req).await.expect_err("no config");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::ConfigurationMissing { ref tenant_id })
                if tenant_id == &tenant()
        ));
    }

    #[tokio::test]
    async fn transient_write_failures_are_retried() {
        let mut repos = QuotingRepositories::in_memory();
        repos.quotes = Arc::new(InMemoryQuoteRepository::with_transient_create_failures(2));
        seed(&repos).await;
        let service = QuotingService::new(repos.clone()).with_retry_policy(fast_retry());

        let created = service
            .create_quote(request(vec![FreezeRequest::new("foto", 1)]))
            .await
            .expect("third attempt succeeds");
        assert!(repos.quotes.find_by_id(&created.quote.id).await.expect("find").is_some());

        let mut exhausted = QuotingRepositories::in_memory();
        exhausted.quotes = Arc::new(InMemoryQuoteRepository::with_transient_create_failures(5));
        seed(&exhausted).await;
        let service = QuotingService::new(exhausted).with_retry_policy(fast_retry());
        let error = service
            .create_quote(request(vec![FreezeRequest::new("foto", 1)]))
            .await
            .expect_err("attempts exhausted");
        assert!(matches!(error, ApplicationError::Persistence(_)));
    }

    #[tokio::test]
    async fn promise_state_follows_quote_lifecycle() {
        let (_, service) = in_memory_service().await;
        let promise_id = PromiseId("P-1".to_string());

        let pending = service.promise_state(&promise_id).await.expect("state");
        assert_eq!(pending.resolved_by, ResolvedBy::NoActiveNegotiation);
        assert_eq!(pending.snapshot.referrer_name.as_deref(), Some("Luis Mora"));
        assert_eq!(pending.snapshot.stage_slug.as_deref(), Some("negotiation"));

        let created = service
            .create_quote(request(vec![FreezeRequest::new("foto", 2)]))
            .await
            .expect("create");
        service
            .close_quote(&created.quote.id, CloseQuoteRequest::default())
            .await
            .expect("close");
        let closing = service.promise_state(&promise_id).await.expect("state");
        assert_eq!(closing.state, PromiseState::Closing(created.quote.id.clone()));

        service.book_event(&created.quote.id, EventId("E-1".to_string())).await.expect("book");
        let authorized = service.promise_state(&promise_id).await.expect("state");
        assert_eq!(authorized.state, PromiseState::Authorized(created.quote.id.clone()));
        assert_eq!(authorized.resolved_by, ResolvedBy::AuthorizedWithEvent);

        let again = service.book_event(&created.quote.id, EventId("E-2".to_string())).await;
        assert!(matches!(
            again,
            Err(ApplicationError::Domain(DomainError::EventAlreadyLinked { .. }))
        ));
    }

    #[tokio::test]
    async fn promise_keeps_a_single_booked_quote() {
        let (repos, service) = in_memory_service().await;
        let first = service
            .create_quote(request(vec![FreezeRequest::new("foto", 1)]))
            .await
            .expect("first");
        let second = service
            .create_quote(request(vec![FreezeRequest::new("video", 1)]))
            .await
            .expect("second");
        for id in [&first.quote.id, &second.quote.id] {
            service.close_quote(id, CloseQuoteRequest::default()).await.expect("close");
        }

        service.book_event(&first.quote.id, EventId("E-1".to_string())).await.expect("book");
        let error = service
            .book_event(&second.quote.id, EventId("E-2".to_string()))
            .await
            .expect_err("second booking");
        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));

        let untouched = repos
            .quotes
            .find_by_id(&second.quote.id)
            .await
            .expect("find")
            .expect("quote exists");
        assert_eq!(untouched.status, QuoteStatus::Closing);
        assert_eq!(untouched.event_id, None);
        let state = service.promise_state(&PromiseId("P-1".to_string())).await.expect("state");
        assert_eq!(state.state, PromiseState::Authorized(first.quote.id.clone()));
    }

    #[tokio::test]
    async fn expired_condition_cannot_be_attached() {
        let (repos, service) = in_memory_service().await;
        let window = |day| NaiveDate::from_ymd_opt(2020, 1, day);
        repos
            .conditions
            .save(
                CommercialCondition::new(
                    ConditionId("CC-2020".to_string()),
                    tenant(),
                    "Preventa 2020",
                    None,
                    AdvanceRule::Percentage(Decimal::new(50, 0)),
                )
                .and_then(|condition| condition.with_window(window(1), window(31)))
                .expect("condition"),
            )
            .await
            .expect("save condition");

        let mut req = request(vec![FreezeRequest::new("foto", 1)]);
        req.condition_id = Some(ConditionId("CC-2020".to_string()));
        let error = service.create_quote(req).await.expect_err("expired window");
        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn close_quote_splits_advance_and_deferred() {
        let (repos, service) = in_memory_service().await;
        let created = service
            .create_quote(request(vec![FreezeRequest::new("foto", 2)]))
            .await
            .expect("create");

        let closed = service
            .close_quote(&created.quote.id, CloseQuoteRequest::default())
            .await
            .expect("close");
        assert_eq!(closed.breakdown.total, Decimal::new(200, 0));
        assert_eq!(closed.breakdown.advance, Decimal::new(60, 0));
        assert_eq!(closed.breakdown.deferred, Decimal::new(140, 0));
        assert_eq!(closed.breakdown.deferred_due_date, NaiveDate::from_ymd_opt(2026, 10, 30));
        assert_eq!(closed.quote.status, QuoteStatus::Closing);

        let stored = repos
            .quotes
            .find_by_id(&created.quote.id)
            .await
            .expect("find")
            .expect("quote exists");
        assert_eq!(stored.status, QuoteStatus::Closing);
        assert_eq!(stored.closing.expect("closing").total_payable, Decimal::new(200, 0));
    }

    #[tokio::test]
    async fn closing_override_wins_and_reports_adjustment() {
        let (_, service) = in_memory_service().await;
        let created = service
            .create_quote(request(vec![FreezeRequest::new("foto", 10)]))
            .await
            .expect("create");

        let closed = service
            .close_quote(
                &created.quote.id,
                CloseQuoteRequest {
                    closing_price: Some(Decimal::new(820, 0)),
                    courtesy_total: Some(Decimal::new(100, 0)),
                    bonus: Some(Decimal::new(50, 0)),
                },
            )
            .await
            .expect("close");

        assert_eq!(closed.breakdown.total_source, TotalSource::ClosingOverride);
        assert_eq!(closed.breakdown.total, Decimal::new(820, 0));
        assert_eq!(closed.breakdown.closing_adjustment, Some(Decimal::new(-30, 0)));
        assert_eq!(closed.breakdown.advance + closed.breakdown.deferred, Decimal::new(820, 0));
    }

    #[tokio::test]
    async fn unknown_quote_is_not_found() {
        let (_, service) = in_memory_service().await;
        let error = service
            .line_items_for_display(&QuoteId("Q-404".to_string()))
            .await
            .expect_err("missing quote");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::NotFound { entity: "quote", .. })
        ));
    }

    #[tokio::test]
    async fn sqlite_backed_service_creates_and_closes_atomically() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repos = QuotingRepositories::sqlite(pool);
        seed(&repos).await;
        let service = QuotingService::new(repos.clone()).with_retry_policy(fast_retry());

        let created = service
            .create_quote(request(vec![
                FreezeRequest::new("foto", 2),
                FreezeRequest::new("video", 1),
            ]))
            .await
            .expect("create");
        let stored = repos.quotes.list_line_items(&created.quote.id).await.expect("items");
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|item| item.has_frozen_values()));

        let closed = service
            .close_quote(&created.quote.id, CloseQuoteRequest::default())
            .await
            .expect("close");
        assert_eq!(closed.breakdown.total, Decimal::new(450, 0));
        assert_eq!(closed.breakdown.advance, Decimal::new(135, 0));

        let state = service.promise_state(&PromiseId("P-1".to_string())).await.expect("state");
        assert_eq!(state.closing_quote_id(), Some(&created.quote.id));
    }
}
