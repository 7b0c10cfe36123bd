use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::RwLock;

use atelier_core::domain::condition::{CommercialCondition, ConditionId};
use atelier_core::domain::contact::{Contact, ContactId};
use atelier_core::domain::pricing_config::PricingConfiguration;
use atelier_core::domain::promise::{
    PipelineStage, PipelineStageId, Promise, PromiseId, Referrer, StaffMember, TenantId,
};
use atelier_core::domain::quote::{
    ClosingTerms, EventId, Quote, QuoteId, QuoteLineItem, QuoteStatus,
};
use atelier_core::domain::service::{CatalogService, ServiceId};

use super::{
    CatalogRepository, CommercialConditionRepository, PricingConfigRepository, PromiseRepository,
    QuoteRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    services: RwLock<HashMap<(String, String), CatalogService>>,
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn find_services(
        &self,
        tenant_id: &TenantId,
        ids: &[ServiceId],
    ) -> Result<Vec<CatalogService>, RepositoryError> {
        let services = self.services.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| services.get(&(tenant_id.0.clone(), id.0.clone())))
            .cloned()
            .collect())
    }

    async fn save(&self, service: CatalogService) -> Result<(), RepositoryError> {
        let mut services = self.services.write().await;
        services.insert((service.tenant_id.0.clone(), service.id.0.clone()), service);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPricingConfigRepository {
    configs: RwLock<HashMap<String, PricingConfiguration>>,
}

#[async_trait::async_trait]
impl PricingConfigRepository for InMemoryPricingConfigRepository {
    async fn find_active(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<PricingConfiguration>, RepositoryError> {
        let configs = self.configs.read().await;
        Ok(configs.get(&tenant_id.0).filter(|config| config.active).cloned())
    }

    async fn save(&self, config: PricingConfiguration) -> Result<(), RepositoryError> {
        let mut configs = self.configs.write().await;
        configs.insert(config.tenant_id.0.clone(), config);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCommercialConditionRepository {
    conditions: RwLock<HashMap<String, CommercialCondition>>,
}

#[async_trait::async_trait]
impl CommercialConditionRepository for InMemoryCommercialConditionRepository {
    async fn find_by_id(
        &self,
        id: &ConditionId,
    ) -> Result<Option<CommercialCondition>, RepositoryError> {
        let conditions = self.conditions.read().await;
        Ok(conditions.get(&id.0).cloned())
    }

    async fn save(&self, condition: CommercialCondition) -> Result<(), RepositoryError> {
        let mut conditions = self.conditions.write().await;
        conditions.insert(condition.id.0.clone(), condition);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPromiseRepository {
    promises: RwLock<HashMap<String, Promise>>,
    stages: RwLock<HashMap<String, PipelineStage>>,
    contacts: RwLock<HashMap<String, Contact>>,
    staff: RwLock<HashMap<String, StaffMember>>,
}

#[async_trait::async_trait]
impl PromiseRepository for InMemoryPromiseRepository {
    async fn find_by_id(&self, id: &PromiseId) -> Result<Option<Promise>, RepositoryError> {
        let promises = self.promises.read().await;
        Ok(promises.get(&id.0).cloned())
    }

    async fn find_stage(
        &self,
        id: &PipelineStageId,
    ) -> Result<Option<PipelineStage>, RepositoryError> {
        let stages = self.stages.read().await;
        Ok(stages.get(&id.0).cloned())
    }

    async fn find_contact(&self, id: &ContactId) -> Result<Option<Contact>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts.get(&id.0).cloned())
    }

    async fn resolve_referrer_name(
        &self,
        referrer: &Referrer,
    ) -> Result<Option<String>, RepositoryError> {
        Ok(match referrer {
            Referrer::Contact(id) => {
                self.contacts.read().await.get(&id.0).map(|contact| contact.name.clone())
            }
            Referrer::StaffMember(id) => {
                self.staff.read().await.get(&id.0).map(|staff| staff.name.clone())
            }
            Referrer::None => None,
        })
    }

    async fn save(&self, promise: Promise) -> Result<(), RepositoryError> {
        let mut promises = self.promises.write().await;
        promises.insert(promise.id.0.clone(), promise);
        Ok(())
    }

    async fn save_stage(&self, stage: PipelineStage) -> Result<(), RepositoryError> {
        let mut stages = self.stages.write().await;
        stages.insert(stage.id.0.clone(), stage);
        Ok(())
    }

    async fn save_contact(&self, contact: Contact) -> Result<(), RepositoryError> {
        let mut contacts = self.contacts.write().await;
        contacts.insert(contact.id.0.clone(), contact);
        Ok(())
    }

    async fn save_staff_member(&self, staff: StaffMember) -> Result<(), RepositoryError> {
        let mut members = self.staff.write().await;
        members.insert(staff.id.0.clone(), staff);
        Ok(())
    }
}

#[derive(Default)]
struct QuoteStore {
    quotes: HashMap<String, Quote>,
    line_items: HashMap<String, Vec<QuoteLineItem>>,
}

/// Quote store with optional injected write failures for exercising retries.
#[derive(Default)]
pub struct InMemoryQuoteRepository {
    store: RwLock<QuoteStore>,
    failing_creates: AtomicU32,
}

impl InMemoryQuoteRepository {
    /// The next `count` calls to `create_with_items` fail with a pool timeout.
    pub fn with_transient_create_failures(count: u32) -> Self {
        Self { failing_creates: AtomicU32::new(count), ..Self::default() }
    }
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn create_with_items(
        &self,
        quote: Quote,
        items: Vec<QuoteLineItem>,
    ) -> Result<(), RepositoryError> {
        let injected = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if injected.is_ok() {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut store = self.store.write().await;
        if store.quotes.contains_key(&quote.id.0) {
            return Err(RepositoryError::Conflict(format!("quote {} already exists", quote.id.0)));
        }

        let mut items = items;
        items.sort_by_key(|item| item.position);
        store.line_items.insert(quote.id.0.clone(), items);
        store.quotes.insert(quote.id.0.clone(), quote);
        Ok(())
    }

    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.quotes.get(&id.0).cloned())
    }

    async fn list_active_for_promise(
        &self,
        promise_id: &PromiseId,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let store = self.store.read().await;
        let mut quotes: Vec<Quote> = store
            .quotes
            .values()
            .filter(|quote| &quote.promise_id == promise_id && !quote.archived)
            .cloned()
            .collect();
        quotes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(quotes)
    }

    async fn list_line_items(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<QuoteLineItem>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.line_items.get(&quote_id.0).cloned().unwrap_or_default())
    }

    async fn update_status(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let quote = store.quotes.get_mut(&id.0).ok_or_else(|| missing_quote(id))?;
        quote.status = status;
        Ok(())
    }

    async fn authorize_with_event(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
        event_id: &EventId,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let quote = store.quotes.get(&id.0).ok_or_else(|| missing_quote(id))?;
        if let Some(existing) = &quote.event_id {
            return Err(RepositoryError::Conflict(format!(
                "quote {} is already linked to event {}",
                id.0, existing.0
            )));
        }
        let promise_id = quote.promise_id.clone();
        let sibling_booked = store
            .quotes
            .values()
            .any(|other| other.id != *id && other.promise_id == promise_id && other.is_booked());
        if sibling_booked {
            return Err(RepositoryError::Conflict(format!(
                "another quote of the promise of {} already has a booked event",
                id.0
            )));
        }

        let quote = store.quotes.get_mut(&id.0).ok_or_else(|| missing_quote(id))?;
        quote.status = status;
        quote.event_id = Some(event_id.clone());
        Ok(())
    }

    async fn close_with_terms(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
        closing: &ClosingTerms,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let quote = store.quotes.get_mut(&id.0).ok_or_else(|| missing_quote(id))?;
        quote.status = status;
        quote.closing = Some(closing.clone());
        Ok(())
    }
}

fn missing_quote(id: &QuoteId) -> RepositoryError {
    RepositoryError::Missing { entity: "quote", id: id.0.clone() }
}
