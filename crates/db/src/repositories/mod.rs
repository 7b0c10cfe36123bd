use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

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
use atelier_core::errors::ApplicationError;

pub mod catalog;
pub mod condition;
pub mod memory;
pub mod promise;
pub mod quote;

pub use catalog::{SqlCatalogRepository, SqlPricingConfigRepository};
pub use condition::SqlCommercialConditionRepository;
pub use memory::{
    InMemoryCatalogRepository, InMemoryCommercialConditionRepository,
    InMemoryPricingConfigRepository, InMemoryPromiseRepository, InMemoryQuoteRepository,
};
pub use promise::SqlPromiseRepository;
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` was not found")]
    Missing { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Missing { entity, id } => {
                ApplicationError::Domain(atelier_core::DomainError::not_found(entity, id))
            }
            RepositoryError::Conflict(message) => {
                ApplicationError::Domain(atelier_core::DomainError::InvariantViolation(message))
            }
            // Constraint violations fail the same way on every attempt.
            RepositoryError::Database(sqlx::Error::Database(ref db))
                if db.kind() != sqlx::error::ErrorKind::Other =>
            {
                ApplicationError::Domain(atelier_core::DomainError::InvariantViolation(
                    db.message().to_string(),
                ))
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Services of `tenant_id` among `ids`; unknown ids are simply absent.
    async fn find_services(
        &self,
        tenant_id: &TenantId,
        ids: &[ServiceId],
    ) -> Result<Vec<CatalogService>, RepositoryError>;

    async fn save(&self, service: CatalogService) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PricingConfigRepository: Send + Sync {
    async fn find_active(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<PricingConfiguration>, RepositoryError>;

    async fn save(&self, config: PricingConfiguration) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CommercialConditionRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ConditionId,
    ) -> Result<Option<CommercialCondition>, RepositoryError>;

    async fn save(&self, condition: CommercialCondition) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PromiseRepository: Send + Sync {
    async fn find_by_id(&self, id: &PromiseId) -> Result<Option<Promise>, RepositoryError>;
    async fn find_stage(
        &self,
        id: &PipelineStageId,
    ) -> Result<Option<PipelineStage>, RepositoryError>;
    async fn find_contact(&self, id: &ContactId) -> Result<Option<Contact>, RepositoryError>;
    async fn resolve_referrer_name(
        &self,
        referrer: &Referrer,
    ) -> Result<Option<String>, RepositoryError>;

    async fn save(&self, promise: Promise) -> Result<(), RepositoryError>;
    async fn save_stage(&self, stage: PipelineStage) -> Result<(), RepositoryError>;
    async fn save_contact(&self, contact: Contact) -> Result<(), RepositoryError>;
    async fn save_staff_member(&self, staff: StaffMember) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    /// Writes the header and every line item, or nothing at all.
    async fn create_with_items(
        &self,
        quote: Quote,
        items: Vec<QuoteLineItem>,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;

    /// Non-archived quotes of a promise, oldest first.
    async fn list_active_for_promise(
        &self,
        promise_id: &PromiseId,
    ) -> Result<Vec<Quote>, RepositoryError>;

    /// Line items of a quote ordered by position.
    async fn list_line_items(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<QuoteLineItem>, RepositoryError>;

    async fn update_status(&self, id: &QuoteId, status: QuoteStatus)
        -> Result<(), RepositoryError>;

    /// Sets the status and links the booked event in one write. `Conflict`
    /// when the quote already has an event or another live quote of the same
    /// promise is already booked; nothing is written then.
    async fn authorize_with_event(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
        event_id: &EventId,
    ) -> Result<(), RepositoryError>;

    /// Stores the closing terms together with the new status in one write.
    async fn close_with_terms(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
        closing: &ClosingTerms,
    ) -> Result<(), RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn decimal_column(row: &SqliteRow, name: &str) -> Result<Decimal, RepositoryError> {
    let raw: String = column(row, name)?;
    parse_decimal(name, &raw)
}

pub(crate) fn optional_decimal_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<Decimal>, RepositoryError> {
    let raw: Option<String> = column(row, name)?;
    raw.map(|raw| parse_decimal(name, &raw)).transpose()
}

fn parse_decimal(name: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| RepositoryError::Decode(format!("column `{name}` value `{raw}`: {e}")))
}

pub(crate) fn optional_date_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<NaiveDate>, RepositoryError> {
    let raw: Option<String> = column(row, name)?;
    raw.map(|raw| {
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|e| RepositoryError::Decode(format!("column `{name}` value `{raw}`: {e}")))
    })
    .transpose()
}

pub(crate) fn timestamp_column(
    row: &SqliteRow,
    name: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = column(row, name)?;
    parse_timestamp(name, &raw)
}

pub(crate) fn optional_timestamp_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let raw: Option<String> = column(row, name)?;
    raw.map(|raw| parse_timestamp(name, &raw)).transpose()
}

fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("column `{name}` value `{raw}`: {e}")))
}

pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn optional_decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(decimal_text)
}
