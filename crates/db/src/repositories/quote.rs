use sqlx::sqlite::SqliteRow;
use tracing::debug;

use atelier_core::domain::condition::ConditionId;
use atelier_core::domain::promise::{PromiseId, TenantId};
use atelier_core::domain::quote::{
    ClosingTerms, EventId, LineItemId, Quote, QuoteId, QuoteLineItem, QuoteStatus,
};
use atelier_core::domain::service::{ServiceId, UtilityKind};

use super::{
    column, decimal_column, decimal_text, optional_decimal_column, optional_decimal_text,
    optional_timestamp_column, timestamp_column, QuoteRepository, RepositoryError,
};
use crate::DbPool;

const QUOTE_COLUMNS: &str = "id, tenant_id, promise_id, name, status, list_price,
    negotiated_price, condition_id, archived, event_id, snapshot_checksum, closing_price,
    courtesy_total, bonus, total_payable, advance_amount, deferred_amount, closed_at, created_at";

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_quote(row: &SqliteRow) -> Result<Quote, RepositoryError> {
    let status: String = column(row, "status")?;
    let condition_id: Option<String> = column(row, "condition_id")?;
    let event_id: Option<String> = column(row, "event_id")?;
    let archived: i64 = column(row, "archived")?;

    Ok(Quote {
        id: QuoteId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        promise_id: PromiseId(column(row, "promise_id")?),
        name: column(row, "name")?,
        status: QuoteStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown quote status `{status}`")))?,
        list_price: decimal_column(row, "list_price")?,
        negotiated_price: optional_decimal_column(row, "negotiated_price")?,
        condition_id: condition_id.map(ConditionId),
        archived: archived != 0,
        event_id: event_id.map(EventId),
        snapshot_checksum: column(row, "snapshot_checksum")?,
        closing: row_to_closing(row)?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

/// Closing terms exist once `closed_at` is set; the amounts travel with it.
fn row_to_closing(row: &SqliteRow) -> Result<Option<ClosingTerms>, RepositoryError> {
    let Some(closed_at) = optional_timestamp_column(row, "closed_at")? else {
        return Ok(None);
    };

    Ok(Some(ClosingTerms {
        closing_price: optional_decimal_column(row, "closing_price")?,
        courtesy_total: decimal_column(row, "courtesy_total")?,
        bonus: decimal_column(row, "bonus")?,
        total_payable: decimal_column(row, "total_payable")?,
        advance: decimal_column(row, "advance_amount")?,
        deferred: decimal_column(row, "deferred_amount")?,
        closed_at,
    }))
}

fn row_to_line_item(row: &SqliteRow) -> Result<QuoteLineItem, RepositoryError> {
    let utility_kind: Option<String> = column(row, "utility_kind")?;
    let utility_kind = utility_kind
        .map(|raw| {
            UtilityKind::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown utility_kind `{raw}`")))
        })
        .transpose()?;

    Ok(QuoteLineItem {
        id: LineItemId(column(row, "id")?),
        quote_id: QuoteId(column(row, "quote_id")?),
        service_id: ServiceId(column(row, "service_id")?),
        name: column(row, "name")?,
        unit_price: optional_decimal_column(row, "unit_price")?,
        cost: optional_decimal_column(row, "cost")?,
        expense: optional_decimal_column(row, "expense")?,
        utility_kind,
        quantity: column(row, "quantity")?,
        subtotal: optional_decimal_column(row, "subtotal")?,
        position: column(row, "position")?,
    })
}

fn missing_quote(id: &QuoteId) -> RepositoryError {
    RepositoryError::Missing { entity: "quote", id: id.0.clone() }
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn create_with_items(
        &self,
        quote: Quote,
        items: Vec<QuoteLineItem>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO quote (id, tenant_id, promise_id, name, status, list_price,
                                negotiated_price, condition_id, archived, event_id,
                                snapshot_checksum, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quote.id.0)
        .bind(&quote.tenant_id.0)
        .bind(&quote.promise_id.0)
        .bind(&quote.name)
        .bind(quote.status.as_str())
        .bind(decimal_text(quote.list_price))
        .bind(optional_decimal_text(quote.negotiated_price))
        .bind(quote.condition_id.as_ref().map(|id| id.0.as_str()))
        .bind(quote.archived)
        .bind(quote.event_id.as_ref().map(|id| id.0.as_str()))
        .bind(&quote.snapshot_checksum)
        .bind(quote.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for item in &items {
            sqlx::query(
                "INSERT INTO quote_line_item (id, quote_id, service_id, name, unit_price, cost,
                                              expense, utility_kind, quantity, subtotal, position)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&item.id.0)
            .bind(&item.quote_id.0)
            .bind(&item.service_id.0)
            .bind(&item.name)
            .bind(optional_decimal_text(item.unit_price))
            .bind(optional_decimal_text(item.cost))
            .bind(optional_decimal_text(item.expense))
            .bind(item.utility_kind.map(|kind| kind.as_str()))
            .bind(item.quantity)
            .bind(optional_decimal_text(item.subtotal))
            .bind(item.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            event_name = "quote.persisted",
            quote_id = %quote.id.0,
            line_items = items.len(),
            "quote and line items committed"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let sql = format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        row.as_ref().map(row_to_quote).transpose()
    }

    async fn list_active_for_promise(
        &self,
        promise_id: &PromiseId,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let sql = format!(
            "SELECT {QUOTE_COLUMNS} FROM quote
             WHERE promise_id = ? AND archived = 0
             ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql).bind(&promise_id.0).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_quote).collect()
    }

    async fn list_line_items(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<QuoteLineItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, quote_id, service_id, name, unit_price, cost, expense, utility_kind,
                    quantity, subtotal, position
             FROM quote_line_item
             WHERE quote_id = ?
             ORDER BY position, id",
        )
        .bind(&quote_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_line_item).collect()
    }

    async fn update_status(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE quote SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(missing_quote(id));
        }
        Ok(())
    }

    async fn authorize_with_event(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
        event_id: &EventId,
    ) -> Result<(), RepositoryError> {
        let family = vec!["?"; QuoteStatus::AUTHORIZED_FAMILY.len()].join(", ");
        let sql = format!(
            "UPDATE quote SET status = ?, event_id = ?
             WHERE id = ? AND event_id IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM quote AS booked
                   WHERE booked.promise_id = quote.promise_id
                     AND booked.id <> quote.id
                     AND booked.archived = 0
                     AND booked.event_id IS NOT NULL
                     AND booked.status IN ({family})
               )"
        );
        let mut statement =
            sqlx::query(&sql).bind(status.as_str()).bind(&event_id.0).bind(&id.0);
        for booked in QuoteStatus::AUTHORIZED_FAMILY {
            statement = statement.bind(booked.as_str());
        }
        let result = statement.execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            debug!(quote_id = %id.0, event_id = %event_id.0, "quote authorized with event");
            return Ok(());
        }

        let existing: Option<Option<String>> =
            sqlx::query_scalar("SELECT event_id FROM quote WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;
        match existing {
            None => Err(missing_quote(id)),
            Some(Some(linked)) => Err(RepositoryError::Conflict(format!(
                "quote {} is already linked to event {linked}",
                id.0
            ))),
            Some(None) => Err(RepositoryError::Conflict(format!(
                "another quote of the promise of {} already has a booked event",
                id.0
            ))),
        }
    }

    async fn close_with_terms(
        &self,
        id: &QuoteId,
        status: QuoteStatus,
        closing: &ClosingTerms,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE quote SET
                 status = ?,
                 closing_price = ?,
                 courtesy_total = ?,
                 bonus = ?,
                 total_payable = ?,
                 advance_amount = ?,
                 deferred_amount = ?,
                 closed_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(optional_decimal_text(closing.closing_price))
        .bind(decimal_text(closing.courtesy_total))
        .bind(decimal_text(closing.bonus))
        .bind(decimal_text(closing.total_payable))
        .bind(decimal_text(closing.advance))
        .bind(decimal_text(closing.deferred))
        .bind(closing.closed_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(missing_quote(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use atelier_core::domain::contact::{Contact, ContactId};
    use atelier_core::domain::promise::{Promise, PromiseId, Referrer, TenantId};
    use atelier_core::domain::quote::{
        ClosingTerms, EventId, LineItemId, Quote, QuoteId, QuoteLineItem, QuoteStatus,
    };
    use atelier_core::domain::service::{ServiceId, UtilityKind};

    use super::SqlQuoteRepository;
    use crate::repositories::{
        PromiseRepository, QuoteRepository, RepositoryError, SqlPromiseRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, SqlQuoteRepository) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let promises = SqlPromiseRepository::new(pool.clone());
        promises
            .save_contact(Contact {
                id: ContactId("C-1".to_string()),
                tenant_id: TenantId("studio-1".to_string()),
                name: "Ana Ruiz".to_string(),
                phone: None,
                email: None,
            })
            .await
            .expect("contact");
        promises
            .save(Promise {
                id: PromiseId("P-1".to_string()),
                tenant_id: TenantId("studio-1".to_string()),
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

        (pool.clone(), SqlQuoteRepository::new(pool))
    }

    fn quote(id: &str, offset_secs: i64) -> Quote {
        Quote {
            id: QuoteId(id.to_string()),
            tenant_id: TenantId("studio-1".to_string()),
            promise_id: PromiseId("P-1".to_string()),
            name: format!("Propuesta {id}"),
            status: QuoteStatus::Pending,
            list_price: Decimal::new(9_570, 0),
            negotiated_price: None,
            condition_id: None,
            archived: false,
            event_id: None,
            snapshot_checksum: Some("abc123".to_string()),
            closing: None,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    fn item(id: &str, quote_id: &str, position: i32) -> QuoteLineItem {
        QuoteLineItem {
            id: LineItemId(id.to_string()),
            quote_id: QuoteId(quote_id.to_string()),
            service_id: ServiceId("foto".to_string()),
            name: Some("Fotografía".to_string()),
            unit_price: Some(Decimal::new(3_190, 0)),
            cost: Some(Decimal::new(1_000, 0)),
            expense: Some(Decimal::new(100, 0)),
            utility_kind: Some(UtilityKind::Service),
            quantity: 3,
            subtotal: Some(Decimal::new(9_570, 0)),
            position,
        }
    }

    #[tokio::test]
    async fn create_with_items_persists_header_and_ordered_lines() {
        let (_, repo) = setup().await;
        repo.create_with_items(
            quote("Q-1", 0),
            vec![item("LI-2", "Q-1", 1), item("LI-1", "Q-1", 0)],
        )
        .await
        .expect("create");

        let found = repo
            .find_by_id(&QuoteId("Q-1".to_string()))
            .await
            .expect("find")
            .expect("quote exists");
        assert_eq!(found.list_price, Decimal::new(9_570, 0));
        assert_eq!(found.snapshot_checksum.as_deref(), Some("abc123"));
        assert!(found.closing.is_none());

        let items = repo.list_line_items(&found.id).await.expect("items");
        let ids: Vec<&str> = items.iter().map(|item| item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["LI-1", "LI-2"]);
        assert_eq!(items[0].unit_price, Some(Decimal::new(3_190, 0)));
    }

    #[tokio::test]
    async fn failing_line_item_rolls_back_the_header() {
        let (_, repo) = setup().await;
        let result = repo
            .create_with_items(
                quote("Q-1", 0),
                vec![item("LI-1", "Q-1", 0), item("LI-1", "Q-1", 1)],
            )
            .await;

        assert!(matches!(result, Err(RepositoryError::Database(_))));
        assert!(repo.find_by_id(&QuoteId("Q-1".to_string())).await.expect("find").is_none());
        let items = repo.list_line_items(&QuoteId("Q-1".to_string())).await.expect("items");
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn legacy_rows_without_frozen_columns_decode_as_none() {
        let (pool, repo) = setup().await;
        repo.create_with_items(quote("Q-1", 0), Vec::new()).await.expect("create");
        sqlx::query(
            "INSERT INTO quote_line_item (id, quote_id, service_id, quantity, position)
             VALUES ('LI-old', 'Q-1', 'foto', 2, 0)",
        )
        .execute(&pool)
        .await
        .expect("legacy row");

        let items = repo.list_line_items(&QuoteId("Q-1".to_string())).await.expect("items");
        assert_eq!(items.len(), 1);
        assert!(!items[0].has_frozen_values());
        assert_eq!(items[0].utility_kind, None);
    }

    #[tokio::test]
    async fn active_listing_skips_archived_and_orders_by_creation() {
        let (_, repo) = setup().await;
        let mut archived = quote("Q-0", -20);
        archived.archived = true;
        repo.create_with_items(archived, Vec::new()).await.expect("archived");
        repo.create_with_items(quote("Q-2", 10), Vec::new()).await.expect("second");
        repo.create_with_items(quote("Q-1", 0), Vec::new()).await.expect("first");

        let listed = repo
            .list_active_for_promise(&PromiseId("P-1".to_string()))
            .await
            .expect("list");
        let ids: Vec<&str> = listed.iter().map(|quote| quote.id.0.as_str()).collect();
        assert_eq!(ids, vec!["Q-1", "Q-2"]);
    }

    fn closing_terms() -> ClosingTerms {
        ClosingTerms {
            closing_price: Some(Decimal::new(8_000, 0)),
            courtesy_total: Decimal::new(500, 0),
            bonus: Decimal::ZERO,
            total_payable: Decimal::new(8_000, 0),
            advance: Decimal::new(2_400, 0),
            deferred: Decimal::new(5_600, 0),
            closed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn status_event_and_closing_updates() {
        let (_, repo) = setup().await;
        repo.create_with_items(quote("Q-1", 0), Vec::new()).await.expect("create");
        let id = QuoteId("Q-1".to_string());

        let closing = closing_terms();
        repo.close_with_terms(&id, QuoteStatus::Closing, &closing).await.expect("closing");
        let closed = repo.find_by_id(&id).await.expect("find").expect("quote exists");
        assert_eq!(closed.status, QuoteStatus::Closing);
        let stored = closed.closing.expect("closing terms");
        assert_eq!(stored.total_payable, closing.total_payable);
        assert_eq!(stored.deferred, Decimal::new(5_600, 0));

        repo.authorize_with_event(&id, QuoteStatus::Authorized, &EventId("E-1".to_string()))
            .await
            .expect("authorize");
        let found = repo.find_by_id(&id).await.expect("find").expect("quote exists");
        assert_eq!(found.status, QuoteStatus::Authorized);
        assert_eq!(found.event_id, Some(EventId("E-1".to_string())));

        let relink = repo
            .authorize_with_event(&id, QuoteStatus::Authorized, &EventId("E-2".to_string()))
            .await;
        assert!(matches!(relink, Err(RepositoryError::Conflict(_))));
        let ghost = repo.update_status(&QuoteId("Q-404".to_string()), QuoteStatus::Closing).await;
        assert!(matches!(ghost, Err(RepositoryError::Missing { entity: "quote", .. })));
        let ghost_close = repo
            .close_with_terms(&QuoteId("Q-404".to_string()), QuoteStatus::Closing, &closing)
            .await;
        assert!(matches!(ghost_close, Err(RepositoryError::Missing { entity: "quote", .. })));
    }

    #[tokio::test]
    async fn second_booking_on_the_same_promise_conflicts_and_writes_nothing() {
        let (_, repo) = setup().await;
        repo.create_with_items(quote("Q-1", 0), Vec::new()).await.expect("first");
        repo.create_with_items(quote("Q-2", 10), Vec::new()).await.expect("second");
        let first = QuoteId("Q-1".to_string());
        let second = QuoteId("Q-2".to_string());
        for id in [&first, &second] {
            repo.close_with_terms(id, QuoteStatus::Closing, &closing_terms())
                .await
                .expect("closing");
        }

        repo.authorize_with_event(&first, QuoteStatus::Authorized, &EventId("E-1".to_string()))
            .await
            .expect("first booking");
        let second_booking = repo
            .authorize_with_event(&second, QuoteStatus::Authorized, &EventId("E-2".to_string()))
            .await;
        assert!(matches!(second_booking, Err(RepositoryError::Conflict(_))));

        let untouched = repo.find_by_id(&second).await.expect("find").expect("quote exists");
        assert_eq!(untouched.status, QuoteStatus::Closing);
        assert_eq!(untouched.event_id, None);

        let missing = repo
            .authorize_with_event(
                &QuoteId("Q-404".to_string()),
                QuoteStatus::Authorized,
                &EventId("E-3".to_string()),
            )
            .await;
        assert!(matches!(missing, Err(RepositoryError::Missing { entity: "quote", .. })));
    }

    #[tokio::test]
    async fn archived_booking_does_not_block_the_promise() {
        let (pool, repo) = setup().await;
        repo.create_with_items(quote("Q-1", 0), Vec::new()).await.expect("first");
        repo.create_with_items(quote("Q-2", 10), Vec::new()).await.expect("second");
        repo.authorize_with_event(
            &QuoteId("Q-1".to_string()),
            QuoteStatus::Authorized,
            &EventId("E-1".to_string()),
        )
        .await
        .expect("first booking");
        sqlx::query("UPDATE quote SET archived = 1 WHERE id = 'Q-1'")
            .execute(&pool)
            .await
            .expect("archive");

        repo.authorize_with_event(
            &QuoteId("Q-2".to_string()),
            QuoteStatus::Authorized,
            &EventId("E-2".to_string()),
        )
        .await
        .expect("booking after archive");
    }
}
