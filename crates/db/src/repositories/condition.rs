use sqlx::sqlite::SqliteRow;

use atelier_core::domain::condition::{AdvanceRule, CommercialCondition, ConditionId};
use atelier_core::domain::promise::TenantId;

use super::{
    column, decimal_column, decimal_text, optional_date_column, optional_decimal_column,
    optional_decimal_text, CommercialConditionRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlCommercialConditionRepository {
    pool: DbPool,
}

impl SqlCommercialConditionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_condition(row: &SqliteRow) -> Result<CommercialCondition, RepositoryError> {
    let advance_type: String = column(row, "advance_type")?;
    let advance_value = decimal_column(row, "advance_value")?;
    let advance = AdvanceRule::from_parts(&advance_type, advance_value)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CommercialCondition {
        id: ConditionId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        name: column(row, "name")?,
        discount_pct: optional_decimal_column(row, "discount_pct")?,
        advance,
        valid_from: optional_date_column(row, "valid_from")?,
        valid_until: optional_date_column(row, "valid_until")?,
    })
}

#[async_trait::async_trait]
impl CommercialConditionRepository for SqlCommercialConditionRepository {
    async fn find_by_id(
        &self,
        id: &ConditionId,
    ) -> Result<Option<CommercialCondition>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, discount_pct, advance_type, advance_value,
                    valid_from, valid_until
             FROM commercial_condition WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_condition).transpose()
    }

    async fn save(&self, condition: CommercialCondition) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO commercial_condition (id, tenant_id, name, discount_pct, advance_type,
                                               advance_value, valid_from, valid_until)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 discount_pct = excluded.discount_pct,
                 advance_type = excluded.advance_type,
                 advance_value = excluded.advance_value,
                 valid_from = excluded.valid_from,
                 valid_until = excluded.valid_until",
        )
        .bind(&condition.id.0)
        .bind(&condition.tenant_id.0)
        .bind(&condition.name)
        .bind(optional_decimal_text(condition.discount_pct))
        .bind(condition.advance.type_tag())
        .bind(decimal_text(condition.advance.value()))
        .bind(condition.valid_from.map(|date| date.to_string()))
        .bind(condition.valid_until.map(|date| date.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use atelier_core::domain::condition::{AdvanceRule, CommercialCondition, ConditionId};
    use atelier_core::domain::promise::TenantId;

    use super::SqlCommercialConditionRepository;
    use crate::repositories::CommercialConditionRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn condition_round_trip_keeps_advance_variant_and_window() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlCommercialConditionRepository::new(pool);

        let condition = CommercialCondition::new(
            ConditionId("CC-1".to_string()),
            TenantId("studio-1".to_string()),
            "Preventa 2026",
            Some(Decimal::new(10, 0)),
            AdvanceRule::FixedAmount(Decimal::new(2_500, 0)),
        )
        .and_then(|condition| condition.with_window(NaiveDate::from_ymd_opt(2026, 1, 1), None))
        .expect("condition");

        repo.save(condition.clone()).await.expect("save");
        let found = repo.find_by_id(&condition.id).await.expect("find");

        assert_eq!(found, Some(condition));
        assert!(repo
            .find_by_id(&ConditionId("CC-404".to_string()))
            .await
            .expect("find missing")
            .is_none());
    }
}
