use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use atelier_core::domain::pricing_config::PricingConfiguration;
use atelier_core::domain::promise::TenantId;
use atelier_core::domain::service::{CatalogService, CategoryId, ServiceId, UtilityKind};

use super::{
    column, decimal_column, decimal_text, CatalogRepository, PricingConfigRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_service(row: &SqliteRow) -> Result<CatalogService, RepositoryError> {
    let utility_kind: String = column(row, "utility_kind")?;
    let category_id: Option<String> = column(row, "category_id")?;
    let active: i64 = column(row, "active")?;

    Ok(CatalogService {
        id: ServiceId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        category_id: category_id.map(CategoryId),
        name: column(row, "name")?,
        public_price: decimal_column(row, "public_price")?,
        cost: decimal_column(row, "cost")?,
        expense: decimal_column(row, "expense")?,
        utility_kind: UtilityKind::parse(&utility_kind).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown utility_kind `{utility_kind}`"))
        })?,
        active: active != 0,
    })
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn find_services(
        &self,
        tenant_id: &TenantId,
        ids: &[ServiceId],
    ) -> Result<Vec<CatalogService>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, tenant_id, category_id, name, public_price, cost, expense,
                    utility_kind, active
             FROM catalog_service
             WHERE tenant_id = ? AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(&tenant_id.0);
        for id in ids {
            query = query.bind(&id.0);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(row_to_service).collect()
    }

    async fn save(&self, service: CatalogService) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO catalog_service (id, tenant_id, category_id, name, public_price, cost,
                                          expense, utility_kind, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, id) DO UPDATE SET
                 category_id = excluded.category_id,
                 name = excluded.name,
                 public_price = excluded.public_price,
                 cost = excluded.cost,
                 expense = excluded.expense,
                 utility_kind = excluded.utility_kind,
                 active = excluded.active",
        )
        .bind(&service.id.0)
        .bind(&service.tenant_id.0)
        .bind(service.category_id.as_ref().map(|id| id.0.as_str()))
        .bind(&service.name)
        .bind(decimal_text(service.public_price))
        .bind(decimal_text(service.cost))
        .bind(decimal_text(service.expense))
        .bind(service.utility_kind.as_str())
        .bind(service.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlPricingConfigRepository {
    pool: DbPool,
}

impl SqlPricingConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_config(row: &SqliteRow) -> Result<PricingConfiguration, RepositoryError> {
    let active: i64 = column(row, "active")?;

    Ok(PricingConfiguration {
        tenant_id: TenantId(column(row, "tenant_id")?),
        service_margin_pct: decimal_column(row, "service_margin_pct")?,
        product_margin_pct: decimal_column(row, "product_margin_pct")?,
        commission_pct: decimal_column(row, "commission_pct")?,
        overprice_pct: decimal_column(row, "overprice_pct")?,
        active: active != 0,
    })
}

#[async_trait::async_trait]
impl PricingConfigRepository for SqlPricingConfigRepository {
    async fn find_active(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<PricingConfiguration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, service_margin_pct, product_margin_pct, commission_pct,
                    overprice_pct, active
             FROM pricing_configuration
             WHERE tenant_id = ? AND active = 1",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_config).transpose()
    }

    async fn save(&self, config: PricingConfiguration) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pricing_configuration (tenant_id, service_margin_pct, product_margin_pct,
                                                commission_pct, overprice_pct, active, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                 service_margin_pct = excluded.service_margin_pct,
                 product_margin_pct = excluded.product_margin_pct,
                 commission_pct = excluded.commission_pct,
                 overprice_pct = excluded.overprice_pct,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&config.tenant_id.0)
        .bind(decimal_text(config.service_margin_pct))
        .bind(decimal_text(config.product_margin_pct))
        .bind(decimal_text(config.commission_pct))
        .bind(decimal_text(config.overprice_pct))
        .bind(config.active)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use atelier_core::domain::pricing_config::PricingConfiguration;
    use atelier_core::domain::promise::TenantId;
    use atelier_core::domain::service::{CatalogService, ServiceId, UtilityKind};

    use super::{SqlCatalogRepository, SqlPricingConfigRepository};
    use crate::repositories::{CatalogRepository, PricingConfigRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn service(id: &str, tenant: &str, price: Decimal) -> CatalogService {
        CatalogService {
            id: ServiceId(id.to_string()),
            tenant_id: TenantId(tenant.to_string()),
            category_id: None,
            name: format!("Servicio {id}"),
            public_price: price,
            cost: Decimal::new(4_050, 2),
            expense: Decimal::new(5, 0),
            utility_kind: UtilityKind::Product,
            active: true,
        }
    }

    #[tokio::test]
    async fn find_services_is_scoped_to_tenant_and_ids() {
        let repo = SqlCatalogRepository::new(setup().await);
        repo.save(service("foto", "studio-1", Decimal::new(1_500, 0))).await.expect("save");
        repo.save(service("video", "studio-1", Decimal::new(3_000, 0))).await.expect("save");
        repo.save(service("drone", "studio-2", Decimal::new(900, 0))).await.expect("save");

        let tenant = TenantId("studio-1".to_string());
        let ids = [
            ServiceId("foto".to_string()),
            ServiceId("drone".to_string()),
            ServiceId("missing".to_string()),
        ];
        let found = repo.find_services(&tenant, &ids).await.expect("find");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.0, "foto");
        assert_eq!(found[0].cost, Decimal::new(4_050, 2));
        assert_eq!(found[0].utility_kind, UtilityKind::Product);
        assert!(repo.find_services(&tenant, &[]).await.expect("empty").is_empty());
    }

    #[tokio::test]
    async fn save_upserts_live_price() {
        let repo = SqlCatalogRepository::new(setup().await);
        repo.save(service("foto", "studio-1", Decimal::new(100, 0))).await.expect("save");
        repo.save(service("foto", "studio-1", Decimal::new(150, 0))).await.expect("upsert");

        let found = repo
            .find_services(&TenantId("studio-1".to_string()), &[ServiceId("foto".to_string())])
            .await
            .expect("find");
        assert_eq!(found[0].public_price, Decimal::new(150, 0));
    }

    #[tokio::test]
    async fn same_service_id_in_two_tenants_stays_separate() {
        let repo = SqlCatalogRepository::new(setup().await);
        repo.save(service("foto", "studio-1", Decimal::new(100, 0))).await.expect("studio-1");
        repo.save(service("foto", "studio-2", Decimal::new(999, 0))).await.expect("studio-2");

        let ids = [ServiceId("foto".to_string())];
        let first = repo.find_services(&TenantId("studio-1".to_string()), &ids).await.expect("1");
        let second = repo.find_services(&TenantId("studio-2".to_string()), &ids).await.expect("2");

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tenant_id.0, "studio-1");
        assert_eq!(first[0].public_price, Decimal::new(100, 0));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].public_price, Decimal::new(999, 0));
    }

    #[tokio::test]
    async fn inactive_pricing_config_is_not_found() {
        let repo = SqlPricingConfigRepository::new(setup().await);
        let tenant = TenantId("studio-1".to_string());
        let config = PricingConfiguration {
            tenant_id: tenant.clone(),
            service_margin_pct: Decimal::new(30, 0),
            product_margin_pct: Decimal::new(20, 0),
            commission_pct: Decimal::ZERO,
            overprice_pct: Decimal::ZERO,
            active: false,
        };
        repo.save(config.clone()).await.expect("save inactive");
        assert!(repo.find_active(&tenant).await.expect("find").is_none());

        repo.save(PricingConfiguration { active: true, ..config }).await.expect("reactivate");
        assert!(repo.find_active(&tenant).await.expect("find").is_some());
    }

    #[tokio::test]
    async fn pricing_config_round_trip() {
        let repo = SqlPricingConfigRepository::new(setup().await);
        let tenant = TenantId("studio-1".to_string());
        assert!(repo.find_active(&tenant).await.expect("find").is_none());

        let config = PricingConfiguration {
            tenant_id: tenant.clone(),
            service_margin_pct: Decimal::new(30, 0),
            product_margin_pct: Decimal::new(225, 1),
            commission_pct: Decimal::new(10, 0),
            overprice_pct: Decimal::ZERO,
            active: true,
        };
        repo.save(config.clone()).await.expect("save");

        assert_eq!(repo.find_active(&tenant).await.expect("find"), Some(config));
    }
}
