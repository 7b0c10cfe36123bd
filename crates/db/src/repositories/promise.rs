use sqlx::sqlite::SqliteRow;

use atelier_core::domain::contact::{Contact, ContactId};
use atelier_core::domain::promise::{
    PipelineKind, PipelineStage, PipelineStageId, Promise, PromiseId, Referrer, StaffMember,
    TenantId,
};

use super::{
    column, optional_date_column, timestamp_column, PromiseRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlPromiseRepository {
    pool: DbPool,
}

impl SqlPromiseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_promise(row: &SqliteRow) -> Result<Promise, RepositoryError> {
    let referrer_type: Option<String> = column(row, "referrer_type")?;
    let referrer_id: Option<String> = column(row, "referrer_id")?;
    let referrer = Referrer::from_parts(referrer_type.as_deref(), referrer_id.as_deref())
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stage_id: Option<String> = column(row, "pipeline_stage_id")?;
    let confirmed: i64 = column(row, "event_date_confirmed")?;

    Ok(Promise {
        id: PromiseId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        contact_id: ContactId(column(row, "contact_id")?),
        event_type: column(row, "event_type")?,
        event_date: optional_date_column(row, "event_date")?,
        event_date_confirmed: confirmed != 0,
        event_name: column(row, "event_name")?,
        event_location: column(row, "event_location")?,
        event_duration: column(row, "event_duration")?,
        pipeline_stage_id: stage_id.map(PipelineStageId),
        referrer,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn row_to_stage(row: &SqliteRow) -> Result<PipelineStage, RepositoryError> {
    let pipeline: String = column(row, "pipeline")?;
    let active: i64 = column(row, "active")?;

    Ok(PipelineStage {
        id: PipelineStageId(column(row, "id")?),
        pipeline: PipelineKind::parse(&pipeline)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown pipeline `{pipeline}`")))?,
        slug: column(row, "slug")?,
        name: column(row, "name")?,
        order: column(row, "stage_order")?,
        active: active != 0,
    })
}

#[async_trait::async_trait]
impl PromiseRepository for SqlPromiseRepository {
    async fn find_by_id(&self, id: &PromiseId) -> Result<Option<Promise>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, contact_id, event_type, event_date, event_date_confirmed,
                    event_name, event_location, event_duration, pipeline_stage_id,
                    referrer_type, referrer_id, created_at
             FROM promise WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_promise).transpose()
    }

    async fn find_stage(
        &self,
        id: &PipelineStageId,
    ) -> Result<Option<PipelineStage>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, pipeline, slug, name, stage_order, active
             FROM pipeline_stage WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_stage).transpose()
    }

    async fn find_contact(&self, id: &ContactId) -> Result<Option<Contact>, RepositoryError> {
        let row = sqlx::query("SELECT id, tenant_id, name, phone, email FROM contact WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(Contact {
                id: ContactId(column(r, "id")?),
                tenant_id: TenantId(column(r, "tenant_id")?),
                name: column(r, "name")?,
                phone: column(r, "phone")?,
                email: column(r, "email")?,
            })),
            None => Ok(None),
        }
    }

    async fn resolve_referrer_name(
        &self,
        referrer: &Referrer,
    ) -> Result<Option<String>, RepositoryError> {
        let sql = match referrer {
            Referrer::Contact(_) => "SELECT name FROM contact WHERE id = ?",
            Referrer::StaffMember(_) => "SELECT name FROM staff_member WHERE id = ?",
            Referrer::None => return Ok(None),
        };
        let Some(id) = referrer.id() else {
            return Ok(None);
        };

        let row = sqlx::query(sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(|r| column::<String>(r, "name")).transpose()
    }

    async fn save(&self, promise: Promise) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO promise (id, tenant_id, contact_id, event_type, event_date,
                                  event_date_confirmed, event_name, event_location,
                                  event_duration, pipeline_stage_id, referrer_type, referrer_id,
                                  created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 contact_id = excluded.contact_id,
                 event_type = excluded.event_type,
                 event_date = excluded.event_date,
                 event_date_confirmed = excluded.event_date_confirmed,
                 event_name = excluded.event_name,
                 event_location = excluded.event_location,
                 event_duration = excluded.event_duration,
                 pipeline_stage_id = excluded.pipeline_stage_id,
                 referrer_type = excluded.referrer_type,
                 referrer_id = excluded.referrer_id",
        )
        .bind(&promise.id.0)
        .bind(&promise.tenant_id.0)
        .bind(&promise.contact_id.0)
        .bind(&promise.event_type)
        .bind(promise.event_date.map(|date| date.to_string()))
        .bind(promise.event_date_confirmed)
        .bind(&promise.event_name)
        .bind(&promise.event_location)
        .bind(&promise.event_duration)
        .bind(promise.pipeline_stage_id.as_ref().map(|id| id.0.as_str()))
        .bind(promise.referrer.type_tag())
        .bind(promise.referrer.id())
        .bind(promise.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_stage(&self, stage: PipelineStage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pipeline_stage (id, pipeline, slug, name, stage_order, active)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 pipeline = excluded.pipeline,
                 slug = excluded.slug,
                 name = excluded.name,
                 stage_order = excluded.stage_order,
                 active = excluded.active",
        )
        .bind(&stage.id.0)
        .bind(stage.pipeline.as_str())
        .bind(&stage.slug)
        .bind(&stage.name)
        .bind(stage.order)
        .bind(stage.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_contact(&self, contact: Contact) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO contact (id, tenant_id, name, phone, email)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 phone = excluded.phone,
                 email = excluded.email",
        )
        .bind(&contact.id.0)
        .bind(&contact.tenant_id.0)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_staff_member(&self, staff: StaffMember) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO staff_member (id, tenant_id, name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&staff.id.0)
        .bind(&staff.tenant_id.0)
        .bind(&staff.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use atelier_core::domain::contact::{Contact, ContactId};
    use atelier_core::domain::promise::{
        PipelineKind, PipelineStage, PipelineStageId, Promise, PromiseId, Referrer, StaffId,
        StaffMember, TenantId,
    };

    use super::SqlPromiseRepository;
    use crate::repositories::PromiseRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlPromiseRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlPromiseRepository::new(pool)
    }

    fn tenant() -> TenantId {
        TenantId("studio-1".to_string())
    }

    #[tokio::test]
    async fn promise_round_trip_with_stage_and_staff_referrer() {
        let repo = setup().await;
        repo.save_contact(Contact {
            id: ContactId("C-1".to_string()),
            tenant_id: tenant(),
            name: "Ana Ruiz".to_string(),
            phone: Some("555-0101".to_string()),
            email: None,
        })
        .await
        .expect("save contact");
        repo.save_stage(PipelineStage {
            id: PipelineStageId("stage-approved".to_string()),
            pipeline: PipelineKind::Commercial,
            slug: "approved".to_string(),
            name: "Aprobado".to_string(),
            order: 4,
            active: true,
        })
        .await
        .expect("save stage");
        repo.save_staff_member(StaffMember {
            id: StaffId("S-1".to_string()),
            tenant_id: tenant(),
            name: "Luis".to_string(),
        })
        .await
        .expect("save staff");

        let promise = Promise {
            id: PromiseId("P-1".to_string()),
            tenant_id: tenant(),
            contact_id: ContactId("C-1".to_string()),
            event_type: Some("boda".to_string()),
            event_date: NaiveDate::from_ymd_opt(2026, 11, 14),
            event_date_confirmed: true,
            event_name: Some("Boda Ruiz-Mora".to_string()),
            event_location: None,
            event_duration: Some("8 horas".to_string()),
            pipeline_stage_id: Some(PipelineStageId("stage-approved".to_string())),
            referrer: Referrer::StaffMember(StaffId("S-1".to_string())),
            created_at: Utc::now(),
        };
        repo.save(promise.clone()).await.expect("save promise");

        let found = repo.find_by_id(&promise.id).await.expect("find").expect("promise exists");
        assert_eq!(found.event_date, promise.event_date);
        assert_eq!(found.referrer, promise.referrer);
        assert!(found.event_date_confirmed);

        let stage = repo
            .find_stage(&PipelineStageId("stage-approved".to_string()))
            .await
            .expect("find stage")
            .expect("stage exists");
        assert!(stage.is_approved_sentinel());

        let name = repo.resolve_referrer_name(&found.referrer).await.expect("referrer");
        assert_eq!(name.as_deref(), Some("Luis"));
    }

    #[tokio::test]
    async fn contact_referrer_and_missing_names() {
        let repo = setup().await;
        repo.save_contact(Contact {
            id: ContactId("C-7".to_string()),
            tenant_id: tenant(),
            name: "Marta Gil".to_string(),
            phone: None,
            email: Some("marta@example.com".to_string()),
        })
        .await
        .expect("save contact");

        let contact = Referrer::Contact(ContactId("C-7".to_string()));
        let ghost = Referrer::StaffMember(StaffId("S-404".to_string()));

        assert_eq!(
            repo.resolve_referrer_name(&contact).await.expect("contact").as_deref(),
            Some("Marta Gil")
        );
        assert_eq!(repo.resolve_referrer_name(&ghost).await.expect("ghost"), None);
        assert_eq!(repo.resolve_referrer_name(&Referrer::None).await.expect("none"), None);
        assert!(repo
            .find_contact(&ContactId("C-404".to_string()))
            .await
            .expect("find")
            .is_none());
    }
}
