use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::model::access::{AccessControlEntry, InheritedFrom};
use crate::model::activity::NewActivity;
use crate::model::fields::{Comment, CustomField};
use crate::model::permission::{AccessType, PermissionLevel};
use crate::model::resource::{Assignment, Resource, ResourceKind, ResourceStatus};
use crate::model::statistics::ResourceStatistics;
use crate::store::{
    AccessBatch, AccessStore, ActivityStore, Datastore, ResourceStore, StoreError,
};

/// Postgres-backed store. All resource kinds share one table partitioned by
/// the `kind` column; embedded blocks (statistics, assignments, custom
/// fields, comments) live in JSONB columns.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Arc<Self>, StoreError> {
        let pool = PgPoolOptions::new().connect(database_url).await?;
        tracing::info!("Created database pool for lattice store");
        Ok(Arc::new(Self { pool }))
    }

    pub fn from_pool(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    /// Bundle this store as all three seams.
    pub fn datastore(self: &Arc<Self>) -> Datastore {
        Datastore::new(self.clone(), self.clone(), self.clone())
    }
}

#[derive(FromRow)]
struct ResourceRow {
    id: Uuid,
    organization_id: Uuid,
    kind: String,
    name: String,
    slug: String,
    serial: String,
    description: Option<String>,
    parent_id: Option<Uuid>,
    child_ids: Vec<Uuid>,
    hierarchy_level: i32,
    hierarchy_path: String,
    project_id: Option<Uuid>,
    phase_id: Option<Uuid>,
    sprint_id: Option<Uuid>,
    phase_ids: Vec<Uuid>,
    sprint_ids: Vec<Uuid>,
    folder_ids: Vec<Uuid>,
    owner_id: Uuid,
    assignments: Json<Vec<Assignment>>,
    status: String,
    progress: i16,
    is_active: bool,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
    actual_start_date: Option<DateTime<Utc>>,
    actual_end_date: Option<DateTime<Utc>>,
    statistics: Json<ResourceStatistics>,
    custom_fields: Json<Vec<CustomField>>,
    comments: Json<Vec<Comment>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRow {
    fn into_resource(self) -> Result<Resource, StoreError> {
        let kind: ResourceKind = self.kind.parse().map_err(StoreError::Backend)?;
        let status: ResourceStatus = self.status.parse().map_err(StoreError::Backend)?;

        Ok(Resource {
            id: self.id,
            organization_id: self.organization_id,
            kind,
            name: self.name,
            slug: self.slug,
            serial: self.serial,
            description: self.description,
            parent_id: self.parent_id,
            child_ids: self.child_ids,
            hierarchy_level: self.hierarchy_level as u32,
            hierarchy_path: self.hierarchy_path,
            project_id: self.project_id,
            phase_id: self.phase_id,
            sprint_id: self.sprint_id,
            phase_ids: self.phase_ids,
            sprint_ids: self.sprint_ids,
            folder_ids: self.folder_ids,
            owner_id: self.owner_id,
            assignments: self.assignments.0,
            status,
            progress: self.progress as u8,
            is_active: self.is_active,
            is_deleted: self.is_deleted,
            deleted_at: self.deleted_at,
            deleted_by: self.deleted_by,
            actual_start_date: self.actual_start_date,
            actual_end_date: self.actual_end_date,
            statistics: self.statistics.0,
            custom_fields: self.custom_fields.0,
            comments: self.comments.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const RESOURCE_COLUMNS: &str = "id, organization_id, kind, name, slug, serial, description, \
     parent_id, child_ids, hierarchy_level, hierarchy_path, \
     project_id, phase_id, sprint_id, phase_ids, sprint_ids, folder_ids, \
     owner_id, assignments, status, progress, \
     is_active, is_deleted, deleted_at, deleted_by, \
     actual_start_date, actual_end_date, \
     statistics, custom_fields, comments, created_at, updated_at";

#[async_trait]
impl ResourceStore for PgStore {
    async fn insert(&self, resource: &Resource) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO resources ({RESOURCE_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
              $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32)"
        );

        sqlx::query(&sql)
            .bind(resource.id)
            .bind(resource.organization_id)
            .bind(resource.kind.as_str())
            .bind(&resource.name)
            .bind(&resource.slug)
            .bind(&resource.serial)
            .bind(&resource.description)
            .bind(resource.parent_id)
            .bind(&resource.child_ids)
            .bind(resource.hierarchy_level as i32)
            .bind(&resource.hierarchy_path)
            .bind(resource.project_id)
            .bind(resource.phase_id)
            .bind(resource.sprint_id)
            .bind(&resource.phase_ids)
            .bind(&resource.sprint_ids)
            .bind(&resource.folder_ids)
            .bind(resource.owner_id)
            .bind(Json(resource.assignments.clone()))
            .bind(resource.status.as_str())
            .bind(resource.progress as i16)
            .bind(resource.is_active)
            .bind(resource.is_deleted)
            .bind(resource.deleted_at)
            .bind(resource.deleted_by)
            .bind(resource.actual_start_date)
            .bind(resource.actual_end_date)
            .bind(Json(resource.statistics.clone()))
            .bind(Json(resource.custom_fields.clone()))
            .bind(Json(resource.comments.clone()))
            .bind(resource.created_at)
            .bind(resource.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update(&self, resource: &Resource) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE resources SET \
                 name = $4, slug = $5, serial = $6, description = $7, \
                 parent_id = $8, child_ids = $9, hierarchy_level = $10, hierarchy_path = $11, \
                 project_id = $12, phase_id = $13, sprint_id = $14, \
                 phase_ids = $15, sprint_ids = $16, folder_ids = $17, \
                 owner_id = $18, assignments = $19, status = $20, progress = $21, \
                 is_active = $22, is_deleted = $23, deleted_at = $24, deleted_by = $25, \
                 actual_start_date = $26, actual_end_date = $27, \
                 statistics = $28, custom_fields = $29, comments = $30, updated_at = $31 \
             WHERE organization_id = $1 AND kind = $2 AND id = $3",
        )
        .bind(resource.organization_id)
        .bind(resource.kind.as_str())
        .bind(resource.id)
        .bind(&resource.name)
        .bind(&resource.slug)
        .bind(&resource.serial)
        .bind(&resource.description)
        .bind(resource.parent_id)
        .bind(&resource.child_ids)
        .bind(resource.hierarchy_level as i32)
        .bind(&resource.hierarchy_path)
        .bind(resource.project_id)
        .bind(resource.phase_id)
        .bind(resource.sprint_id)
        .bind(&resource.phase_ids)
        .bind(&resource.sprint_ids)
        .bind(&resource.folder_ids)
        .bind(resource.owner_id)
        .bind(Json(resource.assignments.clone()))
        .bind(resource.status.as_str())
        .bind(resource.progress as i16)
        .bind(resource.is_active)
        .bind(resource.is_deleted)
        .bind(resource.deleted_at)
        .bind(resource.deleted_by)
        .bind(resource.actual_start_date)
        .bind(resource.actual_end_date)
        .bind(Json(resource.statistics.clone()))
        .bind(Json(resource.custom_fields.clone()))
        .bind(Json(resource.comments.clone()))
        .bind(resource.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{} {}", resource.kind, resource.id)));
        }
        Ok(())
    }

    async fn find(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<Option<Resource>, StoreError> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources \
             WHERE organization_id = $1 AND kind = $2 AND id = $3"
        );
        let row: Option<ResourceRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ResourceRow::into_resource).transpose()
    }

    async fn children_of(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        parent_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources \
             WHERE organization_id = $1 AND kind = $2 AND parent_id = $3 \
             ORDER BY created_at"
        );
        let rows: Vec<ResourceRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(kind.as_str())
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ResourceRow::into_resource).collect()
    }

    async fn list_by_project(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources \
             WHERE organization_id = $1 AND kind = $2 AND project_id = $3 \
               AND is_deleted = FALSE \
             ORDER BY created_at"
        );
        let rows: Vec<ResourceRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(kind.as_str())
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ResourceRow::into_resource).collect()
    }

    async fn count_for_serial(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Option<Uuid>,
    ) -> Result<u64, StoreError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM resources \
             WHERE organization_id = $1 AND kind = $2 \
               AND ($3::uuid IS NULL OR project_id = $3)",
        )
        .bind(organization_id)
        .bind(kind.as_str())
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 as u64)
    }
}

#[derive(FromRow)]
struct AccessRow {
    organization_id: Uuid,
    user_id: Uuid,
    resource_kind: String,
    resource_id: Uuid,
    level: String,
    access_type: String,
    inherited_from_kind: Option<String>,
    inherited_from_id: Option<Uuid>,
    granted_by: Uuid,
    granted_at: DateTime<Utc>,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<Uuid>,
    revocation_reason: Option<String>,
}

impl AccessRow {
    fn into_entry(self) -> Result<AccessControlEntry, StoreError> {
        let resource_kind: ResourceKind = self.resource_kind.parse().map_err(StoreError::Backend)?;
        let level: PermissionLevel = self.level.parse().map_err(StoreError::Backend)?;
        let access_type: AccessType = self.access_type.parse().map_err(StoreError::Backend)?;

        let inherited_from = match (self.inherited_from_kind, self.inherited_from_id) {
            (Some(kind), Some(id)) => {
                Some(InheritedFrom { kind: kind.parse().map_err(StoreError::Backend)?, id })
            }
            _ => None,
        };

        Ok(AccessControlEntry {
            organization_id: self.organization_id,
            user_id: self.user_id,
            resource_kind,
            resource_id: self.resource_id,
            level,
            access_type,
            inherited_from,
            granted_by: self.granted_by,
            granted_at: self.granted_at,
            is_active: self.is_active,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            revoked_by: self.revoked_by,
            revocation_reason: self.revocation_reason,
        })
    }
}

const ACCESS_COLUMNS: &str = "organization_id, user_id, resource_kind, resource_id, level, \
     access_type, inherited_from_kind, inherited_from_id, granted_by, granted_at, \
     is_active, expires_at, revoked_at, revoked_by, revocation_reason";

const ACCESS_UPSERT: &str = "INSERT INTO access_entries \
         (organization_id, user_id, resource_kind, resource_id, level, \
          access_type, inherited_from_kind, inherited_from_id, granted_by, granted_at, \
          is_active, expires_at, revoked_at, revoked_by, revocation_reason) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
     ON CONFLICT (organization_id, user_id, resource_kind, resource_id) DO UPDATE SET \
         level = EXCLUDED.level, \
         access_type = EXCLUDED.access_type, \
         inherited_from_kind = EXCLUDED.inherited_from_kind, \
         inherited_from_id = EXCLUDED.inherited_from_id, \
         granted_by = EXCLUDED.granted_by, \
         granted_at = EXCLUDED.granted_at, \
         is_active = EXCLUDED.is_active, \
         expires_at = EXCLUDED.expires_at, \
         revoked_at = EXCLUDED.revoked_at, \
         revoked_by = EXCLUDED.revoked_by, \
         revocation_reason = EXCLUDED.revocation_reason";

fn bind_access<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    entry: &'q AccessControlEntry,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(entry.organization_id)
        .bind(entry.user_id)
        .bind(entry.resource_kind.as_str())
        .bind(entry.resource_id)
        .bind(entry.level.as_str())
        .bind(entry.access_type.as_str())
        .bind(entry.inherited_from.map(|f| f.kind.as_str()))
        .bind(entry.inherited_from.map(|f| f.id))
        .bind(entry.granted_by)
        .bind(entry.granted_at)
        .bind(entry.is_active)
        .bind(entry.expires_at)
        .bind(entry.revoked_at)
        .bind(entry.revoked_by)
        .bind(entry.revocation_reason.clone())
}

#[async_trait]
impl AccessStore for PgStore {
    async fn find_entry(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Option<AccessControlEntry>, StoreError> {
        let sql = format!(
            "SELECT {ACCESS_COLUMNS} FROM access_entries \
             WHERE organization_id = $1 AND user_id = $2 \
               AND resource_kind = $3 AND resource_id = $4"
        );
        let row: Option<AccessRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(user_id)
            .bind(resource_kind.as_str())
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AccessRow::into_entry).transpose()
    }

    async fn entries_for_resource(
        &self,
        organization_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError> {
        let sql = format!(
            "SELECT {ACCESS_COLUMNS} FROM access_entries \
             WHERE organization_id = $1 AND resource_kind = $2 AND resource_id = $3"
        );
        let rows: Vec<AccessRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(resource_kind.as_str())
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AccessRow::into_entry).collect()
    }

    async fn entries_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError> {
        let sql = format!(
            "SELECT {ACCESS_COLUMNS} FROM access_entries \
             WHERE organization_id = $1 AND user_id = $2"
        );
        let rows: Vec<AccessRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AccessRow::into_entry).collect()
    }

    async fn upsert(&self, entry: &AccessControlEntry) -> Result<(), StoreError> {
        bind_access(sqlx::query(ACCESS_UPSERT), entry).execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn AccessBatch>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgAccessBatch { tx }))
    }
}

/// Batch over a database transaction; rows become visible on commit and the
/// transaction rolls back on drop if commit is never reached.
struct PgAccessBatch {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccessBatch for PgAccessBatch {
    async fn upsert(&mut self, entry: &AccessControlEntry) -> Result<(), StoreError> {
        bind_access(sqlx::query(ACCESS_UPSERT), entry).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn append(&self, entry: NewActivity) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO activity_log \
                 (id, organization_id, user_id, action, resource_kind, resource_id, \
                  resource_name, category, severity, details, changes, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(Uuid::new_v4())
        .bind(entry.organization_id)
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.resource_kind.as_str())
        .bind(entry.resource_id)
        .bind(entry.resource_name)
        .bind(entry.category.as_str())
        .bind(entry.severity.as_str())
        .bind(entry.details)
        .bind(entry.changes.map(Json))
        .bind(Json(entry.metadata))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
