use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::access::AccessControlEntry;
use crate::model::activity::NewActivity;
use crate::model::resource::{Resource, ResourceKind};

pub mod memory;
pub mod postgres;

/// Errors surfaced by any store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Persistence for hierarchical resources. One logical collection per kind;
/// every lookup is organization-scoped.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn insert(&self, resource: &Resource) -> Result<(), StoreError>;

    async fn update(&self, resource: &Resource) -> Result<(), StoreError>;

    async fn find(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<Option<Resource>, StoreError>;

    /// Same-kind children of a parent, soft-deleted rows included.
    async fn children_of(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        parent_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Non-deleted resources of `kind` contained in a project.
    async fn list_by_project(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Number of existing rows (soft-deleted included) used for serial
    /// allocation; scoped to the project for phases and sprints.
    async fn count_for_serial(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Option<Uuid>,
    ) -> Result<u64, StoreError>;
}

/// Persistence for access control entries, keyed by
/// (organization, user, resource kind, resource id).
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn find_entry(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Option<AccessControlEntry>, StoreError>;

    async fn entries_for_resource(
        &self,
        organization_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError>;

    async fn entries_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError>;

    async fn upsert(&self, entry: &AccessControlEntry) -> Result<(), StoreError>;

    /// Open an all-or-nothing batch for the bulk grant path. Writes staged on
    /// the batch become visible only when `commit` succeeds.
    async fn begin(&self) -> Result<Box<dyn AccessBatch>, StoreError>;
}

/// Transactional write handle returned by [`AccessStore::begin`].
#[async_trait]
pub trait AccessBatch: Send {
    async fn upsert(&mut self, entry: &AccessControlEntry) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Append-only activity log sink. The core never reads entries back.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, entry: NewActivity) -> Result<(), StoreError>;
}

/// The three store seams bundled for constructor convenience.
#[derive(Clone)]
pub struct Datastore {
    pub resources: Arc<dyn ResourceStore>,
    pub access: Arc<dyn AccessStore>,
    pub activity: Arc<dyn ActivityStore>,
}

impl Datastore {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        access: Arc<dyn AccessStore>,
        activity: Arc<dyn ActivityStore>,
    ) -> Self {
        Self { resources, access, activity }
    }
}
