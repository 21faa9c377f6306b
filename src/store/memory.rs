use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::access::AccessControlEntry;
use crate::model::activity::{ActivityEntry, NewActivity};
use crate::model::resource::{Resource, ResourceKind};
use crate::store::{
    AccessBatch, AccessStore, ActivityStore, Datastore, ResourceStore, StoreError,
};

type ResourceKey = (Uuid, ResourceKind, Uuid);
type AccessKey = (Uuid, Uuid, ResourceKind, Uuid);

/// In-memory backend for tests and embedding. Mirrors the document-store
/// semantics of the production backend, including the all-or-nothing access
/// batch: staged writes apply under a single write lock on commit.
#[derive(Default)]
pub struct MemoryStore {
    resources: RwLock<HashMap<ResourceKey, Resource>>,
    entries: Arc<RwLock<HashMap<AccessKey, AccessControlEntry>>>,
    activity: RwLock<Vec<ActivityEntry>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle this store as all three seams.
    pub fn datastore(self: &Arc<Self>) -> Datastore {
        Datastore::new(self.clone(), self.clone(), self.clone())
    }

    /// Test hook: the activity log so far, oldest first.
    pub async fn activity_log(&self) -> Vec<ActivityEntry> {
        self.activity.read().await.clone()
    }

    /// Test hook: total number of access entries, active or not.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    fn access_key(entry: &AccessControlEntry) -> AccessKey {
        (entry.organization_id, entry.user_id, entry.resource_kind, entry.resource_id)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn insert(&self, resource: &Resource) -> Result<(), StoreError> {
        let key = (resource.organization_id, resource.kind, resource.id);
        let mut resources = self.resources.write().await;
        if resources.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{} {} already exists",
                resource.kind, resource.id
            )));
        }
        resources.insert(key, resource.clone());
        Ok(())
    }

    async fn update(&self, resource: &Resource) -> Result<(), StoreError> {
        let key = (resource.organization_id, resource.kind, resource.id);
        let mut resources = self.resources.write().await;
        match resources.get_mut(&key) {
            Some(existing) => {
                *existing = resource.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("{} {}", resource.kind, resource.id))),
        }
    }

    async fn find(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<Option<Resource>, StoreError> {
        let resources = self.resources.read().await;
        Ok(resources.get(&(organization_id, kind, id)).cloned())
    }

    async fn children_of(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        parent_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError> {
        let resources = self.resources.read().await;
        let mut children: Vec<Resource> = resources
            .values()
            .filter(|r| {
                r.organization_id == organization_id
                    && r.kind == kind
                    && r.parent_id == Some(parent_id)
            })
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(children)
    }

    async fn list_by_project(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError> {
        let resources = self.resources.read().await;
        let mut found: Vec<Resource> = resources
            .values()
            .filter(|r| {
                r.organization_id == organization_id
                    && r.kind == kind
                    && r.project_id == Some(project_id)
                    && !r.is_deleted
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn count_for_serial(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Option<Uuid>,
    ) -> Result<u64, StoreError> {
        let resources = self.resources.read().await;
        let count = resources
            .values()
            .filter(|r| {
                r.organization_id == organization_id
                    && r.kind == kind
                    && project_id.map(|p| r.project_id == Some(p)).unwrap_or(true)
            })
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn find_entry(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Option<AccessControlEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(organization_id, user_id, resource_kind, resource_id)).cloned())
    }

    async fn entries_for_resource(
        &self,
        organization_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| {
                e.organization_id == organization_id
                    && e.resource_kind == resource_kind
                    && e.resource_id == resource_id
            })
            .cloned()
            .collect())
    }

    async fn entries_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.organization_id == organization_id && e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, entry: &AccessControlEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(Self::access_key(entry), entry.clone());
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn AccessBatch>, StoreError> {
        Ok(Box::new(MemoryAccessBatch {
            entries: self.entries.clone(),
            staged: Vec::new(),
        }))
    }
}

/// Staged batch over the shared entry map. Nothing becomes visible until
/// `commit` takes the write lock and applies every staged row.
struct MemoryAccessBatch {
    entries: Arc<RwLock<HashMap<AccessKey, AccessControlEntry>>>,
    staged: Vec<AccessControlEntry>,
}

#[async_trait]
impl AccessBatch for MemoryAccessBatch {
    async fn upsert(&mut self, entry: &AccessControlEntry) -> Result<(), StoreError> {
        self.staged.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        for entry in self.staged {
            let key = MemoryStore::access_key(&entry);
            entries.insert(key, entry);
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn append(&self, entry: NewActivity) -> Result<(), StoreError> {
        let mut activity = self.activity.write().await;
        activity.push(ActivityEntry::from_new(entry));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::resource::{format_serial, NewResource};

    fn sample(org: Uuid, kind: ResourceKind) -> Resource {
        Resource::build(
            org,
            &NewResource::named(kind, "Sample"),
            format_serial(kind, 1),
            Uuid::new_v4(),
            None,
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let resource = sample(org, ResourceKind::Project);

        store.insert(&resource).await.unwrap();
        let err = store.insert(&resource).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_requires_existing_row() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let resource = sample(org, ResourceKind::Folder);

        let err = store.update(&resource).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn uncommitted_batch_leaves_no_trace() {
        let store = MemoryStore::new();
        let entry = AccessControlEntry::direct(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ResourceKind::Project,
            Uuid::new_v4(),
            crate::model::permission::PermissionLevel::View,
            Uuid::new_v4(),
        );

        let mut batch = AccessStore::begin(store.as_ref()).await.unwrap();
        batch.upsert(&entry).await.unwrap();
        drop(batch);

        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn committed_batch_applies_all_rows() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();

        let mut batch = AccessStore::begin(store.as_ref()).await.unwrap();
        for _ in 0..3 {
            let entry = AccessControlEntry::direct(
                org,
                user,
                ResourceKind::Folder,
                Uuid::new_v4(),
                crate::model::permission::PermissionLevel::Edit,
                user,
            );
            batch.upsert(&entry).await.unwrap();
        }
        batch.commit().await.unwrap();

        assert_eq!(store.entry_count().await, 3);
    }
}
