mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use lattice_core::cascade::CascadeController;
use lattice_core::error::CoreError;
use lattice_core::model::access::AccessControlEntry;
use lattice_core::model::permission::{AccessType, PermissionLevel};
use lattice_core::model::resource::{Resource, ResourceKind};
use lattice_core::store::memory::MemoryStore;
use lattice_core::store::{AccessBatch, AccessStore, Datastore, ResourceStore, StoreError};

// Bulk grants are the one all-or-nothing path; everything else is best-effort.

/// Access store decorator whose batches fail on the nth write.
struct FlakyAccessStore {
    inner: Arc<MemoryStore>,
    fail_on_write: usize,
}

#[async_trait]
impl AccessStore for FlakyAccessStore {
    async fn find_entry(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Option<AccessControlEntry>, StoreError> {
        self.inner.find_entry(organization_id, user_id, resource_kind, resource_id).await
    }

    async fn entries_for_resource(
        &self,
        organization_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError> {
        self.inner.entries_for_resource(organization_id, resource_kind, resource_id).await
    }

    async fn entries_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<AccessControlEntry>, StoreError> {
        self.inner.entries_for_user(organization_id, user_id).await
    }

    async fn upsert(&self, entry: &AccessControlEntry) -> Result<(), StoreError> {
        self.inner.upsert(entry).await
    }

    async fn begin(&self) -> Result<Box<dyn AccessBatch>, StoreError> {
        Ok(Box::new(FlakyBatch {
            inner: self.inner.begin().await?,
            writes: 0,
            fail_on_write: self.fail_on_write,
        }))
    }
}

struct FlakyBatch {
    inner: Box<dyn AccessBatch>,
    writes: usize,
    fail_on_write: usize,
}

#[async_trait]
impl AccessBatch for FlakyBatch {
    async fn upsert(&mut self, entry: &AccessControlEntry) -> Result<(), StoreError> {
        self.writes += 1;
        if self.writes == self.fail_on_write {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        self.inner.upsert(entry).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}

/// Seed a project with two phases, a sprint and a folder; returns the project.
async fn seed_project(
    core: &CascadeController,
    owner: &lattice_core::model::permission::Actor,
) -> Result<Resource> {
    let project = core.create_with_access(common::project_input("Apollo"), owner).await?;
    core.create_with_access(common::phase_input("Design", project.id), owner).await?;
    core.create_with_access(common::phase_input("Build", project.id), owner).await?;
    core.create_with_access(common::sprint_input("Sprint 1", project.id), owner).await?;
    core.create_with_access(common::folder_input("Docs", project.id, None), owner).await?;
    Ok(project)
}

#[tokio::test]
async fn bulk_grant_covers_the_whole_subtree() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);
    let (alpha, bravo) = (Uuid::new_v4(), Uuid::new_v4());

    let project = seed_project(&t.core, &owner).await?;
    let entries_after_seed = t.store.entry_count().await; // one owner entry per resource

    let written = t
        .core
        .bulk_grant(project.id, &[alpha, bravo], PermissionLevel::Edit, &owner)
        .await?;

    // project + 4 descendants, per user
    assert_eq!(written, 10);
    assert_eq!(t.store.entry_count().await, entries_after_seed + 10);

    // the project entry is direct, the descendant entries inherit from it
    let on_project = t
        .store
        .find_entry(t.org, alpha, ResourceKind::Project, project.id)
        .await?
        .unwrap();
    assert_eq!(on_project.access_type, AccessType::Direct);

    for kind in [ResourceKind::Phase, ResourceKind::Sprint, ResourceKind::Folder] {
        for descendant in t.store.list_by_project(t.org, kind, project.id).await? {
            let entry = t
                .store
                .find_entry(t.org, bravo, kind, descendant.id)
                .await?
                .expect("descendant entry missing");
            assert_eq!(entry.level, PermissionLevel::Edit);
            assert_eq!(entry.access_type, AccessType::Inherited);
            let from = entry.inherited_from.unwrap();
            assert_eq!(from.kind, ResourceKind::Project);
            assert_eq!(from.id, project.id);
        }
    }
    Ok(())
}

#[tokio::test]
async fn bulk_grant_skips_deleted_descendants() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);
    let target = Uuid::new_v4();

    let project = seed_project(&t.core, &owner).await?;
    let phases = t.store.list_by_project(t.org, ResourceKind::Phase, project.id).await?;
    t.core.delete_with_cascade(ResourceKind::Phase, phases[0].id, &owner).await?;

    let written = t.core.bulk_grant(project.id, &[target], PermissionLevel::View, &owner).await?;

    // project + 3 live descendants; the deleted phase gets nothing
    assert_eq!(written, 4);
    let on_deleted = t.store.find_entry(t.org, target, ResourceKind::Phase, phases[0].id).await?;
    assert!(on_deleted.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_bulk_grant_rolls_back_every_write() -> Result<()> {
    common::test_core(); // tracing init
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let owner = common::member(org);

    // fail on the 7th entry write: mid-way through the second user
    let flaky = Arc::new(FlakyAccessStore { inner: store.clone(), fail_on_write: 7 });
    let datastore = Datastore::new(store.clone(), flaky, store.clone());
    let core = CascadeController::new(datastore);

    let project = seed_project(&core, &owner).await?;
    let entries_before = store.entry_count().await;
    let members_before = project.assignments.clone();

    let users = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let err = core
        .bulk_grant(project.id, &users, PermissionLevel::Edit, &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Backend(_))), "unexpected error: {err:?}");

    // nothing from this invocation survived
    assert_eq!(store.entry_count().await, entries_before);
    for user in users {
        assert!(store.find_entry(org, user, ResourceKind::Project, project.id).await?.is_none());
    }

    // and the project's member list is untouched
    let project = core.get_resource(ResourceKind::Project, project.id, &owner).await?;
    assert_eq!(project.assignments, members_before);
    Ok(())
}

/// Resource store decorator that starts failing updates after a threshold.
struct FlakyResourceStore {
    inner: Arc<MemoryStore>,
    updates: AtomicUsize,
    fail_after_updates: usize,
}

#[async_trait]
impl ResourceStore for FlakyResourceStore {
    async fn insert(&self, resource: &Resource) -> Result<(), StoreError> {
        self.inner.insert(resource).await
    }

    async fn update(&self, resource: &Resource) -> Result<(), StoreError> {
        let seen = self.updates.fetch_add(1, Ordering::SeqCst);
        if seen >= self.fail_after_updates {
            return Err(StoreError::Backend("injected update failure".into()));
        }
        self.inner.update(resource).await
    }

    async fn find(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<Option<Resource>, StoreError> {
        self.inner.find(organization_id, kind, id).await
    }

    async fn children_of(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        parent_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.children_of(organization_id, kind, parent_id).await
    }

    async fn list_by_project(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Uuid,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.list_by_project(organization_id, kind, project_id).await
    }

    async fn count_for_serial(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Option<Uuid>,
    ) -> Result<u64, StoreError> {
        self.inner.count_for_serial(organization_id, kind, project_id).await
    }
}

#[tokio::test]
async fn non_bulk_cascades_surface_partial_failure() -> Result<()> {
    common::test_core(); // tracing init
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let owner = common::member(org);

    // let the project creation through, then fail the phase's container link
    let flaky = Arc::new(FlakyResourceStore {
        inner: store.clone(),
        updates: AtomicUsize::new(0),
        fail_after_updates: 0,
    });
    let datastore = Datastore::new(flaky, store.clone(), store.clone());
    let core = CascadeController::new(datastore);

    let project = core.create_with_access(common::project_input("Apollo"), &owner).await?;

    let err = core
        .create_with_access(common::phase_input("Design", project.id), &owner)
        .await
        .unwrap_err();
    let CoreError::PartialCascade { stage, .. } = err else {
        panic!("expected partial cascade, got {err:?}");
    };
    assert_eq!(stage, "container-link");

    // the orphaned phase and its access entry are left in place, unlinked
    let phases = store.list_by_project(org, ResourceKind::Phase, project.id).await?;
    assert_eq!(phases.len(), 1);
    let project = store.find(org, ResourceKind::Project, project.id).await?.unwrap();
    assert!(project.phase_ids.is_empty());
    assert_eq!(project.statistics.total_phases, 0);
    Ok(())
}
