use std::sync::Arc;

use uuid::Uuid;

use lattice_core::cascade::CascadeController;
use lattice_core::model::permission::{Actor, OrgRole};
use lattice_core::model::resource::{NewResource, ResourceKind};
use lattice_core::store::memory::MemoryStore;

/// A memory-backed core plus the handles tests poke at directly.
pub struct TestCore {
    pub store: Arc<MemoryStore>,
    pub core: CascadeController,
    pub org: Uuid,
}

pub fn test_core() -> TestCore {
    init_tracing();
    let store = MemoryStore::new();
    let core = CascadeController::new(store.datastore());
    TestCore { store, core, org: Uuid::new_v4() }
}

/// A regular organization member with no implicit privileges.
pub fn member(org: Uuid) -> Actor {
    Actor::new(Uuid::new_v4(), org, OrgRole::Member)
}

/// An organization admin (entry-table bypass).
pub fn org_admin(org: Uuid) -> Actor {
    Actor::new(Uuid::new_v4(), org, OrgRole::Admin)
}

/// Project input with no parent or containers.
pub fn project_input(name: &str) -> NewResource {
    NewResource::named(ResourceKind::Project, name)
}

/// Phase input contained in a project.
pub fn phase_input(name: &str, project_id: Uuid) -> NewResource {
    NewResource { project_id: Some(project_id), ..NewResource::named(ResourceKind::Phase, name) }
}

/// Sprint input contained in a project.
pub fn sprint_input(name: &str, project_id: Uuid) -> NewResource {
    NewResource { project_id: Some(project_id), ..NewResource::named(ResourceKind::Sprint, name) }
}

/// Folder input contained in a project, optionally nested under a folder.
pub fn folder_input(name: &str, project_id: Uuid, parent_id: Option<Uuid>) -> NewResource {
    NewResource {
        project_id: Some(project_id),
        parent_id,
        ..NewResource::named(ResourceKind::Folder, name)
    }
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    });
}
