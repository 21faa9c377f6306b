use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::access::AccessResolver;
use crate::error::CoreError;
use crate::hierarchy::HierarchyWalker;
use crate::model::access::AccessControlEntry;
use crate::model::activity::{ActivityAction, NewActivity};
use crate::model::change::ChangeSet;
use crate::model::fields::{Attachment, Comment, CustomField, FieldType, FieldValue};
use crate::model::permission::{Actor, PermissionLevel};
use crate::model::resource::{
    format_serial, AssignmentRole, NewResource, Resource, ResourceKind, StatusOp,
    MAX_NESTING_DEPTH,
};
use crate::notify::{NoopNotifier, Notifier};
use crate::store::{Datastore, StoreError};

/// Orchestrates every create/delete/grant as one logical unit: the resource
/// write, its access entry, parent/container linkage, statistics and the
/// activity log entry.
///
/// Outside the bulk grant these steps are best-effort sequential writes; a
/// failure after the first write surfaces as `PartialCascade` and leaves the
/// intermediate state in place.
pub struct CascadeController {
    store: Datastore,
    resolver: AccessResolver,
    walker: HierarchyWalker,
    notifier: Arc<dyn Notifier>,
}

impl CascadeController {
    pub fn new(store: Datastore) -> Self {
        let resolver = AccessResolver::new(store.access.clone());
        let walker = HierarchyWalker::new(store.resources.clone());
        Self { store, resolver, walker, notifier: Arc::new(NoopNotifier) }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn resolver(&self) -> &AccessResolver {
        &self.resolver
    }

    // ========================================
    // Create / delete / restore
    // ========================================

    /// Create a resource together with its access entry, container linkage
    /// and activity log entry.
    pub async fn create_with_access(
        &self,
        input: NewResource,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        if input.name.trim().is_empty() {
            return Err(CoreError::validation("resource name cannot be empty"));
        }
        self.validate_container_refs(&input)?;

        let org = actor.organization_id;

        let parent = match input.parent_id {
            Some(parent_id) => {
                let parent = self.load_live(org, input.kind, parent_id).await?;
                if !parent.can_create_child() {
                    return Err(CoreError::validation(format!(
                        "nesting depth cap of {} reached under {} {}",
                        MAX_NESTING_DEPTH, parent.kind, parent.id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let container = match declared_container(&input) {
            Some((kind, id)) => Some(self.load_live(org, kind, id).await?),
            None => None,
        };

        // Edit-or-above on the declared parent, or on the container when the
        // resource is not nested.
        if let Some(target) = parent.as_ref().or(container.as_ref()) {
            self.resolver.ensure(actor, target, PermissionLevel::Edit).await?;
        }

        let serial = self.next_serial(org, input.kind, input.project_id).await?;
        let resource = Resource::build(org, &input, serial, actor.user_id, parent.as_ref());

        self.store.resources.insert(&resource).await?;

        self.resolver
            .grant(&resource, actor.user_id, PermissionLevel::Admin, actor.user_id)
            .await
            .map_err(|e| CoreError::partial("access-entry", e))?;

        if let Some(mut container) = container {
            if container.add_to_collection(resource.kind, resource.id) {
                container.touch();
                self.store
                    .resources
                    .update(&container)
                    .await
                    .map_err(|e| CoreError::partial("container-link", e))?;
            }
        }

        if let Some(mut parent) = parent {
            if parent.add_child(resource.id) {
                parent.touch();
                self.store
                    .resources
                    .update(&parent)
                    .await
                    .map_err(|e| CoreError::partial("parent-link", e))?;
            }
        }

        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::ResourceCreated,
                &resource,
                format!("created {} '{}' ({})", resource.kind, resource.name, resource.serial),
            ),
        )
        .await?;

        tracing::info!(
            "created {} {} ({}) at level {} in org {}",
            resource.kind,
            resource.id,
            resource.serial,
            resource.hierarchy_level,
            org
        );
        Ok(resource)
    }

    /// Soft-delete a resource and unlink it from its container and parent.
    /// Descendants and access entries stay untouched and independently
    /// reachable.
    pub async fn delete_with_cascade(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let org = actor.organization_id;
        let mut resource = self.load_live(org, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Admin).await?;

        let before = resource.clone();
        resource.soft_delete(actor.user_id);
        resource.touch();
        self.store.resources.update(&resource).await?;

        if let Some((container_kind, container_id)) = resource.primary_container() {
            let container = self
                .store
                .resources
                .find(org, container_kind, container_id)
                .await
                .map_err(|e| CoreError::partial("container-unlink", e))?;
            if let Some(mut container) = container {
                if container.remove_from_collection(kind, id) {
                    container.touch();
                    self.store
                        .resources
                        .update(&container)
                        .await
                        .map_err(|e| CoreError::partial("container-unlink", e))?;
                }
            }
        }

        if let Some(parent_id) = resource.parent_id {
            let parent = self
                .store
                .resources
                .find(org, kind, parent_id)
                .await
                .map_err(|e| CoreError::partial("parent-unlink", e))?;
            if let Some(mut parent) = parent {
                if parent.remove_child(id) {
                    parent.touch();
                    self.store
                        .resources
                        .update(&parent)
                        .await
                        .map_err(|e| CoreError::partial("parent-unlink", e))?;
                }
            }
        }

        let changes = ChangeSet::diff(&before, &resource).map_err(StoreError::from)?;
        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::ResourceDeleted,
                &resource,
                format!("deleted {} '{}'", resource.kind, resource.name),
            )
            .with_changes(changes),
        )
        .await?;

        tracing::info!("soft-deleted {} {} in org {}", kind, id, org);
        Ok(resource)
    }

    /// Undo a soft delete. The resource is not re-linked into its parent or
    /// container automatically.
    pub async fn restore(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let org = actor.organization_id;
        let mut resource = self.load_any(org, kind, id).await?;
        if !resource.is_deleted {
            return Err(CoreError::validation(format!("{} {} is not deleted", kind, id)));
        }
        self.resolver.ensure(actor, &resource, PermissionLevel::Admin).await?;

        resource.restore();
        resource.touch();
        self.store.resources.update(&resource).await?;

        self.append_activity(NewActivity::for_resource(
            actor,
            ActivityAction::ResourceRestored,
            &resource,
            format!("restored {} '{}'", resource.kind, resource.name),
        ))
        .await?;

        Ok(resource)
    }

    // ========================================
    // Reads
    // ========================================

    /// Access-checked read; resolution happens before any data leaves.
    pub async fn get_resource(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::View).await?;
        Ok(resource)
    }

    /// Ancestors oldest-first, behind a view check on the starting resource.
    pub async fn ancestors(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<Resource>, CoreError> {
        let resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::View).await?;
        self.walker.ancestors(&resource).await
    }

    /// All same-kind descendants in BFS order.
    pub async fn descendants(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<Resource>, CoreError> {
        let resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::View).await?;
        self.walker.descendants(&resource).await
    }

    // ========================================
    // Access management
    // ========================================

    pub async fn grant_access(
        &self,
        kind: ResourceKind,
        id: Uuid,
        target_user: Uuid,
        level: PermissionLevel,
        actor: &Actor,
    ) -> Result<AccessControlEntry, CoreError> {
        let resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Admin).await?;

        let entry = self.resolver.grant(&resource, target_user, level, actor.user_id).await?;

        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::AccessGranted,
                &resource,
                format!("granted {} on {} '{}'", level, resource.kind, resource.name),
            )
            .with_metadata(json!({
                "target_user": target_user,
                "level": level.as_str(),
                "access_type": entry.access_type.as_str(),
            })),
        )
        .await?;

        self.notifier.access_granted(target_user, &resource, level, actor.user_id).await;
        Ok(entry)
    }

    pub async fn revoke_access(
        &self,
        kind: ResourceKind,
        id: Uuid,
        target_user: Uuid,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> Result<AccessControlEntry, CoreError> {
        let resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Admin).await?;

        let entry = self
            .store
            .access
            .find_entry(actor.organization_id, target_user, kind, id)
            .await?
            .ok_or_else(|| {
                CoreError::not_found(format!("no access entry for user {} on {} {}", target_user, kind, id))
            })?;

        let reason = reason.into();
        let entry = self.resolver.revoke(entry, actor.user_id, reason.clone()).await?;

        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::AccessRevoked,
                &resource,
                format!("revoked access on {} '{}': {}", resource.kind, resource.name, reason),
            )
            .with_metadata(json!({ "target_user": target_user })),
        )
        .await?;

        Ok(entry)
    }

    /// Grant `level` on a project and an inherited entry on every non-deleted
    /// phase, sprint and folder under it, for each target user. The writes of
    /// one invocation are atomic: any failure rolls all of them back.
    pub async fn bulk_grant(
        &self,
        project_id: Uuid,
        user_ids: &[Uuid],
        level: PermissionLevel,
        actor: &Actor,
    ) -> Result<usize, CoreError> {
        if user_ids.is_empty() {
            return Err(CoreError::validation("bulk grant requires at least one target user"));
        }

        let org = actor.organization_id;
        let project = self.load_live(org, ResourceKind::Project, project_id).await?;
        self.resolver.ensure(actor, &project, PermissionLevel::Admin).await?;

        let mut descendants = Vec::new();
        for kind in [ResourceKind::Phase, ResourceKind::Sprint, ResourceKind::Folder] {
            descendants.extend(self.store.resources.list_by_project(org, kind, project_id).await?);
        }

        let written = self
            .resolver
            .cascade_grant(&project, &descendants, user_ids, level, actor.user_id)
            .await?;

        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::AccessGranted,
                &project,
                format!("bulk-granted {} across project '{}'", level, project.name),
            )
            .with_metadata(json!({
                "users": user_ids.len(),
                "entries_written": written,
            })),
        )
        .await?;

        Ok(written)
    }

    // ========================================
    // Membership
    // ========================================

    pub async fn add_member(
        &self,
        kind: ResourceKind,
        id: Uuid,
        target_user: Uuid,
        role: AssignmentRole,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        if resource.assign(target_user, role) {
            resource.touch();
            self.store.resources.update(&resource).await?;
            self.append_activity(
                NewActivity::for_resource(
                    actor,
                    ActivityAction::MemberAdded,
                    &resource,
                    format!("added member to {} '{}'", resource.kind, resource.name),
                )
                .with_metadata(json!({ "target_user": target_user })),
            )
            .await?;
        }
        Ok(resource)
    }

    /// The owner is implicitly a permanent participant and cannot leave
    /// through this path.
    pub async fn remove_member(
        &self,
        kind: ResourceKind,
        id: Uuid,
        target_user: Uuid,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        if target_user == resource.owner_id {
            return Err(CoreError::validation(format!(
                "owner of {} {} cannot be removed",
                kind, id
            )));
        }

        if resource.unassign(target_user) {
            resource.touch();
            self.store.resources.update(&resource).await?;
            self.append_activity(
                NewActivity::for_resource(
                    actor,
                    ActivityAction::MemberRemoved,
                    &resource,
                    format!("removed member from {} '{}'", resource.kind, resource.name),
                )
                .with_metadata(json!({ "target_user": target_user })),
            )
            .await?;
        }
        Ok(resource)
    }

    // ========================================
    // Status
    // ========================================

    /// Apply a lifecycle transition; disallowed edges are silent no-ops and
    /// only actual changes are persisted and logged.
    pub async fn transition_status(
        &self,
        kind: ResourceKind,
        id: Uuid,
        op: StatusOp,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        let before = resource.clone();
        if !resource.apply_status(op) {
            return Ok(resource);
        }

        resource.touch();
        self.store.resources.update(&resource).await?;

        let changes = ChangeSet::diff(&before, &resource).map_err(StoreError::from)?;
        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::StatusChanged,
                &resource,
                format!("{} '{}' is now {}", resource.kind, resource.name, resource.status.as_str()),
            )
            .with_changes(changes),
        )
        .await?;

        Ok(resource)
    }

    // ========================================
    // Contained items and statistics
    // ========================================

    pub async fn record_document(
        &self,
        kind: ResourceKind,
        id: Uuid,
        attachment: Attachment,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        resource.statistics.record_document_added(attachment.size_bytes);
        resource.touch();
        self.store.resources.update(&resource).await?;

        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::DocumentAdded,
                &resource,
                format!("added document '{}'", attachment.file_name),
            )
            .with_metadata(json!({
                "file_name": attachment.file_name,
                "size_bytes": attachment.size_bytes,
                "content_type": attachment.content_type,
            })),
        )
        .await?;

        Ok(resource)
    }

    pub async fn remove_document(
        &self,
        kind: ResourceKind,
        id: Uuid,
        size_bytes: u64,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        resource.statistics.record_document_removed(size_bytes);
        resource.touch();
        self.store.resources.update(&resource).await?;

        self.append_activity(NewActivity::for_resource(
            actor,
            ActivityAction::DocumentRemoved,
            &resource,
            format!("removed a document from {} '{}'", resource.kind, resource.name),
        ))
        .await?;

        Ok(resource)
    }

    pub async fn record_issue(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        self.issue_op(kind, id, actor, ActivityAction::IssueRecorded, |stats| {
            stats.record_issue_added()
        })
        .await
    }

    pub async fn complete_issue(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        self.issue_op(kind, id, actor, ActivityAction::IssueCompleted, |stats| {
            stats.record_issue_completed()
        })
        .await
    }

    pub async fn reopen_issue(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        self.issue_op(kind, id, actor, ActivityAction::IssueReopened, |stats| {
            stats.record_issue_reopened()
        })
        .await
    }

    pub async fn remove_issue(
        &self,
        kind: ResourceKind,
        id: Uuid,
        was_completed: bool,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        self.issue_op(kind, id, actor, ActivityAction::IssueRemoved, move |stats| {
            stats.record_issue_removed(was_completed)
        })
        .await
    }

    async fn issue_op(
        &self,
        kind: ResourceKind,
        id: Uuid,
        actor: &Actor,
        action: ActivityAction,
        mutate: impl FnOnce(&mut crate::model::statistics::ResourceStatistics),
    ) -> Result<Resource, CoreError> {
        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        mutate(&mut resource.statistics);
        resource.touch();
        self.store.resources.update(&resource).await?;

        self.append_activity(NewActivity::for_resource(
            actor,
            action,
            &resource,
            format!(
                "{} issues, {} completed on {} '{}'",
                resource.statistics.total_issues,
                resource.statistics.completed_issues,
                resource.kind,
                resource.name
            ),
        ))
        .await?;

        Ok(resource)
    }

    pub async fn add_comment(
        &self,
        kind: ResourceKind,
        id: Uuid,
        body: impl Into<String>,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(CoreError::validation("comment body cannot be empty"));
        }

        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        resource.add_comment(Comment::new(actor.user_id, body));
        resource.touch();
        self.store.resources.update(&resource).await?;

        self.append_activity(NewActivity::for_resource(
            actor,
            ActivityAction::CommentAdded,
            &resource,
            format!("commented on {} '{}'", resource.kind, resource.name),
        ))
        .await?;

        Ok(resource)
    }

    /// Upsert a custom field, validating the value against its declared type
    /// before anything is written.
    pub async fn set_custom_field(
        &self,
        kind: ResourceKind,
        id: Uuid,
        name: impl Into<String>,
        field_type: FieldType,
        value: FieldValue,
        actor: &Actor,
    ) -> Result<Resource, CoreError> {
        let field = CustomField::validated(name, field_type, value).map_err(CoreError::Validation)?;

        let mut resource = self.load_live(actor.organization_id, kind, id).await?;
        self.resolver.ensure(actor, &resource, PermissionLevel::Edit).await?;

        resource.set_custom_field(field.clone());
        resource.touch();
        self.store.resources.update(&resource).await?;

        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::FieldUpdated,
                &resource,
                format!("updated field '{}' on {} '{}'", field.name, resource.kind, resource.name),
            )
            .with_metadata(json!({ "field": field.name })),
        )
        .await?;

        Ok(resource)
    }

    /// Refresh a folder's recursive size from its own documents and every
    /// descendant folder.
    pub async fn recalculate_folder_size(
        &self,
        folder_id: Uuid,
        actor: &Actor,
    ) -> Result<u64, CoreError> {
        let mut folder = self
            .load_live(actor.organization_id, ResourceKind::Folder, folder_id)
            .await?;
        self.resolver.ensure(actor, &folder, PermissionLevel::Edit).await?;

        let total = self.walker.recalculate_folder_size(&mut folder).await?;
        folder.touch();
        self.store.resources.update(&folder).await?;

        self.append_activity(
            NewActivity::for_resource(
                actor,
                ActivityAction::SizeRecalculated,
                &folder,
                format!("recalculated size of folder '{}'", folder.name),
            )
            .with_metadata(json!({ "total_size": total })),
        )
        .await?;

        Ok(total)
    }

    // ========================================
    // Internals
    // ========================================

    async fn load_any(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<Resource, CoreError> {
        self.store
            .resources
            .find(organization_id, kind, id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("{} {}", kind, id)))
    }

    async fn load_live(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<Resource, CoreError> {
        let resource = self.load_any(organization_id, kind, id).await?;
        if resource.is_deleted {
            return Err(CoreError::not_found(format!("{} {} is deleted", kind, id)));
        }
        Ok(resource)
    }

    /// Allocate the next serial by counting existing rows. Not unique under
    /// concurrent creation and not idempotent under retry.
    async fn next_serial(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        project_id: Option<Uuid>,
    ) -> Result<String, CoreError> {
        let scope = if kind.serial_scoped_to_project() { project_id } else { None };
        let count = self.store.resources.count_for_serial(organization_id, kind, scope).await?;
        Ok(format_serial(kind, count + 1))
    }

    async fn append_activity(&self, entry: NewActivity) -> Result<(), CoreError> {
        self.store
            .activity
            .append(entry)
            .await
            .map_err(|e| CoreError::partial("activity-log", e))
    }

    fn validate_container_refs(&self, input: &NewResource) -> Result<(), CoreError> {
        match input.kind {
            ResourceKind::Project => Ok(()),
            ResourceKind::Phase | ResourceKind::Sprint => {
                if input.project_id.is_none() {
                    return Err(CoreError::validation(format!(
                        "a {} requires a project reference",
                        input.kind
                    )));
                }
                Ok(())
            }
            ResourceKind::Folder => {
                if input.project_id.is_none()
                    && input.phase_id.is_none()
                    && input.sprint_id.is_none()
                {
                    return Err(CoreError::validation(
                        "a folder requires at least one container reference",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn declared_container(input: &NewResource) -> Option<(ResourceKind, Uuid)> {
    if let Some(id) = input.sprint_id {
        return Some((ResourceKind::Sprint, id));
    }
    if let Some(id) = input.phase_id {
        return Some((ResourceKind::Phase, id));
    }
    input.project_id.map(|id| (ResourceKind::Project, id))
}
