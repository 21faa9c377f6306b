use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::access::{AccessControlEntry, InheritedFrom};
use crate::model::permission::{Actor, PermissionLevel};
use crate::model::resource::Resource;
use crate::store::{AccessStore, StoreError};

/// Outcome of an access resolution, with the rule that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(GrantReason),
    Denied(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    /// Organization admin or superadmin
    OrgRole,
    /// Resource owner
    Owner,
    /// Assigned to the resource (read-only shortcut)
    Assignee,
    /// Active, unexpired access control entry
    Entry,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }
}

/// The single policy every operation consults before touching a resource.
///
/// Role shortcuts and ownership bypass the entry table entirely; an entry is
/// only consulted for non-owner, non-privileged actors, in this order:
/// org role, owner, assignment shortcut, entry lookup, deny.
pub struct AccessResolver {
    access: Arc<dyn AccessStore>,
}

impl AccessResolver {
    pub fn new(access: Arc<dyn AccessStore>) -> Self {
        Self { access }
    }

    pub async fn resolve(
        &self,
        actor: &Actor,
        resource: &Resource,
        required: PermissionLevel,
    ) -> Result<AccessDecision, StoreError> {
        if actor.organization_id != resource.organization_id {
            return Ok(AccessDecision::Denied("resource is outside the actor's organization".into()));
        }

        if actor.org_role.bypasses_entries() {
            return Ok(AccessDecision::Granted(GrantReason::OrgRole));
        }

        if resource.owner_id == actor.user_id {
            return Ok(AccessDecision::Granted(GrantReason::Owner));
        }

        // Assignees can always read; anything stronger still needs an entry.
        if required == PermissionLevel::View && resource.is_assignee(actor.user_id) {
            return Ok(AccessDecision::Granted(GrantReason::Assignee));
        }

        let entry = self
            .access
            .find_entry(actor.organization_id, actor.user_id, resource.kind, resource.id)
            .await?;

        match entry {
            Some(entry) if entry.has_permission(required) => {
                Ok(AccessDecision::Granted(GrantReason::Entry))
            }
            Some(_) => Ok(AccessDecision::Denied(format!(
                "entry on {} {} does not satisfy {}",
                resource.kind, resource.id, required
            ))),
            None => Ok(AccessDecision::Denied(format!(
                "no entry on {} {}",
                resource.kind, resource.id
            ))),
        }
    }

    /// Like [`resolve`](Self::resolve), but turns a denial into an error.
    pub async fn ensure(
        &self,
        actor: &Actor,
        resource: &Resource,
        required: PermissionLevel,
    ) -> Result<(), CoreError> {
        match self.resolve(actor, resource, required).await? {
            AccessDecision::Granted(reason) => {
                tracing::debug!(
                    "access granted: user={} resource={}/{} required={} via {:?}",
                    actor.user_id,
                    resource.kind,
                    resource.id,
                    required,
                    reason
                );
                Ok(())
            }
            AccessDecision::Denied(why) => {
                tracing::warn!(
                    "access denied: user={} resource={}/{} required={}: {}",
                    actor.user_id,
                    resource.kind,
                    resource.id,
                    required,
                    why
                );
                Err(CoreError::AccessDenied(why))
            }
        }
    }

    /// Create or update the grant for (org, user, resource).
    ///
    /// A fresh entry is classified `inherited` when the grantor already holds
    /// an active entry on the resource's immediate parent/container; the
    /// classification happens once, at grant time. Re-granting updates the
    /// existing row in place and clears any revocation.
    pub async fn grant(
        &self,
        resource: &Resource,
        target_user: Uuid,
        level: PermissionLevel,
        granted_by: Uuid,
    ) -> Result<AccessControlEntry, StoreError> {
        let existing = self
            .access
            .find_entry(resource.organization_id, target_user, resource.kind, resource.id)
            .await?;

        let entry = match existing {
            Some(mut entry) => {
                entry.regrant(level, granted_by);
                entry
            }
            None => match self.classify_inheritance(resource, granted_by).await? {
                Some(from) => AccessControlEntry::inherited(
                    resource.organization_id,
                    target_user,
                    resource.kind,
                    resource.id,
                    level,
                    granted_by,
                    from,
                ),
                None => AccessControlEntry::direct(
                    resource.organization_id,
                    target_user,
                    resource.kind,
                    resource.id,
                    level,
                    granted_by,
                ),
            },
        };

        self.access.upsert(&entry).await?;
        tracing::info!(
            "granted {} on {} {} to user {} ({:?})",
            level,
            resource.kind,
            resource.id,
            target_user,
            entry.access_type
        );
        Ok(entry)
    }

    async fn classify_inheritance(
        &self,
        resource: &Resource,
        grantor: Uuid,
    ) -> Result<Option<InheritedFrom>, StoreError> {
        let Some((parent_kind, parent_id)) = resource.inheritance_source() else {
            return Ok(None);
        };

        let parent_entry = self
            .access
            .find_entry(resource.organization_id, grantor, parent_kind, parent_id)
            .await?;

        let now = Utc::now();
        Ok(parent_entry
            .filter(|e| e.is_active && !e.is_expired_at(now))
            .map(|_| InheritedFrom { kind: parent_kind, id: parent_id }))
    }

    /// Soft-revoke an entry; the row stays behind for audit.
    pub async fn revoke(
        &self,
        mut entry: AccessControlEntry,
        revoked_by: Uuid,
        reason: impl Into<String>,
    ) -> Result<AccessControlEntry, StoreError> {
        entry.revoke(revoked_by, reason);
        self.access.upsert(&entry).await?;
        tracing::info!(
            "revoked access on {} {} for user {}",
            entry.resource_kind,
            entry.resource_id,
            entry.user_id
        );
        Ok(entry)
    }

    /// Bulk path: for each target user, a grant on the project itself plus an
    /// inherited entry on every non-deleted phase, sprint and folder under
    /// it. All writes of one invocation go through a single batch, so a
    /// failure anywhere rolls back everything.
    pub async fn cascade_grant(
        &self,
        project: &Resource,
        descendants: &[Resource],
        user_ids: &[Uuid],
        level: PermissionLevel,
        granted_by: Uuid,
    ) -> Result<usize, StoreError> {
        let mut batch = self.access.begin().await?;
        let mut written = 0usize;

        for &user_id in user_ids {
            let project_entry = AccessControlEntry::direct(
                project.organization_id,
                user_id,
                project.kind,
                project.id,
                level,
                granted_by,
            );
            batch.upsert(&project_entry).await?;
            written += 1;

            for descendant in descendants {
                let entry = AccessControlEntry::inherited(
                    descendant.organization_id,
                    user_id,
                    descendant.kind,
                    descendant.id,
                    level,
                    granted_by,
                    InheritedFrom { kind: project.kind, id: project.id },
                );
                batch.upsert(&entry).await?;
                written += 1;
            }
        }

        batch.commit().await?;
        tracing::info!(
            "cascade grant on project {} wrote {} entries for {} users",
            project.id,
            written,
            user_ids.len()
        );
        Ok(written)
    }
}
