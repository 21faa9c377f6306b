use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::permission::{AccessType, PermissionLevel};
use crate::model::resource::ResourceKind;

/// The container/parent a grant was derived from, recorded once at grant
/// time and never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedFrom {
    pub kind: ResourceKind,
    pub id: Uuid,
}

/// A single permission grant for (organization, user, resource).
///
/// Rows are never physically deleted: revocation flips `is_active` and stamps
/// the actor, time and reason so the history stays auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub resource_kind: ResourceKind,
    pub resource_id: Uuid,

    pub level: PermissionLevel,
    pub access_type: AccessType,
    pub inherited_from: Option<InheritedFrom>,

    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,

    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,

    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub revocation_reason: Option<String>,
}

impl AccessControlEntry {
    pub fn direct(
        organization_id: Uuid,
        user_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
        level: PermissionLevel,
        granted_by: Uuid,
    ) -> Self {
        Self {
            organization_id,
            user_id,
            resource_kind,
            resource_id,
            level,
            access_type: AccessType::Direct,
            inherited_from: None,
            granted_by,
            granted_at: Utc::now(),
            is_active: true,
            expires_at: None,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
        }
    }

    pub fn inherited(
        organization_id: Uuid,
        user_id: Uuid,
        resource_kind: ResourceKind,
        resource_id: Uuid,
        level: PermissionLevel,
        granted_by: Uuid,
        from: InheritedFrom,
    ) -> Self {
        Self {
            access_type: AccessType::Inherited,
            inherited_from: Some(from),
            ..Self::direct(organization_id, user_id, resource_kind, resource_id, level, granted_by)
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Pure permission check: false when inactive or expired, otherwise a
    /// level-rank comparison.
    pub fn has_permission_at(&self, required: PermissionLevel, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.is_expired_at(now) {
            return false;
        }
        self.level.satisfies(required)
    }

    pub fn has_permission(&self, required: PermissionLevel) -> bool {
        self.has_permission_at(required, Utc::now())
    }

    /// Update an existing entry in place on re-grant: new level and actor,
    /// revocation cleared. Prior levels are not kept beyond the activity log.
    pub fn regrant(&mut self, level: PermissionLevel, granted_by: Uuid) {
        self.level = level;
        self.granted_by = granted_by;
        self.granted_at = Utc::now();
        self.is_active = true;
        self.revoked_at = None;
        self.revoked_by = None;
        self.revocation_reason = None;
    }

    /// Soft revocation; the row survives for audit.
    pub fn revoke(&mut self, revoked_by: Uuid, reason: impl Into<String>) {
        self.is_active = false;
        self.revoked_at = Some(Utc::now());
        self.revoked_by = Some(revoked_by);
        self.revocation_reason = Some(reason.into());
    }
}
