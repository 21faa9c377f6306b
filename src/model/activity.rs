use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::change::ChangeSet;
use crate::model::permission::Actor;
use crate::model::resource::{Resource, ResourceKind};

/// What happened, as recorded in the per-organization activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    ResourceCreated,
    ResourceDeleted,
    ResourceRestored,
    AccessGranted,
    AccessRevoked,
    MemberAdded,
    MemberRemoved,
    StatusChanged,
    DocumentAdded,
    DocumentRemoved,
    IssueRecorded,
    IssueCompleted,
    IssueReopened,
    IssueRemoved,
    CommentAdded,
    FieldUpdated,
    SizeRecalculated,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::ResourceCreated => "resource_created",
            ActivityAction::ResourceDeleted => "resource_deleted",
            ActivityAction::ResourceRestored => "resource_restored",
            ActivityAction::AccessGranted => "access_granted",
            ActivityAction::AccessRevoked => "access_revoked",
            ActivityAction::MemberAdded => "member_added",
            ActivityAction::MemberRemoved => "member_removed",
            ActivityAction::StatusChanged => "status_changed",
            ActivityAction::DocumentAdded => "document_added",
            ActivityAction::DocumentRemoved => "document_removed",
            ActivityAction::IssueRecorded => "issue_recorded",
            ActivityAction::IssueCompleted => "issue_completed",
            ActivityAction::IssueReopened => "issue_reopened",
            ActivityAction::IssueRemoved => "issue_removed",
            ActivityAction::CommentAdded => "comment_added",
            ActivityAction::FieldUpdated => "field_updated",
            ActivityAction::SizeRecalculated => "size_recalculated",
        }
    }

    pub fn category(&self) -> ActivityCategory {
        match self {
            ActivityAction::ResourceCreated
            | ActivityAction::ResourceDeleted
            | ActivityAction::ResourceRestored
            | ActivityAction::StatusChanged => ActivityCategory::ResourceLifecycle,
            ActivityAction::AccessGranted | ActivityAction::AccessRevoked => {
                ActivityCategory::AccessControl
            }
            ActivityAction::MemberAdded | ActivityAction::MemberRemoved => {
                ActivityCategory::Membership
            }
            ActivityAction::DocumentAdded
            | ActivityAction::DocumentRemoved
            | ActivityAction::IssueRecorded
            | ActivityAction::IssueCompleted
            | ActivityAction::IssueReopened
            | ActivityAction::IssueRemoved
            | ActivityAction::CommentAdded
            | ActivityAction::FieldUpdated => ActivityCategory::Content,
            ActivityAction::SizeRecalculated => ActivityCategory::Statistics,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    ResourceLifecycle,
    AccessControl,
    Membership,
    Content,
    Statistics,
}

impl ActivityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityCategory::ResourceLifecycle => "resource_lifecycle",
            ActivityCategory::AccessControl => "access_control",
            ActivityCategory::Membership => "membership",
            ActivityCategory::Content => "content",
            ActivityCategory::Statistics => "statistics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Input for one append-only activity log write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub action: ActivityAction,
    pub resource_kind: ResourceKind,
    pub resource_id: Uuid,
    pub resource_name: String,
    pub category: ActivityCategory,
    pub severity: Severity,
    pub details: String,
    pub changes: Option<ChangeSet>,
    pub metadata: Value,
}

impl NewActivity {
    /// Standard entry for an action on a resource; severity defaults to info
    /// and the category follows the action.
    pub fn for_resource(
        actor: &Actor,
        action: ActivityAction,
        resource: &Resource,
        details: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: actor.organization_id,
            user_id: actor.user_id,
            action,
            resource_kind: resource.kind,
            resource_id: resource.id,
            resource_name: resource.name.clone(),
            category: action.category(),
            severity: Severity::Info,
            details: details.into(),
            changes: None,
            metadata: Value::Null,
        }
    }

    pub fn with_changes(mut self, changes: ChangeSet) -> Self {
        if !changes.is_empty() {
            self.changes = Some(changes);
        }
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// A persisted activity log row. The core only ever appends these; querying
/// them back is the embedding layer's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub action: ActivityAction,
    pub resource_kind: ResourceKind,
    pub resource_id: Uuid,
    pub resource_name: String,
    pub category: ActivityCategory,
    pub severity: Severity,
    pub details: String,
    pub changes: Option<ChangeSet>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn from_new(new: NewActivity) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            user_id: new.user_id,
            action: new.action,
            resource_kind: new.resource_kind,
            resource_id: new.resource_id,
            resource_name: new.resource_name,
            category: new.category,
            severity: new.severity,
            details: new.details,
            changes: new.changes,
            metadata: new.metadata,
            created_at: Utc::now(),
        }
    }
}
