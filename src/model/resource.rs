use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::model::fields::{Comment, CustomField};
use crate::model::statistics::ResourceStatistics;

/// Hard cap on hierarchy depth. Root resources sit at level 0; a child that
/// would land at this level is rejected.
pub const MAX_NESTING_DEPTH: u32 = 50;

/// The four resource types that share the hierarchical pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Project,
    Phase,
    Sprint,
    Folder,
}

impl ResourceKind {
    pub fn serial_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Project => "PRJ",
            ResourceKind::Phase => "PHS",
            ResourceKind::Sprint => "SPR",
            ResourceKind::Folder => "FLD",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Project => "project",
            ResourceKind::Phase => "phase",
            ResourceKind::Sprint => "sprint",
            ResourceKind::Folder => "folder",
        }
    }

    /// Phases and sprints number their serials within their project.
    pub fn serial_scoped_to_project(&self) -> bool {
        matches!(self, ResourceKind::Phase | ResourceKind::Sprint)
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(ResourceKind::Project),
            "phase" => Ok(ResourceKind::Phase),
            "sprint" => Ok(ResourceKind::Sprint),
            "folder" => Ok(ResourceKind::Folder),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state shared by all resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Planning,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Planning => "planning",
            ResourceStatus::Active => "active",
            ResourceStatus::Paused => "paused",
            ResourceStatus::Completed => "completed",
            ResourceStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(ResourceStatus::Planning),
            "active" => Ok(ResourceStatus::Active),
            "paused" => Ok(ResourceStatus::Paused),
            "completed" => Ok(ResourceStatus::Completed),
            "cancelled" => Ok(ResourceStatus::Cancelled),
            other => Err(format!("unknown resource status: {}", other)),
        }
    }
}

/// Requested lifecycle transition; anything outside the listed edges is a
/// no-op rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusOp {
    Start,
    Pause,
    Resume,
    Complete,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentRole {
    Owner,
    Maintainer,
    Member,
}

/// A (user, role) participation entry on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub user_id: Uuid,
    pub role: AssignmentRole,
    pub assigned_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(user_id: Uuid, role: AssignmentRole) -> Self {
        Self { user_id, role, assigned_at: Utc::now() }
    }
}

/// Input for creating a resource; the organization and owner come from the
/// authenticated actor.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub kind: ResourceKind,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub phase_id: Option<Uuid>,
    pub sprint_id: Option<Uuid>,
}

impl NewResource {
    pub fn named(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: None,
            parent_id: None,
            project_id: None,
            phase_id: None,
            sprint_id: None,
        }
    }
}

/// A hierarchical, organization-scoped resource (project, phase, sprint or
/// folder).
///
/// Hierarchy level and path are materialized at creation (or reparent) time
/// and are not re-propagated to descendants if an ancestor later moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub kind: ResourceKind,

    pub name: String,
    pub slug: String,
    pub serial: String,
    pub description: Option<String>,

    // Same-kind nesting
    pub parent_id: Option<Uuid>,
    pub child_ids: Vec<Uuid>,
    pub hierarchy_level: u32,
    pub hierarchy_path: String,

    // Cross-kind containment
    pub project_id: Option<Uuid>,
    pub phase_id: Option<Uuid>,
    pub sprint_id: Option<Uuid>,
    pub phase_ids: Vec<Uuid>,
    pub sprint_ids: Vec<Uuid>,
    pub folder_ids: Vec<Uuid>,

    pub owner_id: Uuid,
    pub assignments: Vec<Assignment>,

    pub status: ResourceStatus,
    pub progress: u8,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,

    pub statistics: ResourceStatistics,
    pub custom_fields: Vec<CustomField>,
    pub comments: Vec<Comment>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Factory construction: assigns the owner, stamps the serial, and
    /// materializes hierarchy level/path from the optional parent.
    ///
    /// Callers are responsible for linking the new resource into the parent's
    /// child list; construction never mutates the parent.
    pub fn build(
        organization_id: Uuid,
        input: &NewResource,
        serial: String,
        owner_id: Uuid,
        parent: Option<&Resource>,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let (hierarchy_level, hierarchy_path) = match parent {
            Some(parent) => (parent.hierarchy_level + 1, format!("{}/{}", parent.hierarchy_path, id)),
            None => (0, id.to_string()),
        };

        let name = input.name.trim().to_string();
        let slug = slugify(&name);

        Self {
            id,
            organization_id,
            kind: input.kind,
            name,
            slug,
            serial,
            description: input.description.clone(),
            parent_id: parent.map(|p| p.id),
            child_ids: Vec::new(),
            hierarchy_level,
            hierarchy_path,
            project_id: input.project_id,
            phase_id: input.phase_id,
            sprint_id: input.sprint_id,
            phase_ids: Vec::new(),
            sprint_ids: Vec::new(),
            folder_ids: Vec::new(),
            owner_id,
            assignments: vec![Assignment::new(owner_id, AssignmentRole::Owner)],
            status: ResourceStatus::Planning,
            progress: 0,
            is_active: true,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            actual_start_date: None,
            actual_end_date: None,
            statistics: ResourceStatistics::new(),
            custom_fields: Vec::new(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // ========================================
    // Hierarchy
    // ========================================

    /// False once a child would land at the depth cap.
    pub fn can_create_child(&self) -> bool {
        self.hierarchy_level + 1 < MAX_NESTING_DEPTH
    }

    /// Idempotent same-kind child link. Returns true when the child was
    /// actually added; the counter moves exactly once per distinct child.
    pub fn add_child(&mut self, child_id: Uuid) -> bool {
        if self.child_ids.contains(&child_id) {
            return false;
        }
        self.child_ids.push(child_id);
        self.statistics.record_child_added(self.kind);
        true
    }

    /// Unlink a same-kind child; the counter floors at zero.
    pub fn remove_child(&mut self, child_id: Uuid) -> bool {
        let before = self.child_ids.len();
        self.child_ids.retain(|id| *id != child_id);
        if self.child_ids.len() == before {
            return false;
        }
        self.statistics.record_child_removed(self.kind);
        true
    }

    /// Link a contained resource of another kind into this container's
    /// collection list. Idempotent, like `add_child`.
    pub fn add_to_collection(&mut self, kind: ResourceKind, id: Uuid) -> bool {
        let list = match kind {
            ResourceKind::Phase => &mut self.phase_ids,
            ResourceKind::Sprint => &mut self.sprint_ids,
            ResourceKind::Folder => &mut self.folder_ids,
            ResourceKind::Project => return false,
        };
        if list.contains(&id) {
            return false;
        }
        list.push(id);
        self.statistics.record_child_added(kind);
        true
    }

    pub fn remove_from_collection(&mut self, kind: ResourceKind, id: Uuid) -> bool {
        let list = match kind {
            ResourceKind::Phase => &mut self.phase_ids,
            ResourceKind::Sprint => &mut self.sprint_ids,
            ResourceKind::Folder => &mut self.folder_ids,
            ResourceKind::Project => return false,
        };
        let before = list.len();
        list.retain(|x| *x != id);
        if list.len() == before {
            return false;
        }
        self.statistics.record_child_removed(kind);
        true
    }

    /// The most specific container this resource hangs off.
    pub fn primary_container(&self) -> Option<(ResourceKind, Uuid)> {
        if let Some(id) = self.sprint_id {
            return Some((ResourceKind::Sprint, id));
        }
        if let Some(id) = self.phase_id {
            return Some((ResourceKind::Phase, id));
        }
        self.project_id.map(|id| (ResourceKind::Project, id))
    }

    /// Where grant classification looks for the grantor's existing entry:
    /// the same-kind parent when nested, otherwise the primary container.
    pub fn inheritance_source(&self) -> Option<(ResourceKind, Uuid)> {
        self.parent_id
            .map(|id| (self.kind, id))
            .or_else(|| self.primary_container())
    }

    // ========================================
    // Soft delete
    // ========================================

    /// Marks the resource deleted without touching children or access
    /// entries; callers unlink from the parent's child list separately.
    pub fn soft_delete(&mut self, by: Uuid) {
        self.is_deleted = true;
        self.is_active = false;
        self.deleted_at = Some(Utc::now());
        self.deleted_by = Some(by);
    }

    /// Inverse of `soft_delete`; does not re-link into the parent.
    pub fn restore(&mut self) {
        self.is_deleted = false;
        self.is_active = true;
        self.deleted_at = None;
        self.deleted_by = None;
    }

    // ========================================
    // Status machine
    // ========================================

    /// Apply a lifecycle transition. Returns true when the state changed;
    /// transitions outside the allowed edges are no-ops.
    pub fn apply_status(&mut self, op: StatusOp) -> bool {
        match (op, self.status) {
            (StatusOp::Start, ResourceStatus::Planning) => {
                self.status = ResourceStatus::Active;
                self.actual_start_date = Some(Utc::now());
                true
            }
            (StatusOp::Pause, ResourceStatus::Active) => {
                self.status = ResourceStatus::Paused;
                true
            }
            (StatusOp::Resume, ResourceStatus::Paused) => {
                self.status = ResourceStatus::Active;
                true
            }
            (StatusOp::Complete, ResourceStatus::Active | ResourceStatus::Paused) => {
                self.status = ResourceStatus::Completed;
                self.progress = 100;
                self.actual_end_date = Some(Utc::now());
                true
            }
            (StatusOp::Cancel, current) if current != ResourceStatus::Cancelled => {
                self.status = ResourceStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    // ========================================
    // Membership
    // ========================================

    pub fn is_assignee(&self, user_id: Uuid) -> bool {
        self.assignments.iter().any(|a| a.user_id == user_id)
    }

    /// Idempotent by user; a second assignment for the same user is ignored.
    pub fn assign(&mut self, user_id: Uuid, role: AssignmentRole) -> bool {
        if self.is_assignee(user_id) {
            return false;
        }
        self.assignments.push(Assignment::new(user_id, role));
        true
    }

    pub fn unassign(&mut self, user_id: Uuid) -> bool {
        let before = self.assignments.len();
        self.assignments.retain(|a| a.user_id != user_id);
        self.assignments.len() != before
    }

    // ========================================
    // Content
    // ========================================

    /// Upsert a custom field by name.
    pub fn set_custom_field(&mut self, field: CustomField) {
        if let Some(existing) = self.custom_fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.custom_fields.push(field);
        }
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Stamp `updated_at` and the statistics clock; called on every save
    /// regardless of which field changed.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.statistics.touch();
    }
}

/// URL-safe slug: lowercase, non-alphanumerics collapsed to single hyphens,
/// trimmed at both ends and truncated to the configured length.
pub fn slugify(name: &str) -> String {
    let max_len = CoreConfig::get().hierarchy.slug_max_len;
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = true; // swallow leading hyphens

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.len() > max_len {
        slug.pop();
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Type-prefixed, zero-padded serial number (`PRJ-000001`).
pub fn format_serial(kind: ResourceKind, sequence: u64) -> String {
    let width = CoreConfig::get().serial.pad_width;
    format!("{}-{:0width$}", kind.serial_prefix(), sequence, width = width)
}
