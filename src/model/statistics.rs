use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::resource::ResourceKind;

/// Embedded counter block carried by every resource.
///
/// Counters move incrementally on each add/remove mutation and floor at zero
/// on removal; nothing here is recomputed by a full rescan except `total_size`,
/// which is refreshed only by the explicit folder-size recalculation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatistics {
    pub total_subprojects: u32,
    pub total_phases: u32,
    pub total_sprints: u32,
    pub total_folders: u32,
    pub total_documents: u32,
    pub total_issues: u32,
    pub completed_issues: u32,
    /// Bytes held directly by this resource's documents
    pub document_size: u64,
    /// Direct bytes plus descendant folders, refreshed by recalculation only
    pub total_size: u64,
    pub last_updated: DateTime<Utc>,
}

impl ResourceStatistics {
    pub fn new() -> Self {
        Self {
            total_subprojects: 0,
            total_phases: 0,
            total_sprints: 0,
            total_folders: 0,
            total_documents: 0,
            total_issues: 0,
            completed_issues: 0,
            document_size: 0,
            total_size: 0,
            last_updated: Utc::now(),
        }
    }

    /// Bump the child counter for a newly linked resource of `kind`.
    pub fn record_child_added(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::Project => self.total_subprojects += 1,
            ResourceKind::Phase => self.total_phases += 1,
            ResourceKind::Sprint => self.total_sprints += 1,
            ResourceKind::Folder => self.total_folders += 1,
        }
    }

    /// Decrement the child counter for an unlinked resource, floored at zero.
    pub fn record_child_removed(&mut self, kind: ResourceKind) {
        let counter = match kind {
            ResourceKind::Project => &mut self.total_subprojects,
            ResourceKind::Phase => &mut self.total_phases,
            ResourceKind::Sprint => &mut self.total_sprints,
            ResourceKind::Folder => &mut self.total_folders,
        };
        *counter = counter.saturating_sub(1);
    }

    pub fn record_document_added(&mut self, size_bytes: u64) {
        self.total_documents += 1;
        self.document_size += size_bytes;
        self.total_size += size_bytes;
    }

    pub fn record_document_removed(&mut self, size_bytes: u64) {
        self.total_documents = self.total_documents.saturating_sub(1);
        self.document_size = self.document_size.saturating_sub(size_bytes);
        self.total_size = self.total_size.saturating_sub(size_bytes);
    }

    pub fn record_issue_added(&mut self) {
        self.total_issues += 1;
    }

    pub fn record_issue_completed(&mut self) {
        if self.completed_issues < self.total_issues {
            self.completed_issues += 1;
        }
    }

    pub fn record_issue_reopened(&mut self) {
        self.completed_issues = self.completed_issues.saturating_sub(1);
    }

    pub fn record_issue_removed(&mut self, was_completed: bool) {
        self.total_issues = self.total_issues.saturating_sub(1);
        if was_completed {
            self.completed_issues = self.completed_issues.saturating_sub(1);
        }
    }

    /// Issues not yet completed. Derived, never stored.
    pub fn open_issues(&self) -> u32 {
        self.total_issues.saturating_sub(self.completed_issues)
    }

    /// Issue completion percentage. Derived, never stored.
    pub fn completion_rate(&self) -> u32 {
        completion_rate(self.completed_issues, self.total_issues)
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

impl Default for ResourceStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounded percentage of `completed` over `total`; 0 when `total` is 0.
pub fn completion_rate(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u32
}
