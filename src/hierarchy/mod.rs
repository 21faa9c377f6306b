use std::collections::HashSet;
use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::resource::{Resource, ResourceKind};
use crate::store::ResourceStore;

/// Ancestor/descendant traversal over an injected resource store.
///
/// Both walks carry a visited set and a step bound matching the depth cap, so
/// a corrupted parent pointer fails fast instead of looping.
pub struct HierarchyWalker {
    resources: Arc<dyn ResourceStore>,
}

impl HierarchyWalker {
    pub fn new(resources: Arc<dyn ResourceStore>) -> Self {
        Self { resources }
    }

    /// Walk `parent_id` links upward one fetch at a time, oldest first. The
    /// walk stops at the first missing parent reference.
    pub async fn ancestors(&self, resource: &Resource) -> Result<Vec<Resource>, CoreError> {
        let step_limit = CoreConfig::get().hierarchy.walk_step_limit;
        let mut visited: HashSet<_> = [resource.id].into();
        let mut chain = Vec::new();

        let mut cursor = resource.parent_id;
        while let Some(parent_id) = cursor {
            if !visited.insert(parent_id) {
                return Err(CoreError::CorruptHierarchy(format!(
                    "parent cycle through {} {}",
                    resource.kind, parent_id
                )));
            }
            if chain.len() >= step_limit {
                return Err(CoreError::CorruptHierarchy(format!(
                    "ancestor walk exceeded {} steps from {} {}",
                    step_limit, resource.kind, resource.id
                )));
            }

            let parent = self
                .resources
                .find(resource.organization_id, resource.kind, parent_id)
                .await?;
            match parent {
                Some(parent) => {
                    cursor = parent.parent_id;
                    chain.push(parent);
                }
                None => break,
            }
        }

        chain.reverse();
        Ok(chain)
    }

    /// Breadth-first traversal of same-kind children, every depth included.
    pub async fn descendants(&self, resource: &Resource) -> Result<Vec<Resource>, CoreError> {
        let step_limit = CoreConfig::get().hierarchy.walk_step_limit;
        let mut visited: HashSet<_> = [resource.id].into();
        let mut found = Vec::new();

        let mut frontier = vec![resource.id];
        let mut depth = 0usize;

        while !frontier.is_empty() {
            depth += 1;
            if depth > step_limit {
                return Err(CoreError::CorruptHierarchy(format!(
                    "descendant walk exceeded {} levels from {} {}",
                    step_limit, resource.kind, resource.id
                )));
            }

            let mut next = Vec::new();
            for parent_id in frontier {
                let children = self
                    .resources
                    .children_of(resource.organization_id, resource.kind, parent_id)
                    .await?;
                for child in children {
                    if !visited.insert(child.id) {
                        return Err(CoreError::CorruptHierarchy(format!(
                            "child cycle through {} {}",
                            resource.kind, child.id
                        )));
                    }
                    next.push(child.id);
                    found.push(child);
                }
            }
            frontier = next;
        }

        Ok(found)
    }

    /// The one explicit full recalculation: a folder's total size is its own
    /// direct document bytes plus every descendant folder's. The refreshed
    /// value is written into the statistics block; the caller persists.
    pub async fn recalculate_folder_size(&self, folder: &mut Resource) -> Result<u64, CoreError> {
        debug_assert_eq!(folder.kind, ResourceKind::Folder);

        let descendants = self.descendants(folder).await?;
        let total = folder.statistics.document_size
            + descendants.iter().map(|d| d.statistics.document_size).sum::<u64>();

        folder.statistics.total_size = total;
        tracing::debug!(
            "recalculated folder {} size: {} bytes across {} folders",
            folder.id,
            total,
            descendants.len() + 1
        );
        Ok(total)
    }
}
