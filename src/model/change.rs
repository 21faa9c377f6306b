use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field-level difference between two snapshots of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Before/after snapshot attached to activity log entries.
///
/// Unchanged fields are omitted; the diff walks the union of top-level keys
/// of the serialized resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<FieldChange>,
}

impl ChangeSet {
    /// Diff two serializable snapshots of the same entity.
    pub fn diff<T: Serialize>(before: &T, after: &T) -> Result<Self, serde_json::Error> {
        let before = serde_json::to_value(before)?;
        let after = serde_json::to_value(after)?;

        let (Value::Object(before), Value::Object(after)) = (before, after) else {
            return Ok(Self::default());
        };

        let mut changes = Vec::new();

        for (field, old_value) in &before {
            match after.get(field) {
                Some(new_value) if new_value != old_value => changes.push(FieldChange {
                    field: field.clone(),
                    old_value: Some(old_value.clone()),
                    new_value: Some(new_value.clone()),
                }),
                Some(_) => {}
                None => changes.push(FieldChange {
                    field: field.clone(),
                    old_value: Some(old_value.clone()),
                    new_value: None,
                }),
            }
        }

        for (field, new_value) in &after {
            if !before.contains_key(field) {
                changes.push(FieldChange {
                    field: field.clone(),
                    old_value: None,
                    new_value: Some(new_value.clone()),
                });
            }
        }

        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn touched(&self, field: &str) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }
}
