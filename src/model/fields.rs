use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of a custom field. Values are validated against this at the
/// boundary instead of accepting arbitrary shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Flag,
    Date,
    Selection,
}

/// A typed custom-field value. Tagged per kind rather than an open map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
    Date(DateTime<Utc>),
    Selection(String),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Flag(_) => FieldType::Flag,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::Selection(_) => FieldType::Selection,
        }
    }

    pub fn matches(&self, field_type: FieldType) -> bool {
        self.field_type() == field_type
    }
}

/// A named custom field with its declared type and current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub field_type: FieldType,
    pub value: FieldValue,
}

impl CustomField {
    /// Build a field, rejecting values that do not match the declared type.
    pub fn validated(
        name: impl Into<String>,
        field_type: FieldType,
        value: FieldValue,
    ) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("custom field name cannot be empty".to_string());
        }
        if !value.matches(field_type) {
            return Err(format!(
                "custom field '{}' declared as {:?} but value is {:?}",
                name,
                field_type,
                value.field_type()
            ));
        }
        Ok(Self { name, field_type, value })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(author_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

/// Metadata for a stored document; blob storage itself is external.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        size_bytes: u64,
        content_type: impl Into<String>,
        uploaded_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            size_bytes,
            content_type: content_type.into(),
            uploaded_by,
            uploaded_at: Utc::now(),
        }
    }
}
