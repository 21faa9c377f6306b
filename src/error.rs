use thiserror::Error;

use crate::store::StoreError;

/// Core error taxonomy surfaced to the embedding layer.
///
/// Every variant maps to a distinct caller-facing category; `PartialCascade`
/// carries the stage at which a multi-step cascade stopped, with the
/// intermediate state left in place (no automatic compensation).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("hierarchy corrupted: {0}")]
    CorruptHierarchy(String),

    #[error("cascade failed at stage '{stage}': {source}")]
    PartialCascade {
        stage: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        CoreError::AccessDenied(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    /// Wrap a store failure that happened after the first write of a cascade.
    pub fn partial(stage: &'static str, source: StoreError) -> Self {
        CoreError::PartialCascade { stage, source }
    }
}
