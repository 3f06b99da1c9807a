//! Errors surfaced by the world store and the narrative log.

use chasm_domain::{DomainError, EntityKey, EntityKind};

/// Outcome classes of a store operation.
///
/// `NotFound`, `Validation` and `Conflict` are per-call and recoverable;
/// `StorageFatal` means the backing storage is unusable and must stop the
/// simulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage failure in {operation}: {message}")]
    StorageFatal {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(key: &EntityKey) -> Self {
        Self::NotFound {
            kind: key.kind(),
            key: key.id(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn storage(operation: &'static str, message: impl ToString) -> Self {
        Self::StorageFatal {
            operation,
            message: message.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageFatal { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.to_string())
    }
}
