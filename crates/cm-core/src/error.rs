//! Error taxonomy for the service layer.

use thiserror::Error;

use crate::types::ValidationError;

/// Errors surfaced by the core services.
///
/// `Persistence` always implies the in-flight unit of work was rolled back;
/// callers may safely retry settlement after seeing it.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The request was malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation conflicts with one already in flight.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is not authorized for this operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The storage layer failed; the unit of work was rolled back.
    #[error("storage failure: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl ServiceError {
    /// Builds a `NotFound` error for the given entity and identifier.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wraps a storage-layer error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Box::new(err))
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
