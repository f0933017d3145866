use thiserror::Error;

use poleyard_auth::AuthzError;
use poleyard_infra::command_dispatcher::DispatchError;

/// Operation-level error surfaced by [`crate::YardService`].
///
/// Flattens the domain and infrastructure taxonomies into the shape callers
/// handle. `Consistency` is the one variant that indicates partial
/// application (a follow-up append failed after a first commit); it is
/// logged at error level where it is raised.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    NoStockAvailable { requested: u32, available: u32 },

    #[error("reject record already marked collected")]
    AlreadyCollected,

    #[error("ledger failure: {0}")]
    Ledger(String),

    #[error("partial application, manual reconciliation needed: {0}")]
    Consistency(String),
}

impl From<DispatchError> for OperationError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => OperationError::Conflict(msg),
            DispatchError::Validation(msg) => OperationError::Validation(msg),
            DispatchError::InvariantViolation(msg) => OperationError::InvariantViolation(msg),
            DispatchError::Unauthorized => OperationError::Unauthorized,
            DispatchError::NotFound => OperationError::NotFound,
            DispatchError::NoStockAvailable {
                requested,
                available,
            } => OperationError::NoStockAvailable {
                requested,
                available,
            },
            DispatchError::AlreadyCollected => OperationError::AlreadyCollected,
            DispatchError::Deserialize(msg) => OperationError::Ledger(msg),
            DispatchError::Store(e) => OperationError::Ledger(e.to_string()),
            DispatchError::Publish(msg) => OperationError::Ledger(msg),
        }
    }
}
