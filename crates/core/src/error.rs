//! Errors raised by the pure domain layer.

use crate::types::TaskId;

/// Failure from task bookkeeping, route policy or media URL resolution.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Unknown task or resource.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: TaskId },

    /// Caller-supplied input was rejected (bad URL, bad parameter).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested state transition is not allowed from the current status.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Misconfiguration or an invariant broken inside the process.
    #[error("Internal error: {0}")]
    Internal(String),
}
