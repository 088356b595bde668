//! Structured failure taxonomy shared by every engine operation.
//!
//! The engine never produces user-facing text; the HTTP layer maps these
//! codes to status lines and the game front-end localizes them.

use crate::db::gateway::GatewayError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Operation is not valid for the entity's current status.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Mutual-exclusion invariant would be violated (already allied,
    /// already at war, duplicate pending request, ...).
    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// Durable-store write failed; the in-memory state was left unchanged.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<GatewayError> for EngineError {
    fn from(e: GatewayError) -> Self {
        EngineError::Persistence(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
