//! Autoscaler error types.

use thiserror::Error;

use loadscale_state::{PolicyId, StateError};

/// Errors surfaced by the policy lifecycle operations.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("invalid policy: {0}")]
    Validation(String),

    #[error("policy not found: {0}")]
    NotFound(PolicyId),

    #[error("policy {0} is active; deactivate it first or force the deletion")]
    PolicyActive(PolicyId),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type AutoscaleResult<T> = Result<T, AutoscaleError>;
