//! Load test error types.

use thiserror::Error;

use crate::types::{RunId, RunStatus};

#[derive(Debug, Error)]
pub enum LoadTestError {
    #[error("invalid load test: {0}")]
    Validation(String),

    #[error("load test not found: {0}")]
    NotFound(RunId),

    #[error("load test {id} has no result yet (status: {status})")]
    NotReady { id: RunId, status: RunStatus },
}

pub type LoadTestResult<T> = Result<T, LoadTestError>;
