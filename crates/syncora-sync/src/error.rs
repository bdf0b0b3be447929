//! Sync engine error types

use thiserror::Error;

use syncora_core::JobId;
use syncora_connector::ConnectorError;

use crate::store::StoreError;

/// Error that can occur in the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Input validation failure, surfaced immediately and never retried.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Caller does not own the integration it is targeting.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Job or related resource not found.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The configured cap on concurrently active jobs has been reached.
    #[error("concurrency limit reached: {active} active jobs (max {max})")]
    ConcurrencyLimit { active: usize, max: usize },

    /// A second executor attempted to run a job that is already active.
    #[error("job {job_id} is already executing")]
    AlreadyExecuting { job_id: JobId },

    /// The job's timeout fired before execution began.
    #[error("job {job_id} timed out before execution")]
    TimedOutBeforeExecution { job_id: JobId },

    /// Connector-level failure that escaped per-entity isolation.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Persistence failure. Infrastructure errors fail the whole job.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation {
            message: message.into(),
        }
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        SyncError::Forbidden {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        SyncError::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

/// Result type for sync engine operations.
pub type SyncEngineResult<T> = Result<T, SyncError>;
