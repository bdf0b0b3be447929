//! Offline queue error types

use thiserror::Error;

/// Error that can occur in the offline queue.
#[derive(Debug, Error)]
pub enum OfflineError {
    /// Local durable store failure.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// The backing store rejected a replayed write as conflicting.
    #[error("conflicting write: {message}")]
    Conflict { message: String },

    /// Non-conflict failure replaying a write against the backing store.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OfflineError {
    /// Create a local storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        OfflineError::Storage {
            message: message.into(),
        }
    }

    /// Create a conflict error for a replayed write.
    pub fn conflict(message: impl Into<String>) -> Self {
        OfflineError::Conflict {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        OfflineError::Backend {
            message: message.into(),
        }
    }

    /// True when the error marks a conflicting write.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, OfflineError::Conflict { .. })
    }
}

/// Result type for offline queue operations.
pub type OfflineResult<T> = Result<T, OfflineError>;
