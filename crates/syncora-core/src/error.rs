//! Error Types
//!
//! This module provides standardized error types shared across syncora crates.
//!
//! # Example
//!
//! ```
//! use syncora_core::{CoreError, Result};
//!
//! fn find_integration(id: &str) -> Result<String> {
//!     if id.is_empty() {
//!         return Err(CoreError::NotFound {
//!             resource: "Integration".to_string(),
//!             id: None,
//!         });
//!     }
//!     Ok(format!("Integration {}", id))
//! }
//! ```

use crate::ids::OrgId;
use serde::Serialize;
use thiserror::Error;

/// Standardized error type for syncora.
///
/// This enum provides consistent error types that can be used across all
/// syncora crates for cross-cutting failures: missing records, org isolation
/// violations and input validation.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// Requested resource was not found.
    ///
    /// Use when a store lookup returns no results.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// The type of resource that was not found (e.g., "Integration", "SyncJob")
        resource: String,
        /// Optional identifier of the resource
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Org isolation violation.
    ///
    /// Use when an operation attempts to access data owned by a different
    /// organization. This is a critical security error.
    #[error("Org mismatch: expected {expected}, got {actual}")]
    OrgMismatch {
        /// The expected org ID
        expected: OrgId,
        /// The actual org ID that was provided
        actual: OrgId,
    },

    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

/// Type alias for Results using `CoreError`.
///
/// ```
/// use syncora_core::{Result, CoreError};
///
/// fn example() -> Result<String> {
///     Ok("success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, CoreError>;
