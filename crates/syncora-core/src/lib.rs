//! syncora Core Library
//!
//! Shared types and traits for syncora.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (OrgId, IntegrationId, JobId, OperationId, ConflictId)
//! - [`traits`] - Organization scoping traits (OrgScoped)
//! - [`error`] - Standardized error types (CoreError)
//!
//! # Example
//!
//! ```
//! use syncora_core::{OrgId, JobId, OrgScoped, CoreError, Result};
//!
//! // Create strongly typed IDs
//! let org_id = OrgId::new();
//! let job_id = JobId::new();
//!
//! // Use Result type alias
//! fn example() -> Result<()> {
//!     Err(CoreError::NotFound {
//!         resource: "SyncJob".to_string(),
//!         id: None,
//!     })
//! }
//! ```

pub mod error;
pub mod ids;
pub mod traits;

// Re-export main types for convenient access
pub use error::{CoreError, Result};
pub use ids::{ConflictId, IntegrationId, JobId, OperationId, OrgId, ParseIdError};
pub use traits::OrgScoped;
