//! Organization Scoping Traits
//!
//! This module provides traits for org-owned entities in syncora.
//!
//! # Example
//!
//! ```
//! use syncora_core::{OrgId, OrgScoped};
//!
//! struct Integration {
//!     id: uuid::Uuid,
//!     org_id: OrgId,
//!     platform: String,
//! }
//!
//! impl OrgScoped for Integration {
//!     fn org_id(&self) -> OrgId {
//!         self.org_id
//!     }
//! }
//!
//! // Generic function that works with any OrgScoped entity
//! fn verify_org<T: OrgScoped>(entity: &T, expected: OrgId) -> bool {
//!     entity.org_id() == expected
//! }
//!
//! let org = OrgId::new();
//! let integration = Integration {
//!     id: uuid::Uuid::new_v4(),
//!     org_id: org,
//!     platform: "shopify".to_string(),
//! };
//!
//! assert!(verify_org(&integration, org));
//! ```

use crate::ids::OrgId;

/// Trait for entities that belong to a specific organization.
///
/// Implementing this trait marks an entity as org-scoped, enabling
/// compile-time verification that org isolation is properly implemented.
/// Jobs, conflicts and queued operations all implement it.
///
/// # Object Safety
///
/// This trait is object-safe, meaning it can be used with trait objects:
/// `Box<dyn OrgScoped>` or `&dyn OrgScoped`.
pub trait OrgScoped {
    /// Returns the organization ID that owns this entity.
    ///
    /// This method returns an owned `OrgId` (which is `Copy`) for convenience,
    /// allowing callers to use the value without lifetime concerns.
    fn org_id(&self) -> OrgId;
}
