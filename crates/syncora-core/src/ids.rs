//! Strongly Typed Identifiers
//!
//! This module provides type-safe identifier types for syncora.
//! Using the newtype pattern, these types prevent accidental misuse of
//! different ID types at compile time.
//!
//! # Example
//!
//! ```
//! use syncora_core::{OrgId, IntegrationId};
//!
//! let org = OrgId::new();
//! let integration = IntegrationId::new();
//!
//! // Type safety: cannot pass IntegrationId where OrgId is expected
//! fn requires_org(id: OrgId) -> String {
//!     id.to_string()
//! }
//!
//! let result = requires_org(org);
//! // requires_org(integration); // This would not compile!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Strongly typed identifier for organizations.
    ///
    /// Every record the platform touches is owned by exactly one
    /// organization; sync jobs, integrations, conflicts and queued
    /// operations all carry an `OrgId`.
    ///
    /// # Example
    ///
    /// ```
    /// use syncora_core::OrgId;
    /// use uuid::Uuid;
    ///
    /// // Create a new random OrgId
    /// let org_id = OrgId::new();
    /// println!("Org: {}", org_id);
    ///
    /// // Create from existing UUID
    /// let uuid = Uuid::new_v4();
    /// let org_id = OrgId::from_uuid(uuid);
    /// assert_eq!(org_id.as_uuid(), &uuid);
    ///
    /// // Parse from string
    /// let org_id: OrgId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
    /// ```
    OrgId
);

define_id!(
    /// Strongly typed identifier for platform integrations.
    ///
    /// An integration is one configured connection between an organization
    /// and an external platform (ERP, e-commerce storefront, marketplace).
    IntegrationId
);

define_id!(
    /// Strongly typed identifier for sync jobs.
    JobId
);

define_id!(
    /// Strongly typed identifier for queued offline operations.
    OperationId
);

define_id!(
    /// Strongly typed identifier for sync conflicts.
    ConflictId
);
