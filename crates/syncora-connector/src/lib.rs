//! # Connector Framework
//!
//! Core abstractions for connecting syncora to external commerce platforms.
//!
//! This crate defines the narrow contract the sync engine depends on: a
//! [`Connector`] per platform integration, built through registered
//! [`ConnectorFactory`] implementations and cached per
//! `(platform, integration)` by [`ConnectorCache`].
//!
//! ## Example
//!
//! ```ignore
//! use syncora_connector::prelude::*;
//!
//! // Register factories once at startup
//! let cache = ConnectorCache::new();
//! cache.register_factory(shopify_factory).await;
//!
//! // Lazily build + initialize an instance
//! let connector = cache.get_or_init(Platform::Shopify, &config).await?;
//!
//! // Reconcile one entity type
//! let result = connector.sync("products", &EntitySyncOptions::full()).await?;
//! println!("processed {}", result.processed);
//! ```
//!
//! ## Crate Organization
//!
//! - [`types`] - Platform and sync-mode enums
//! - [`error`] - Error types with transient/permanent classification
//! - [`config`] - Connector configuration
//! - [`options`] - Per-entity sync options and results
//! - [`traits`] - The connector contract and factory trait
//! - [`cache`] - Instance cache with explicit eviction

pub mod cache;
pub mod config;
pub mod error;
pub mod options;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use syncora_connector::prelude::*;
/// ```
pub mod prelude {
    // Types and enums
    pub use crate::types::{Platform, SyncMode};

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Configuration
    pub use crate::config::ConnectorConfig;

    // Options and results
    pub use crate::options::{CandidateConflict, EntitySyncOptions, EntitySyncResult};

    // Contract
    pub use crate::traits::{Connector, ConnectorFactory};

    // Cache
    pub use crate::cache::ConnectorCache;
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;

pub use cache::ConnectorCache;
pub use config::ConnectorConfig;
pub use error::{ConnectorError, ConnectorResult};
pub use options::{CandidateConflict, EntitySyncOptions, EntitySyncResult};
pub use traits::{Connector, ConnectorFactory};
pub use types::{Platform, SyncMode};
