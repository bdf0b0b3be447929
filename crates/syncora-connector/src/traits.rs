//! Connector contract
//!
//! The narrow contract every platform adapter implements. The sync engine
//! depends only on these traits, never on a platform's wire format.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ConnectorConfig;
use crate::error::ConnectorResult;
use crate::options::{EntitySyncOptions, EntitySyncResult};
use crate::types::Platform;

/// Contract implemented by every platform connector.
///
/// Instances are built by a [`ConnectorFactory`], initialized once, cached
/// per `(platform, integration)` and explicitly disconnected on eviction.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The platform this connector talks to.
    fn platform(&self) -> Platform;

    /// Display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Establish the session with the external platform.
    ///
    /// Called exactly once before the instance is cached. An instance whose
    /// `initialize` fails is disconnected and discarded, never reused.
    async fn initialize(&self) -> ConnectorResult<()>;

    /// Reconcile one entity type between the internal datastore and the
    /// platform.
    ///
    /// Implementations observe `options.cancel` between batches and honor
    /// `options.cursor` for incremental runs.
    async fn sync(
        &self,
        entity_type: &str,
        options: &EntitySyncOptions,
    ) -> ConnectorResult<EntitySyncResult>;

    /// Test the connection to the external platform.
    ///
    /// Returns `Ok(())` if the connection is usable, or an error describing
    /// what went wrong.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Release platform resources.
    ///
    /// Called when the instance is evicted from the cache. Implementations
    /// should close sessions, revoke short-lived tokens, etc.
    async fn disconnect(&self) -> ConnectorResult<()>;
}

/// Builds connector instances for one platform.
///
/// Factories are registered on the cache at startup; construction is
/// registry-driven rather than a hardcoded platform switch.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// The platform this factory builds connectors for.
    fn platform(&self) -> Platform;

    /// Build an uninitialized connector from its configuration.
    ///
    /// The cache calls `initialize` on the result; factories should not
    /// perform network I/O here.
    async fn build(&self, config: &ConnectorConfig) -> ConnectorResult<Arc<dyn Connector>>;
}
