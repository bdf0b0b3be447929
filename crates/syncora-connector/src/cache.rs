//! Connector instance cache
//!
//! One live connector per `(platform, integration)`, created lazily through
//! registered factories, tested on demand and explicitly disconnected on
//! eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::{Connector, ConnectorFactory};
use crate::types::Platform;
use syncora_core::IntegrationId;

type CacheKey = (Platform, IntegrationId);

struct CacheEntry {
    connector: Arc<dyn Connector>,
    last_used: Instant,
}

/// Cache of live connector instances.
///
/// Factories are registered once at startup; `get_or_init` builds and
/// initializes instances on demand and only stores them when
/// `initialize` succeeds. Idle eviction is an explicit tick invoked by an
/// owning scheduler, not an ambient background interval.
pub struct ConnectorCache {
    factories: RwLock<HashMap<Platform, Arc<dyn ConnectorFactory>>>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ConnectorCache {
    /// Create an empty cache with no registered factories.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory for its platform.
    ///
    /// Replaces any previously registered factory for the same platform.
    pub async fn register_factory(&self, factory: Arc<dyn ConnectorFactory>) {
        let platform = factory.platform();
        self.factories.write().await.insert(platform, factory);
        debug!(platform = %platform, "connector factory registered");
    }

    /// Get the cached connector for `(platform, integration)`, building and
    /// initializing one if absent.
    ///
    /// An instance whose `initialize` fails is disconnected best-effort and
    /// never cached; the next call starts from a fresh build.
    #[instrument(skip(self, config), fields(platform = %platform, integration_id = %config.integration_id))]
    pub async fn get_or_init(
        &self,
        platform: Platform,
        config: &ConnectorConfig,
    ) -> ConnectorResult<Arc<dyn Connector>> {
        let key = (platform, config.integration_id);

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                return Ok(Arc::clone(&entry.connector));
            }
        }

        config.validate()?;

        let factory = {
            let factories = self.factories.read().await;
            factories
                .get(&platform)
                .cloned()
                .ok_or_else(|| ConnectorError::UnsupportedPlatform {
                    platform: platform.to_string(),
                })?
        };

        // Holding the write lock across build + initialize serializes
        // initialization per cache, so a key never gets two live instances.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(&key) {
            return Ok(Arc::clone(&entry.connector));
        }

        let connector = factory.build(config).await?;
        if let Err(init_err) = connector.initialize().await {
            warn!(
                platform = %platform,
                integration_id = %config.integration_id,
                error = %init_err,
                "connector initialization failed, discarding instance"
            );
            if let Err(disc_err) = connector.disconnect().await {
                warn!(
                    platform = %platform,
                    integration_id = %config.integration_id,
                    error = %disc_err,
                    "disconnect after failed initialization also failed"
                );
            }
            return Err(init_err);
        }

        entries.insert(
            key,
            CacheEntry {
                connector: Arc::clone(&connector),
                last_used: Instant::now(),
            },
        );
        info!(
            platform = %platform,
            integration_id = %config.integration_id,
            "connector initialized and cached"
        );
        Ok(connector)
    }

    /// Test the connection of a cached instance.
    ///
    /// Returns `NotInitialized` if no instance is cached for the key.
    pub async fn test_connection(
        &self,
        platform: Platform,
        integration_id: IntegrationId,
    ) -> ConnectorResult<()> {
        let connector = {
            let mut entries = self.entries.write().await;
            let entry = entries.get_mut(&(platform, integration_id)).ok_or(
                ConnectorError::NotInitialized { integration_id },
            )?;
            entry.last_used = Instant::now();
            Arc::clone(&entry.connector)
        };
        connector.test_connection().await
    }

    /// Evict and disconnect every entry for an integration.
    ///
    /// Used when credentials rotate. Disconnect failures are logged, never
    /// propagated.
    #[instrument(skip(self))]
    pub async fn evict_integration(&self, integration_id: IntegrationId) -> usize {
        let removed: Vec<(CacheKey, CacheEntry)> = {
            let mut entries = self.entries.write().await;
            let keys: Vec<CacheKey> = entries
                .keys()
                .filter(|(_, id)| *id == integration_id)
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
                .collect()
        };

        let count = removed.len();
        for ((platform, id), entry) in removed {
            Self::disconnect_evicted(platform, id, &entry.connector).await;
        }
        if count > 0 {
            info!(integration_id = %integration_id, count, "evicted connectors for integration");
        }
        count
    }

    /// Evict and disconnect every cached entry. Used at shutdown.
    pub async fn evict_all(&self) -> usize {
        let removed: Vec<(CacheKey, CacheEntry)> = {
            let mut entries = self.entries.write().await;
            entries.drain().collect()
        };

        let count = removed.len();
        for ((platform, id), entry) in removed {
            Self::disconnect_evicted(platform, id, &entry.connector).await;
        }
        info!(count, "evicted all cached connectors");
        count
    }

    /// Evict entries not used within `max_idle`.
    ///
    /// Invoked by an owning scheduler tick.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let removed: Vec<(CacheKey, CacheEntry)> = {
            let mut entries = self.entries.write().await;
            let keys: Vec<CacheKey> = entries
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_used) >= max_idle)
                .map(|(k, _)| *k)
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
                .collect()
        };

        let count = removed.len();
        for ((platform, id), entry) in removed {
            debug!(platform = %platform, integration_id = %id, "evicting idle connector");
            Self::disconnect_evicted(platform, id, &entry.connector).await;
        }
        count
    }

    /// Number of live cached instances.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no instances.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn disconnect_evicted(
        platform: Platform,
        integration_id: IntegrationId,
        connector: &Arc<dyn Connector>,
    ) {
        if let Err(err) = connector.disconnect().await {
            warn!(
                platform = %platform,
                integration_id = %integration_id,
                error = %err,
                "disconnect during eviction failed"
            );
        }
    }
}

impl Default for ConnectorCache {
    fn default() -> Self {
        Self::new()
    }
}
