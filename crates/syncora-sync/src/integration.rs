//! Platform integration model
//!
//! An integration binds an organization to one external platform account,
//! carrying the credentials and settings connectors are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use syncora_connector::{ConnectorConfig, Platform};
use syncora_core::{IntegrationId, OrgId, OrgScoped};

/// A configured connection to one external platform account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    /// Unique integration id.
    pub id: IntegrationId,
    /// Owning organization.
    pub org_id: OrgId,
    /// External platform this integration targets.
    pub platform: Platform,
    /// Display name shown to operators.
    pub name: String,
    /// Platform credentials.
    pub credentials: Value,
    /// Platform-specific settings.
    pub settings: Value,
    /// When the integration was created.
    pub created_at: DateTime<Utc>,
}

impl Integration {
    /// Create a new integration.
    pub fn new(
        org_id: OrgId,
        platform: Platform,
        name: impl Into<String>,
        credentials: Value,
        settings: Value,
    ) -> Self {
        Self {
            id: IntegrationId::new(),
            org_id,
            platform,
            name: name.into(),
            credentials,
            settings,
            created_at: Utc::now(),
        }
    }

    /// Build the connector configuration for this integration.
    #[must_use]
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig::new(self.id, self.org_id, self.credentials.clone())
            .with_settings(self.settings.clone())
    }
}

impl OrgScoped for Integration {
    fn org_id(&self) -> OrgId {
        self.org_id
    }
}
