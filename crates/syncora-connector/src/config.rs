//! Connector configuration types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConnectorError, ConnectorResult};
use syncora_core::{IntegrationId, OrgId, OrgScoped};

/// Configuration handed to a connector factory when building an instance.
///
/// Credentials and settings are opaque JSON at this layer; each platform
/// connector deserializes them into its own typed config and validates the
/// platform-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// The integration this connector serves.
    pub integration_id: IntegrationId,
    /// Organization that owns the integration.
    pub org_id: OrgId,
    /// Platform credentials (API keys, tokens). Never logged verbatim.
    pub credentials: Value,
    /// Platform-specific settings (endpoints, batch sizes, feature flags).
    #[serde(default)]
    pub settings: Value,
}

impl ConnectorConfig {
    /// Create a config with empty settings.
    pub fn new(integration_id: IntegrationId, org_id: OrgId, credentials: Value) -> Self {
        Self {
            integration_id,
            org_id,
            credentials,
            settings: Value::Null,
        }
    }

    /// Set platform-specific settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    /// Validate the shape of the configuration.
    ///
    /// Platform connectors perform their own field-level validation; this
    /// only rejects configs that no connector could use.
    pub fn validate(&self) -> ConnectorResult<()> {
        if !self.credentials.is_object() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "credentials must be a JSON object".to_string(),
            });
        }
        if !(self.settings.is_null() || self.settings.is_object()) {
            return Err(ConnectorError::InvalidConfiguration {
                message: "settings must be a JSON object when present".to_string(),
            });
        }
        Ok(())
    }

    /// Create a redacted copy safe for logging and display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let credentials = match &self.credentials {
            Value::Object(map) => Value::Object(
                map.keys()
                    .map(|k| (k.clone(), Value::String("***".to_string())))
                    .collect(),
            ),
            _ => Value::String("***".to_string()),
        };
        Self {
            integration_id: self.integration_id,
            org_id: self.org_id,
            credentials,
            settings: self.settings.clone(),
        }
    }
}

impl OrgScoped for ConnectorConfig {
    fn org_id(&self) -> OrgId {
        self.org_id
    }
}
