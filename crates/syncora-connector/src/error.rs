//! Connector error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

use syncora_core::IntegrationId;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish connection to the external platform.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// External platform is temporarily unavailable.
    #[error("platform unavailable: {message}")]
    PlatformUnavailable { message: String },

    /// Network error during communication.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Platform API rate limit hit.
    #[error("rate limited{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    // Authentication errors (usually permanent)
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Credentials have expired.
    #[error("authentication failed: credentials expired")]
    CredentialsExpired,

    /// Insufficient permissions for the operation.
    #[error("authorization failed: insufficient permissions for {operation}")]
    AuthorizationFailed { operation: String },

    // Configuration errors (permanent)
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No factory registered for the requested platform.
    #[error("unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },

    /// Connector was used before `initialize` succeeded.
    #[error("connector not initialized for integration {integration_id}")]
    NotInitialized { integration_id: IntegrationId },

    // Data errors
    /// Remote write collided with a concurrent change to the same record.
    #[error("conflict detected on record {record_id}: {message}")]
    ConflictDetected { record_id: String, message: String },

    /// Record not found on the external platform.
    #[error("record not found: {identifier}")]
    RecordNotFound { identifier: String },

    /// Entity type is not supported by this connector.
    #[error("unsupported entity type: {entity_type}")]
    UnsupportedEntityType { entity_type: String },

    /// Invalid data format.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Operation errors
    /// Operation failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Sync run was cancelled before completion.
    #[error("sync cancelled")]
    Cancelled,

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization error.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl ConnectorError {
    /// Check if this error is transient and the operation should be retried.
    ///
    /// Transient errors are those caused by temporary conditions that may resolve
    /// themselves, such as network issues or temporary unavailability.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::PlatformUnavailable { .. }
                | ConnectorError::NetworkError { .. }
                | ConnectorError::RateLimited { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    ///
    /// Permanent errors require human intervention or configuration changes.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this error represents a write conflict on the remote platform.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConnectorError::ConflictDetected { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::PlatformUnavailable { .. } => "PLATFORM_UNAVAILABLE",
            ConnectorError::NetworkError { .. } => "NETWORK_ERROR",
            ConnectorError::RateLimited { .. } => "RATE_LIMITED",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::CredentialsExpired => "CREDENTIALS_EXPIRED",
            ConnectorError::AuthorizationFailed { .. } => "AUTHORIZATION_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::UnsupportedPlatform { .. } => "UNSUPPORTED_PLATFORM",
            ConnectorError::NotInitialized { .. } => "NOT_INITIALIZED",
            ConnectorError::ConflictDetected { .. } => "CONFLICT_DETECTED",
            ConnectorError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            ConnectorError::UnsupportedEntityType { .. } => "UNSUPPORTED_ENTITY_TYPE",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
            ConnectorError::Cancelled => "CANCELLED",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a conflict detected error.
    pub fn conflict(record_id: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::ConflictDetected {
            record_id: record_id.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
