//! Connector type definitions
//!
//! Enums and types shared by connector implementations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External platform a connector talks to.
///
/// The set is closed for typing purposes; wiring a platform into the
/// runtime happens through factory registration on the cache, so adding
/// a variant here does not require touching any dispatch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// NetSuite ERP
    Netsuite,
    /// Shopify e-commerce
    Shopify,
    /// Microsoft Dynamics 365
    Dynamics,
    /// Magento / Adobe Commerce
    Magento,
}

impl Platform {
    /// Get all known platforms.
    #[must_use]
    pub fn all() -> &'static [Platform] {
        &[
            Platform::Netsuite,
            Platform::Shopify,
            Platform::Dynamics,
            Platform::Magento,
        ]
    }

    /// Get the string representation used in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Netsuite => "netsuite",
            Platform::Shopify => "shopify",
            Platform::Dynamics => "dynamics",
            Platform::Magento => "magento",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "netsuite" => Ok(Platform::Netsuite),
            "shopify" => Ok(Platform::Shopify),
            "dynamics" => Ok(Platform::Dynamics),
            "magento" => Ok(Platform::Magento),
            _ => Err(ParsePlatformError(s.to_string())),
        }
    }
}

/// Error parsing platform from string.
#[derive(Debug, Clone)]
pub struct ParsePlatformError(String);

impl fmt::Display for ParsePlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid platform '{}', expected one of: netsuite, shopify, dynamics, magento",
            self.0
        )
    }
}

impl std::error::Error for ParsePlatformError {}

/// How a sync run walks the remote data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch every record, ignoring any stored cursor.
    Full,
    /// Fetch only records changed since the stored cursor.
    #[default]
    Incremental,
}

impl SyncMode {
    /// Get the string representation used in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = ParseSyncModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            _ => Err(ParseSyncModeError(s.to_string())),
        }
    }
}

/// Error parsing sync mode from string.
#[derive(Debug, Clone)]
pub struct ParseSyncModeError(String);

impl fmt::Display for ParseSyncModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid sync mode '{}', expected one of: full, incremental",
            self.0
        )
    }
}

impl std::error::Error for ParseSyncModeError {}
