//! Sync progress snapshots
//!
//! Ephemeral, publish-only progress state. Every snapshot overwrites the
//! previous one; nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a running sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Obtaining and testing the connector.
    #[default]
    Initializing,
    /// Walking entity types against the platform.
    Fetching,
    /// Writing the terminal result.
    Finalizing,
}

impl SyncPhase {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Initializing => "initializing",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest progress snapshot of a running job.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncProgress {
    /// Current phase.
    pub phase: SyncPhase,
    /// Entity types finished so far.
    pub entities_completed: u32,
    /// Entity types in the job configuration.
    pub entities_total: u32,
    /// Records processed so far across all entities.
    pub records_processed: u64,
    /// Expected record total, when known.
    pub records_total: Option<u64>,
    /// Completion percentage, entity-granular.
    pub percent: f32,
    /// Entity type currently being synced.
    pub current_entity: Option<String>,
}

impl SyncProgress {
    /// Snapshot for the initializing phase.
    #[must_use]
    pub fn initializing(entities_total: u32) -> Self {
        Self {
            phase: SyncPhase::Initializing,
            entities_total,
            ..Self::default()
        }
    }

    /// Snapshot while fetching the given entity.
    pub fn fetching(
        entities_completed: u32,
        entities_total: u32,
        records_processed: u64,
        current_entity: impl Into<String>,
    ) -> Self {
        Self {
            phase: SyncPhase::Fetching,
            entities_completed,
            entities_total,
            records_processed,
            records_total: None,
            percent: percent_of(entities_completed, entities_total),
            current_entity: Some(current_entity.into()),
        }
    }

    /// Snapshot for the finalizing phase.
    #[must_use]
    pub fn finalizing(entities_completed: u32, entities_total: u32, records_processed: u64) -> Self {
        Self {
            phase: SyncPhase::Finalizing,
            entities_completed,
            entities_total,
            records_processed,
            records_total: None,
            percent: percent_of(entities_completed, entities_total),
            current_entity: None,
        }
    }
}

fn percent_of(completed: u32, total: u32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (completed as f32 / total as f32) * 100.0
}
