//! Terminal sync job results
//!
//! Immutable outcome of a finished job: aggregate counts, per-entity
//! breakdowns, conflicts, errors, and optional performance metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use syncora_connector::{ConnectorError, EntitySyncResult};

use crate::conflict::SyncConflict;
use crate::metrics::PerformanceMetrics;

/// Aggregate record counts across all entity types in a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSummary {
    /// Records examined across all entities.
    pub total_processed: u64,
    /// Records created in the target.
    pub total_created: u64,
    /// Records updated in the target.
    pub total_updated: u64,
    /// Records deleted from the target.
    pub total_deleted: u64,
    /// Records skipped (unchanged or filtered).
    pub total_skipped: u64,
    /// Records that failed to reconcile.
    pub total_failed: u64,
}

impl SyncSummary {
    /// Fold a single entity result into the running totals.
    pub fn absorb(&mut self, result: &EntitySyncResult) {
        self.total_processed += result.processed;
        self.total_created += result.created;
        self.total_updated += result.updated;
        self.total_deleted += result.deleted;
        self.total_skipped += result.skipped;
        self.total_failed += result.failed;
    }
}

/// One error captured during job execution, scoped to an entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    /// Entity type being synced when the error occurred.
    pub entity_type: String,
    /// Human-readable error message.
    pub message: String,
    /// Stable machine-readable code.
    pub error_code: String,
    /// When the error was observed.
    pub occurred_at: DateTime<Utc>,
}

impl SyncErrorRecord {
    /// Build a record from a connector error.
    pub fn from_connector(entity_type: impl Into<String>, err: &ConnectorError) -> Self {
        Self {
            entity_type: entity_type.into(),
            message: err.to_string(),
            error_code: err.error_code().to_string(),
            occurred_at: Utc::now(),
        }
    }
}

/// Immutable outcome of a completed sync job.
///
/// Produced exactly once by the executor when the job reaches a terminal
/// status. `entity_results` is keyed by entity type with deterministic
/// iteration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncJobResult {
    /// Whether the job finished without per-entity failures.
    pub success: bool,
    /// Aggregate counts.
    pub summary: SyncSummary,
    /// Per-entity breakdown, in configured order.
    pub entity_results: BTreeMap<String, EntitySyncResult>,
    /// Conflicts detected (and possibly resolved) during the job.
    pub conflicts: Vec<SyncConflict>,
    /// Errors captured during execution.
    pub errors: Vec<SyncErrorRecord>,
    /// Wall-clock duration of the job.
    pub duration: Duration,
    /// Resource usage, when tracking was enabled.
    pub metrics: Option<PerformanceMetrics>,
}

impl SyncJobResult {
    /// True when any entity reported failed records or an error was captured.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.summary.total_failed > 0
    }
}
