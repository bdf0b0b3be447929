//! Per-entity sync options and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::types::SyncMode;

/// Options for one per-entity `sync` call.
#[derive(Debug, Clone, Default)]
pub struct EntitySyncOptions {
    /// Maximum number of records to fetch, None for connector default.
    pub limit: Option<u32>,
    /// Re-sync records even if they appear unchanged.
    pub force: bool,
    /// Compute the result without writing anything.
    pub dry_run: bool,
    /// Full or incremental walk of the remote data set.
    pub mode: SyncMode,
    /// Opaque incremental cursor from the previous run for this
    /// (integration, entity type) pair. None triggers an initial sync.
    pub cursor: Option<String>,
    /// Cancellation signal for the owning job. Connectors check this
    /// between batches and return `ConnectorError::Cancelled` when set.
    pub cancel: CancellationToken,
}

impl EntitySyncOptions {
    /// Options for a full, unbounded sync.
    #[must_use]
    pub fn full() -> Self {
        Self {
            mode: SyncMode::Full,
            ..Self::default()
        }
    }

    /// Options for an incremental sync from a stored cursor.
    pub fn incremental(cursor: Option<String>) -> Self {
        Self {
            mode: SyncMode::Incremental,
            cursor,
            ..Self::default()
        }
    }

    /// Set the record limit.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Attach the job's cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Result of syncing one entity type against one integration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySyncResult {
    /// Total records examined.
    pub processed: u64,
    /// Records created in the internal datastore.
    pub created: u64,
    /// Records updated.
    pub updated: u64,
    /// Records deleted.
    pub deleted: u64,
    /// Records skipped (unchanged, filtered).
    pub skipped: u64,
    /// Records that failed individually.
    pub failed: u64,
    /// Field-level discrepancies detected during reconciliation,
    /// awaiting a resolution strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_conflicts: Vec<CandidateConflict>,
    /// Cursor to persist for the next incremental run. None if the
    /// connector has no cursor concept or nothing changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl EntitySyncResult {
    /// An empty result.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any record failed individually.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Set the next incremental cursor.
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }
}

/// A field-level discrepancy reported by a connector.
///
/// Record identity and field are optional at this boundary because some
/// platforms report malformed discrepancies; the resolver discards
/// candidates missing either, with a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConflict {
    /// Identity of the record on both sides.
    pub record_id: Option<String>,
    /// Name of the conflicting field.
    pub field: Option<String>,
    /// Value held by the internal datastore.
    pub source_value: Value,
    /// Value held by the external platform.
    pub target_value: Value,
    /// When the internal side last changed, if known.
    pub source_updated_at: Option<DateTime<Utc>>,
    /// When the external side last changed, if known.
    pub target_updated_at: Option<DateTime<Utc>>,
}

impl CandidateConflict {
    /// Create a complete candidate.
    pub fn new(
        record_id: impl Into<String>,
        field: impl Into<String>,
        source_value: Value,
        target_value: Value,
    ) -> Self {
        Self {
            record_id: Some(record_id.into()),
            field: Some(field.into()),
            source_value,
            target_value,
            source_updated_at: None,
            target_updated_at: None,
        }
    }

    /// Set both side timestamps.
    #[must_use]
    pub fn with_timestamps(
        mut self,
        source: Option<DateTime<Utc>>,
        target: Option<DateTime<Utc>>,
    ) -> Self {
        self.source_updated_at = source;
        self.target_updated_at = target;
        self
    }
}
