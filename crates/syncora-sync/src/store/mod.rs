//! Persistence contracts for the sync engine
//!
//! Narrow async traits the manager and resolver depend on, with a Postgres
//! implementation for production and an in-memory one for tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use syncora_core::{ConflictId, IntegrationId, JobId};

use crate::conflict::{ConflictResolution, SyncConflict};
use crate::integration::Integration;
use crate::job::{SyncJob, SyncJobStatus};
use crate::metrics::PerformanceMetrics;
use crate::result::SyncJobResult;

/// Error from a persistence operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database-level failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Row payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure outside the database driver.
    #[error("store error: {message}")]
    Internal { message: String },
}

impl StoreError {
    /// Create an internal store error.
    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal {
            message: message.into(),
        }
    }
}

/// Queue depth snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Entries waiting to be dequeued.
    pub queued: u64,
}

/// Persistence for integrations.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Insert or replace an integration.
    async fn upsert_integration(&self, integration: &Integration) -> Result<(), StoreError>;

    /// Fetch an integration by id.
    async fn fetch_integration(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Option<Integration>, StoreError>;
}

/// Persistence for job rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job.
    async fn insert_job(&self, job: &SyncJob) -> Result<(), StoreError>;

    /// Fetch a job by id.
    async fn fetch_job(&self, job_id: JobId) -> Result<Option<SyncJob>, StoreError>;

    /// Transition a job to running.
    async fn mark_running(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Write the terminal status, result, and error in one atomic update.
    async fn finalize_job(
        &self,
        job_id: JobId,
        status: SyncJobStatus,
        result: Option<&SyncJobResult>,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Delete a job row. Rollback path when enqueueing fails.
    async fn delete_job(&self, job_id: JobId) -> Result<(), StoreError>;
}

/// Persistence for the priority job queue.
#[async_trait]
pub trait JobQueueStore: Send + Sync {
    /// Add a queue entry for a job.
    async fn enqueue(
        &self,
        job_id: JobId,
        priority_weight: i16,
        max_attempts: u32,
    ) -> Result<(), StoreError>;

    /// Pop the highest-priority entry, oldest first within a priority.
    async fn dequeue_next(&self) -> Result<Option<JobId>, StoreError>;

    /// Snapshot of queue depth.
    async fn stats(&self) -> Result<QueueStats, StoreError>;
}

/// Persistence for detected conflicts.
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Insert one conflict row.
    async fn insert_conflict(&self, conflict: &SyncConflict) -> Result<(), StoreError>;

    /// List unresolved conflicts for an integration, oldest first.
    async fn pending_conflicts(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Vec<SyncConflict>, StoreError>;

    /// Record a resolution on a pending conflict.
    ///
    /// Returns `false` when the conflict does not exist or was already
    /// resolved; the update is guarded on the pending state.
    async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        resolution: ConflictResolution,
    ) -> Result<bool, StoreError>;
}

/// Persistence for per-job performance metrics.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Insert the metrics captured for a finished job.
    async fn insert_metrics(
        &self,
        job_id: JobId,
        metrics: &PerformanceMetrics,
    ) -> Result<(), StoreError>;
}

/// Persistence for incremental sync cursors.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Fetch the stored cursor for an entity type.
    async fn get_cursor(
        &self,
        integration_id: IntegrationId,
        entity_type: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Store the cursor returned by the latest incremental sync.
    async fn put_cursor(
        &self,
        integration_id: IntegrationId,
        entity_type: &str,
        cursor: &str,
    ) -> Result<(), StoreError>;
}
