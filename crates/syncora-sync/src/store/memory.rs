//! In-memory store implementations
//!
//! Backed by `tokio::sync::RwLock<HashMap>`. Used by unit and integration
//! tests; behavior mirrors the Postgres implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use syncora_core::{ConflictId, IntegrationId, JobId};

use crate::conflict::{ConflictResolution, SyncConflict};
use crate::integration::Integration;
use crate::job::{SyncJob, SyncJobStatus};
use crate::metrics::PerformanceMetrics;
use crate::result::SyncJobResult;

use super::{
    ConflictStore, CursorStore, IntegrationStore, JobQueueStore, JobStore, MetricsStore,
    QueueStats, StoreError,
};

/// In-memory integration store.
#[derive(Default)]
pub struct MemoryIntegrationStore {
    integrations: RwLock<HashMap<IntegrationId, Integration>>,
}

impl MemoryIntegrationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationStore for MemoryIntegrationStore {
    async fn upsert_integration(&self, integration: &Integration) -> Result<(), StoreError> {
        self.integrations
            .write()
            .await
            .insert(integration.id, integration.clone());
        Ok(())
    }

    async fn fetch_integration(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Option<Integration>, StoreError> {
        Ok(self.integrations.read().await.get(&integration_id).cloned())
    }
}

/// In-memory job store.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, SyncJob>>,
    results: RwLock<HashMap<JobId, SyncJobResult>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the terminal result written for a job, if any.
    pub async fn result_for(&self, job_id: JobId) -> Option<SyncJobResult> {
        self.results.read().await.get(&job_id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &SyncJob) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn fetch_job(&self, job_id: JobId) -> Result<Option<SyncJob>, StoreError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn mark_running(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::internal(format!("job {job_id} not found")))?;
        job.status = SyncJobStatus::Running;
        job.started_at = Some(started_at);
        Ok(())
    }

    async fn finalize_job(
        &self,
        job_id: JobId,
        status: SyncJobStatus,
        result: Option<&SyncJobResult>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::internal(format!("job {job_id} not found")))?;
        job.status = status;
        job.finished_at = Some(Utc::now());
        job.error = error.map(String::from);
        drop(jobs);

        if let Some(result) = result {
            self.results.write().await.insert(job_id, result.clone());
        }
        Ok(())
    }

    async fn delete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        self.jobs.write().await.remove(&job_id);
        self.results.write().await.remove(&job_id);
        Ok(())
    }
}

struct QueueEntry {
    job_id: JobId,
    priority_weight: i16,
    #[allow(dead_code)]
    max_attempts: u32,
    sequence: u64,
}

/// In-memory priority queue store.
#[derive(Default)]
pub struct MemoryQueueStore {
    entries: RwLock<Vec<QueueEntry>>,
    next_sequence: RwLock<u64>,
}

impl MemoryQueueStore {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueueStore for MemoryQueueStore {
    async fn enqueue(
        &self,
        job_id: JobId,
        priority_weight: i16,
        max_attempts: u32,
    ) -> Result<(), StoreError> {
        let mut sequence = self.next_sequence.write().await;
        *sequence += 1;
        self.entries.write().await.push(QueueEntry {
            job_id,
            priority_weight,
            max_attempts,
            sequence: *sequence,
        });
        Ok(())
    }

    async fn dequeue_next(&self) -> Result<Option<JobId>, StoreError> {
        let mut entries = self.entries.write().await;
        // Highest weight first, oldest first within a weight.
        let best = entries
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| (e.priority_weight, std::cmp::Reverse(e.sequence)))
            .map(|(idx, _)| idx);
        Ok(best.map(|idx| entries.remove(idx).job_id))
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        Ok(QueueStats {
            queued: self.entries.read().await.len() as u64,
        })
    }
}

/// In-memory conflict store.
#[derive(Default)]
pub struct MemoryConflictStore {
    conflicts: RwLock<HashMap<ConflictId, SyncConflict>>,
}

impl MemoryConflictStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored conflicts, resolved included.
    pub async fn len(&self) -> usize {
        self.conflicts.read().await.len()
    }

    /// True when no conflicts are stored.
    pub async fn is_empty(&self) -> bool {
        self.conflicts.read().await.is_empty()
    }
}

#[async_trait]
impl ConflictStore for MemoryConflictStore {
    async fn insert_conflict(&self, conflict: &SyncConflict) -> Result<(), StoreError> {
        self.conflicts
            .write()
            .await
            .insert(conflict.id, conflict.clone());
        Ok(())
    }

    async fn pending_conflicts(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Vec<SyncConflict>, StoreError> {
        let conflicts = self.conflicts.read().await;
        let mut pending: Vec<SyncConflict> = conflicts
            .values()
            .filter(|c| c.integration_id == integration_id && c.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.detected_at);
        Ok(pending)
    }

    async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        resolution: ConflictResolution,
    ) -> Result<bool, StoreError> {
        let mut conflicts = self.conflicts.write().await;
        match conflicts.get_mut(&conflict_id) {
            Some(conflict) if conflict.is_pending() => {
                conflict.resolution = Some(resolution);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory metrics store.
#[derive(Default)]
pub struct MemoryMetricsStore {
    metrics: RwLock<HashMap<JobId, PerformanceMetrics>>,
}

impl MemoryMetricsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch stored metrics for a job.
    pub async fn metrics_for(&self, job_id: JobId) -> Option<PerformanceMetrics> {
        self.metrics.read().await.get(&job_id).cloned()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn insert_metrics(
        &self,
        job_id: JobId,
        metrics: &PerformanceMetrics,
    ) -> Result<(), StoreError> {
        self.metrics.write().await.insert(job_id, metrics.clone());
        Ok(())
    }
}

/// In-memory cursor store.
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<(IntegrationId, String), String>>,
}

impl MemoryCursorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get_cursor(
        &self,
        integration_id: IntegrationId,
        entity_type: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .cursors
            .read()
            .await
            .get(&(integration_id, entity_type.to_string()))
            .cloned())
    }

    async fn put_cursor(
        &self,
        integration_id: IntegrationId,
        entity_type: &str,
        cursor: &str,
    ) -> Result<(), StoreError> {
        self.cursors
            .write()
            .await
            .insert((integration_id, entity_type.to_string()), cursor.to_string());
        Ok(())
    }
}

/// Bundle of in-memory stores wired for the manager.
#[derive(Clone)]
pub struct MemoryStores {
    /// Integration store.
    pub integrations: Arc<MemoryIntegrationStore>,
    /// Job store.
    pub jobs: Arc<MemoryJobStore>,
    /// Queue store.
    pub queue: Arc<MemoryQueueStore>,
    /// Conflict store.
    pub conflicts: Arc<MemoryConflictStore>,
    /// Metrics store.
    pub metrics: Arc<MemoryMetricsStore>,
    /// Cursor store.
    pub cursors: Arc<MemoryCursorStore>,
}

impl MemoryStores {
    /// Create a fresh set of empty stores.
    #[must_use]
    pub fn new() -> Self {
        Self {
            integrations: Arc::new(MemoryIntegrationStore::new()),
            jobs: Arc::new(MemoryJobStore::new()),
            queue: Arc::new(MemoryQueueStore::new()),
            conflicts: Arc::new(MemoryConflictStore::new()),
            metrics: Arc::new(MemoryMetricsStore::new()),
            cursors: Arc::new(MemoryCursorStore::new()),
        }
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}
