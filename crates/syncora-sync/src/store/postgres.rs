//! Postgres store implementations
//!
//! Runtime queries over `sqlx::PgPool`. Each query maps through a private
//! row struct; enum columns are stored as text and parsed on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use syncora_core::{ConflictId, IntegrationId, JobId, OrgId};

use crate::conflict::{ConflictResolution, ResolutionStrategy, SyncConflict};
use crate::integration::Integration;
use crate::job::{SyncJob, SyncJobStatus, SyncJobType};
use crate::metrics::PerformanceMetrics;
use crate::result::SyncJobResult;

use super::{
    ConflictStore, CursorStore, IntegrationStore, JobQueueStore, JobStore, MetricsStore,
    QueueStats, StoreError,
};

/// Postgres-backed integration store.
#[derive(Clone)]
pub struct PgIntegrationStore {
    pool: PgPool,
}

impl PgIntegrationStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationStore for PgIntegrationStore {
    #[instrument(skip(self, integration), fields(integration_id = %integration.id))]
    async fn upsert_integration(&self, integration: &Integration) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_integrations
                (id, org_id, platform, name, credentials, settings, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                credentials = EXCLUDED.credentials,
                settings = EXCLUDED.settings
            "#,
        )
        .bind(*integration.id.as_uuid())
        .bind(*integration.org_id.as_uuid())
        .bind(integration.platform.as_str())
        .bind(&integration.name)
        .bind(&integration.credentials)
        .bind(&integration.settings)
        .bind(integration.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_integration(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Option<Integration>, StoreError> {
        let row = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT id, org_id, platform, name, credentials, settings, created_at
            FROM sync_integrations
            WHERE id = $1
            "#,
        )
        .bind(*integration_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(IntegrationRow::into_integration).transpose()
    }
}

/// Postgres-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn insert_job(&self, job: &SyncJob) -> Result<(), StoreError> {
        let config = serde_json::to_value(&job.config)?;

        sqlx::query(
            r#"
            INSERT INTO sync_jobs
                (id, org_id, integration_id, job_type, config, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(*job.org_id.as_uuid())
        .bind(*job.integration_id.as_uuid())
        .bind(job.job_type.as_str())
        .bind(config)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_job(&self, job_id: JobId) -> Result<Option<SyncJob>, StoreError> {
        let row = sqlx::query_as::<_, SyncJobRow>(
            r#"
            SELECT id, org_id, integration_id, job_type, config, status,
                   created_at, started_at, finished_at, error
            FROM sync_jobs
            WHERE id = $1
            "#,
        )
        .bind(*job_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncJobRow::into_job).transpose()
    }

    #[instrument(skip(self))]
    async fn mark_running(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'running', started_at = $2
            WHERE id = $1
            "#,
        )
        .bind(*job_id.as_uuid())
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, result))]
    async fn finalize_job(
        &self,
        job_id: JobId,
        status: SyncJobStatus,
        result: Option<&SyncJobResult>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = result.map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = $2, result = $3, error = $4, finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(*job_id.as_uuid())
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sync_jobs WHERE id = $1")
            .bind(*job_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Postgres-backed priority queue store.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueueStore for PgQueueStore {
    #[instrument(skip(self))]
    async fn enqueue(
        &self,
        job_id: JobId,
        priority_weight: i16,
        max_attempts: u32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_job_queue (job_id, priority_weight, max_attempts, enqueued_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(*job_id.as_uuid())
        .bind(priority_weight)
        .bind(max_attempts as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn dequeue_next(&self) -> Result<Option<JobId>, StoreError> {
        // SKIP LOCKED lets concurrent executors pop without blocking each
        // other on the same row.
        let job_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM sync_job_queue
            WHERE id = (
                SELECT id FROM sync_job_queue
                ORDER BY priority_weight DESC, enqueued_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING job_id
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(job_id.map(JobId::from_uuid))
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<QueueStats, StoreError> {
        let queued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_job_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(QueueStats {
            queued: queued as u64,
        })
    }
}

/// Postgres-backed conflict store.
#[derive(Clone)]
pub struct PgConflictStore {
    pool: PgPool,
}

impl PgConflictStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConflictStore for PgConflictStore {
    #[instrument(skip(self, conflict), fields(conflict_id = %conflict.id))]
    async fn insert_conflict(&self, conflict: &SyncConflict) -> Result<(), StoreError> {
        let (strategy, resolved_value, resolved_at) = match &conflict.resolution {
            Some(resolution) => (
                resolution.strategy.as_str(),
                Some(resolution.resolved_value.clone()),
                Some(resolution.resolved_at),
            ),
            None => ("pending", None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO sync_conflicts
                (id, org_id, integration_id, entity_type, record_id, field,
                 source_value, target_value, source_updated_at, target_updated_at,
                 detected_at, resolution_strategy, resolved_value, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(*conflict.id.as_uuid())
        .bind(*conflict.org_id.as_uuid())
        .bind(*conflict.integration_id.as_uuid())
        .bind(&conflict.entity_type)
        .bind(&conflict.record_id)
        .bind(&conflict.field)
        .bind(&conflict.source_value)
        .bind(&conflict.target_value)
        .bind(conflict.source_updated_at)
        .bind(conflict.target_updated_at)
        .bind(conflict.detected_at)
        .bind(strategy)
        .bind(resolved_value)
        .bind(resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn pending_conflicts(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Vec<SyncConflict>, StoreError> {
        let rows = sqlx::query_as::<_, SyncConflictRow>(
            r#"
            SELECT id, org_id, integration_id, entity_type, record_id, field,
                   source_value, target_value, source_updated_at, target_updated_at,
                   detected_at, resolution_strategy, resolved_value, resolved_at
            FROM sync_conflicts
            WHERE integration_id = $1
                AND resolution_strategy = 'pending'
            ORDER BY detected_at ASC
            "#,
        )
        .bind(*integration_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncConflictRow::into_conflict)
            .collect()
    }

    #[instrument(skip(self, resolution))]
    async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        resolution: ConflictResolution,
    ) -> Result<bool, StoreError> {
        // Guarded on the pending state so a conflict resolves at most once.
        let result = sqlx::query(
            r#"
            UPDATE sync_conflicts
            SET resolution_strategy = $2, resolved_value = $3, resolved_at = $4
            WHERE id = $1
                AND resolution_strategy = 'pending'
            "#,
        )
        .bind(*conflict_id.as_uuid())
        .bind(resolution.strategy.as_str())
        .bind(&resolution.resolved_value)
        .bind(resolution.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Postgres-backed metrics store.
#[derive(Clone)]
pub struct PgMetricsStore {
    pool: PgPool,
}

impl PgMetricsStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsStore for PgMetricsStore {
    #[instrument(skip(self, metrics))]
    async fn insert_metrics(
        &self,
        job_id: JobId,
        metrics: &PerformanceMetrics,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_job_metrics
                (job_id, api_calls, api_time_micros, storage_calls, storage_time_micros,
                 duration_micros, memory_delta_bytes, cpu_percent, bytes_sent, bytes_received)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(*job_id.as_uuid())
        .bind(metrics.api_calls as i64)
        .bind(metrics.api_time.as_micros() as i64)
        .bind(metrics.storage_calls as i64)
        .bind(metrics.storage_time.as_micros() as i64)
        .bind(metrics.duration.as_micros() as i64)
        .bind(metrics.memory_delta_bytes as i64)
        .bind(metrics.cpu_percent)
        .bind(metrics.bytes_sent as i64)
        .bind(metrics.bytes_received as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Postgres-backed cursor store.
#[derive(Clone)]
pub struct PgCursorStore {
    pool: PgPool,
}

impl PgCursorStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorStore for PgCursorStore {
    #[instrument(skip(self))]
    async fn get_cursor(
        &self,
        integration_id: IntegrationId,
        entity_type: &str,
    ) -> Result<Option<String>, StoreError> {
        let cursor: Option<String> = sqlx::query_scalar(
            r#"
            SELECT cursor FROM sync_cursors
            WHERE integration_id = $1 AND entity_type = $2
            "#,
        )
        .bind(*integration_id.as_uuid())
        .bind(entity_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cursor)
    }

    #[instrument(skip(self))]
    async fn put_cursor(
        &self,
        integration_id: IntegrationId,
        entity_type: &str,
        cursor: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (integration_id, entity_type, cursor, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (integration_id, entity_type) DO UPDATE SET
                cursor = EXCLUDED.cursor,
                updated_at = NOW()
            "#,
        )
        .bind(*integration_id.as_uuid())
        .bind(entity_type)
        .bind(cursor)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Database row for an integration.
#[derive(Debug, sqlx::FromRow)]
struct IntegrationRow {
    id: Uuid,
    org_id: Uuid,
    platform: String,
    name: String,
    credentials: serde_json::Value,
    settings: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl IntegrationRow {
    fn into_integration(self) -> Result<Integration, StoreError> {
        let platform = self
            .platform
            .parse()
            .map_err(|e| StoreError::internal(format!("bad platform column: {e}")))?;

        Ok(Integration {
            id: IntegrationId::from_uuid(self.id),
            org_id: OrgId::from_uuid(self.org_id),
            platform,
            name: self.name,
            credentials: self.credentials,
            settings: self.settings,
            created_at: self.created_at,
        })
    }
}

/// Database row for a sync job.
#[derive(Debug, sqlx::FromRow)]
struct SyncJobRow {
    id: Uuid,
    org_id: Uuid,
    integration_id: Uuid,
    job_type: String,
    config: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl SyncJobRow {
    fn into_job(self) -> Result<SyncJob, StoreError> {
        let job_type: SyncJobType = self
            .job_type
            .parse()
            .map_err(|e| StoreError::internal(format!("bad job_type column: {e}")))?;
        let status: SyncJobStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::internal(format!("bad status column: {e}")))?;
        let config = serde_json::from_value(self.config)?;

        Ok(SyncJob {
            id: JobId::from_uuid(self.id),
            org_id: OrgId::from_uuid(self.org_id),
            integration_id: IntegrationId::from_uuid(self.integration_id),
            job_type,
            config,
            status,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error: self.error,
        })
    }
}

/// Database row for a sync conflict.
#[derive(Debug, sqlx::FromRow)]
struct SyncConflictRow {
    id: Uuid,
    org_id: Uuid,
    integration_id: Uuid,
    entity_type: String,
    record_id: String,
    field: String,
    source_value: serde_json::Value,
    target_value: serde_json::Value,
    source_updated_at: Option<DateTime<Utc>>,
    target_updated_at: Option<DateTime<Utc>>,
    detected_at: DateTime<Utc>,
    resolution_strategy: String,
    resolved_value: Option<serde_json::Value>,
    resolved_at: Option<DateTime<Utc>>,
}

impl SyncConflictRow {
    fn into_conflict(self) -> Result<SyncConflict, StoreError> {
        let resolution = if self.resolution_strategy == "pending" {
            None
        } else {
            let strategy: ResolutionStrategy = self
                .resolution_strategy
                .parse()
                .map_err(|e| StoreError::internal(format!("bad resolution column: {e}")))?;
            let resolved_value = self
                .resolved_value
                .ok_or_else(|| StoreError::internal("resolved conflict without value"))?;
            let resolved_at = self
                .resolved_at
                .ok_or_else(|| StoreError::internal("resolved conflict without timestamp"))?;
            Some(ConflictResolution {
                strategy,
                resolved_value,
                resolved_at,
            })
        };

        Ok(SyncConflict {
            id: ConflictId::from_uuid(self.id),
            org_id: OrgId::from_uuid(self.org_id),
            integration_id: IntegrationId::from_uuid(self.integration_id),
            entity_type: self.entity_type,
            record_id: self.record_id,
            field: self.field,
            source_value: self.source_value,
            target_value: self.target_value,
            source_updated_at: self.source_updated_at,
            target_updated_at: self.target_updated_at,
            detected_at: self.detected_at,
            resolution,
        })
    }
}
