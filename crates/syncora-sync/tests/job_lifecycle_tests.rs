//! End-to-end sync job tests over in-memory stores and a scripted connector.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::broadcast;

use syncora_connector::{
    CandidateConflict, Connector, ConnectorCache, ConnectorConfig, ConnectorError,
    ConnectorFactory, ConnectorResult, EntitySyncOptions, EntitySyncResult, Platform, SyncMode,
};
use syncora_core::{JobId, OrgId};
use syncora_sync::store::memory::{MemoryJobStore, MemoryStores};
use syncora_sync::{
    ConflictResolver, ConflictStore, CursorStore, Integration, IntegrationStore, JobEvent,
    JobPriority, JobQueueStore, JobStore, QueueStats, StoreError, SyncError, SyncJob,
    SyncJobConfig, SyncJobManager, SyncJobStatus, SyncJobType, SyncLimits,
};

/// Behavior of the scripted connector for one entity type.
#[derive(Clone)]
enum EntityScript {
    /// Succeed, reporting this many processed and created records.
    Records(u64),
    /// Succeed with exactly this result.
    Emit(EntitySyncResult),
    /// Fail with a platform outage.
    Fail,
    /// Block until the job's cancellation token fires.
    WaitForCancel,
}

struct ScriptedConnector {
    scripts: HashMap<String, EntityScript>,
    cursors_seen: StdMutex<Vec<(String, Option<String>)>>,
}

impl ScriptedConnector {
    fn new(scripts: Vec<(&str, EntityScript)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            cursors_seen: StdMutex::new(Vec::new()),
        })
    }

    fn cursors_seen(&self) -> Vec<(String, Option<String>)> {
        self.cursors_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    fn display_name(&self) -> &str {
        "scripted-shopify"
    }

    async fn initialize(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn sync(
        &self,
        entity_type: &str,
        options: &EntitySyncOptions,
    ) -> ConnectorResult<EntitySyncResult> {
        self.cursors_seen
            .lock()
            .unwrap()
            .push((entity_type.to_string(), options.cursor.clone()));

        match self.scripts.get(entity_type) {
            Some(EntityScript::Records(n)) => Ok(EntitySyncResult {
                processed: *n,
                created: *n,
                ..EntitySyncResult::empty()
            }),
            Some(EntityScript::Emit(result)) => Ok(result.clone()),
            Some(EntityScript::Fail) => Err(ConnectorError::PlatformUnavailable {
                message: "maintenance window".to_string(),
            }),
            Some(EntityScript::WaitForCancel) => {
                options.cancel.cancelled().await;
                Err(ConnectorError::Cancelled)
            }
            None => Ok(EntitySyncResult::empty()),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

struct ScriptedFactory {
    connector: Arc<ScriptedConnector>,
}

#[async_trait]
impl ConnectorFactory for ScriptedFactory {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    async fn build(&self, _config: &ConnectorConfig) -> ConnectorResult<Arc<dyn Connector>> {
        Ok(Arc::clone(&self.connector) as Arc<dyn Connector>)
    }
}

struct Harness {
    stores: MemoryStores,
    manager: Arc<SyncJobManager>,
    integration: Integration,
    connector: Arc<ScriptedConnector>,
}

async fn harness(scripts: Vec<(&str, EntityScript)>) -> Harness {
    harness_with_limits(scripts, SyncLimits::default()).await
}

async fn harness_with_limits(scripts: Vec<(&str, EntityScript)>, limits: SyncLimits) -> Harness {
    let stores = MemoryStores::new();
    let connector = ScriptedConnector::new(scripts);

    let cache = Arc::new(ConnectorCache::new());
    cache
        .register_factory(Arc::new(ScriptedFactory {
            connector: Arc::clone(&connector),
        }))
        .await;

    let integration = Integration::new(
        OrgId::new(),
        Platform::Shopify,
        "shopify-eu",
        json!({"api_key": "k"}),
        json!({}),
    );
    stores
        .integrations
        .upsert_integration(&integration)
        .await
        .unwrap();

    let resolver = Arc::new(ConflictResolver::new(stores.conflicts.clone()));
    let manager = SyncJobManager::builder(
        stores.integrations.clone(),
        stores.jobs.clone(),
        stores.queue.clone(),
        stores.metrics.clone(),
        stores.cursors.clone(),
        resolver,
        cache,
    )
    .limits(limits)
    .build();

    Harness {
        stores,
        manager: Arc::new(manager),
        integration,
        connector,
    }
}

fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Retry cancellation until the executor has claimed its slot.
async fn cancel_when_active(manager: &SyncJobManager, job_id: JobId) {
    for _ in 0..100 {
        if manager.cancel_job(job_id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never became active");
}

#[tokio::test]
async fn test_full_job_lifecycle() {
    let h = harness(vec![
        ("products", EntityScript::Records(5)),
        ("inventory", EntityScript::Records(3)),
    ])
    .await;
    let mut rx = h.manager.events().subscribe();

    let job = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products", "inventory"]),
        )
        .await
        .unwrap();
    assert_eq!(job.status, SyncJobStatus::Pending);
    assert_eq!(h.stores.queue.stats().await.unwrap().queued, 1);

    let result = h.manager.execute_next().await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.summary.total_processed, 8);
    assert_eq!(result.summary.total_created, 8);
    assert_eq!(result.entity_results.len(), 2);
    assert!(result.metrics.is_some());

    let stored = h.stores.jobs.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncJobStatus::Completed);
    assert!(stored.started_at.is_some());
    assert!(stored.finished_at.is_some());
    assert!(h.stores.jobs.result_for(job.id).await.is_some());
    assert!(h.stores.metrics.metrics_for(job.id).await.is_some());

    let events = drain(&mut rx);
    let lifecycle: Vec<&JobEvent> = events
        .iter()
        .filter(|e| !matches!(e, JobEvent::Progress { .. }))
        .collect();
    assert!(matches!(lifecycle[0], JobEvent::Created { job_id, .. } if *job_id == job.id));
    assert!(matches!(lifecycle[1], JobEvent::Started { job_id } if *job_id == job.id));
    assert!(matches!(
        lifecycle[2],
        JobEvent::Completed {
            with_errors: false,
            ..
        }
    ));
    let progress_count = events
        .iter()
        .filter(|e| matches!(e, JobEvent::Progress { .. }))
        .count();
    // initializing + one fetch per entity + finalizing
    assert!(progress_count >= 4);
}

#[tokio::test]
async fn test_per_entity_errors_do_not_abort_siblings() {
    let h = harness(vec![
        ("products", EntityScript::Records(5)),
        ("broken", EntityScript::Fail),
        ("inventory", EntityScript::Records(3)),
    ])
    .await;

    let job = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products", "broken", "inventory"]),
        )
        .await
        .unwrap();

    let result = h.manager.execute_job(job.id).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.entity_results.len(), 2);
    assert!(result.entity_results.contains_key("products"));
    assert!(result.entity_results.contains_key("inventory"));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].entity_type, "broken");
    assert_eq!(result.errors[0].error_code, "PLATFORM_UNAVAILABLE");

    let stored = h.stores.jobs.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncJobStatus::CompletedWithErrors);
}

#[tokio::test]
async fn test_conflicts_are_resolved_and_persisted() {
    let now = Utc::now();
    let candidate = CandidateConflict::new("sku-42", "price", json!(10.0), json!(12.0))
        .with_timestamps(Some(now), Some(now - chrono::Duration::hours(1)));
    let entity_result = EntitySyncResult {
        processed: 1,
        candidate_conflicts: vec![candidate],
        ..EntitySyncResult::empty()
    };
    let h = harness(vec![("products", EntityScript::Emit(entity_result))]).await;
    let mut rx = h.manager.events().subscribe();

    let job = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products"]),
        )
        .await
        .unwrap();
    let result = h.manager.execute_job(job.id).await.unwrap();

    // Newest side wins: the source changed more recently.
    assert_eq!(result.conflicts.len(), 1);
    let resolution = result.conflicts[0].resolution.as_ref().unwrap();
    assert_eq!(resolution.resolved_value, json!(10.0));

    assert_eq!(h.stores.conflicts.len().await, 1);
    assert!(h
        .stores
        .conflicts
        .pending_conflicts(h.integration.id)
        .await
        .unwrap()
        .is_empty());

    // Resolved conflicts do not degrade the job status.
    assert!(result.success);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::ConflictDetected { record_id, .. } if record_id == "sku-42"
    )));
}

#[tokio::test]
async fn test_incremental_uses_and_advances_cursor() {
    let entity_result = EntitySyncResult {
        processed: 3,
        next_cursor: Some("c-2".to_string()),
        ..EntitySyncResult::empty()
    };
    let h = harness(vec![("products", EntityScript::Emit(entity_result))]).await;
    h.stores
        .cursors
        .put_cursor(h.integration.id, "products", "c-1")
        .await
        .unwrap();

    let mut config = SyncJobConfig::for_entities(["products"]);
    config.mode = SyncMode::Incremental;
    let job = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Incremental,
            config,
        )
        .await
        .unwrap();
    h.manager.execute_job(job.id).await.unwrap();

    assert_eq!(
        h.connector.cursors_seen(),
        vec![("products".to_string(), Some("c-1".to_string()))]
    );
    assert_eq!(
        h.stores
            .cursors
            .get_cursor(h.integration.id, "products")
            .await
            .unwrap(),
        Some("c-2".to_string())
    );
}

#[tokio::test]
async fn test_priority_order_drives_execution() {
    let h = harness(vec![("products", EntityScript::Records(1))]).await;
    let mut rx = h.manager.events().subscribe();

    let mut ids = HashMap::new();
    for priority in [JobPriority::Low, JobPriority::High, JobPriority::Normal] {
        let job = h
            .manager
            .create_sync_job(
                h.integration.org_id,
                h.integration.id,
                SyncJobType::Full,
                SyncJobConfig::for_entities(["products"]).with_priority(priority),
            )
            .await
            .unwrap();
        ids.insert(priority, job.id);
    }

    for _ in 0..3 {
        assert!(h.manager.execute_next().await.unwrap().is_some());
    }
    assert!(h.manager.execute_next().await.unwrap().is_none());

    let started: Vec<JobId> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::Started { job_id } => Some(job_id),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![
            ids[&JobPriority::High],
            ids[&JobPriority::Normal],
            ids[&JobPriority::Low],
        ]
    );
}

#[tokio::test]
async fn test_create_rejects_foreign_org() {
    let h = harness(vec![]).await;
    let err = h
        .manager
        .create_sync_job(
            OrgId::new(),
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Forbidden { .. }));
    assert_eq!(h.stores.queue.stats().await.unwrap().queued, 0);
}

#[tokio::test]
async fn test_create_unknown_integration() {
    let h = harness(vec![]).await;
    let err = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            syncora_core::IntegrationId::new(),
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
}

#[tokio::test]
async fn test_create_rejects_empty_entity_list() {
    let h = harness(vec![]).await;
    let err = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }));
}

struct RecordingJobStore {
    inner: Arc<MemoryJobStore>,
    inserted: Arc<StdMutex<Vec<JobId>>>,
}

#[async_trait]
impl JobStore for RecordingJobStore {
    async fn insert_job(&self, job: &SyncJob) -> Result<(), StoreError> {
        self.inserted.lock().unwrap().push(job.id);
        self.inner.insert_job(job).await
    }

    async fn fetch_job(&self, job_id: JobId) -> Result<Option<SyncJob>, StoreError> {
        self.inner.fetch_job(job_id).await
    }

    async fn mark_running(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.mark_running(job_id, started_at).await
    }

    async fn finalize_job(
        &self,
        job_id: JobId,
        status: SyncJobStatus,
        result: Option<&syncora_sync::SyncJobResult>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.finalize_job(job_id, status, result, error).await
    }

    async fn delete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        self.inner.delete_job(job_id).await
    }
}

struct FailingQueueStore;

#[async_trait]
impl JobQueueStore for FailingQueueStore {
    async fn enqueue(
        &self,
        _job_id: JobId,
        _priority_weight: i16,
        _max_attempts: u32,
    ) -> Result<(), StoreError> {
        Err(StoreError::internal("queue unavailable"))
    }

    async fn dequeue_next(&self) -> Result<Option<JobId>, StoreError> {
        Ok(None)
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        Ok(QueueStats { queued: 0 })
    }
}

#[tokio::test]
async fn test_enqueue_failure_rolls_back_job_row() {
    let stores = MemoryStores::new();
    let inserted = Arc::new(StdMutex::new(Vec::new()));
    let jobs = Arc::new(RecordingJobStore {
        inner: stores.jobs.clone(),
        inserted: Arc::clone(&inserted),
    });

    let integration = Integration::new(
        OrgId::new(),
        Platform::Shopify,
        "shopify-eu",
        json!({"api_key": "k"}),
        json!({}),
    );
    stores
        .integrations
        .upsert_integration(&integration)
        .await
        .unwrap();

    let resolver = Arc::new(ConflictResolver::new(stores.conflicts.clone()));
    let manager = SyncJobManager::builder(
        stores.integrations.clone(),
        jobs,
        Arc::new(FailingQueueStore),
        stores.metrics.clone(),
        stores.cursors.clone(),
        resolver,
        Arc::new(ConnectorCache::new()),
    )
    .build();

    let err = manager
        .create_sync_job(
            integration.org_id,
            integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products"]),
        )
        .await
        .unwrap_err();
    // The original enqueue error surfaces, not the rollback outcome.
    assert!(err.to_string().contains("queue unavailable"));

    let inserted = inserted.lock().unwrap().clone();
    assert_eq!(inserted.len(), 1);
    assert!(stores.jobs.fetch_job(inserted[0]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrency_limit_refuses_execution() {
    let h = harness_with_limits(
        vec![
            ("slow", EntityScript::WaitForCancel),
            ("products", EntityScript::Records(1)),
        ],
        SyncLimits {
            max_concurrent_jobs: 1,
        },
    )
    .await;

    let slow = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["slow"]),
        )
        .await
        .unwrap();
    let quick = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products"]),
        )
        .await
        .unwrap();

    let manager = Arc::clone(&h.manager);
    let running = tokio::spawn(async move { manager.execute_job(slow.id).await });

    // Wait for the slow job to claim its slot.
    for _ in 0..100 {
        if h.manager.active_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.manager.active_count(), 1);

    let err = h.manager.execute_job(quick.id).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::ConcurrencyLimit { active: 1, max: 1 }
    ));

    cancel_when_active(&h.manager, slow.id).await;
    running.await.unwrap().unwrap();
    assert_eq!(h.manager.active_count(), 0);
}

#[tokio::test]
async fn test_same_job_cannot_execute_twice() {
    let h = harness(vec![("slow", EntityScript::WaitForCancel)]).await;
    let job = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["slow"]),
        )
        .await
        .unwrap();

    let manager = Arc::clone(&h.manager);
    let running = tokio::spawn(async move { manager.execute_job(job.id).await });

    for _ in 0..100 {
        if h.manager.active_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let err = h.manager.execute_job(job.id).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyExecuting { .. }));

    cancel_when_active(&h.manager, job.id).await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancellation_keeps_partial_results() {
    let h = harness(vec![
        ("products", EntityScript::Records(5)),
        ("slow", EntityScript::WaitForCancel),
    ])
    .await;
    let job = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products", "slow"]),
        )
        .await
        .unwrap();

    let manager = Arc::clone(&h.manager);
    let running = tokio::spawn(async move { manager.execute_job(job.id).await });

    // Cancel only once the connector is blocked inside the second entity,
    // so the first entity's result is already recorded.
    for _ in 0..100 {
        if h.connector.cursors_seen().iter().any(|(e, _)| e == "slow") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.manager.cancel_job(job.id));

    let result = running.await.unwrap().unwrap();
    assert!(!result.success);
    assert!(result.entity_results.contains_key("products"));
    assert_eq!(result.summary.total_processed, 5);

    let stored = h.stores.jobs.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncJobStatus::Cancelled);

    // Cancelling a job that is no longer running is a no-op.
    assert!(!h.manager.cancel_job(job.id));
}

struct SlowStartJobStore {
    inner: Arc<MemoryJobStore>,
}

#[async_trait]
impl JobStore for SlowStartJobStore {
    async fn insert_job(&self, job: &SyncJob) -> Result<(), StoreError> {
        self.inner.insert_job(job).await
    }

    async fn fetch_job(&self, job_id: JobId) -> Result<Option<SyncJob>, StoreError> {
        self.inner.fetch_job(job_id).await
    }

    async fn mark_running(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Lets a zero-second timeout fire before entity work begins.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.mark_running(job_id, started_at).await
    }

    async fn finalize_job(
        &self,
        job_id: JobId,
        status: SyncJobStatus,
        result: Option<&syncora_sync::SyncJobResult>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.finalize_job(job_id, status, result, error).await
    }

    async fn delete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        self.inner.delete_job(job_id).await
    }
}

#[tokio::test]
async fn test_timeout_before_execution_fails_job() {
    let stores = MemoryStores::new();
    let connector = ScriptedConnector::new(vec![("products", EntityScript::Records(1))]);
    let cache = Arc::new(ConnectorCache::new());
    cache
        .register_factory(Arc::new(ScriptedFactory {
            connector: Arc::clone(&connector),
        }))
        .await;

    let integration = Integration::new(
        OrgId::new(),
        Platform::Shopify,
        "shopify-eu",
        json!({"api_key": "k"}),
        json!({}),
    );
    stores
        .integrations
        .upsert_integration(&integration)
        .await
        .unwrap();

    let resolver = Arc::new(ConflictResolver::new(stores.conflicts.clone()));
    let manager = SyncJobManager::builder(
        stores.integrations.clone(),
        Arc::new(SlowStartJobStore {
            inner: stores.jobs.clone(),
        }),
        stores.queue.clone(),
        stores.metrics.clone(),
        stores.cursors.clone(),
        resolver,
        cache,
    )
    .build();

    let mut config = SyncJobConfig::for_entities(["products"]);
    config.timeout_secs = Some(0);
    let job = manager
        .create_sync_job(
            integration.org_id,
            integration.id,
            SyncJobType::Full,
            config,
        )
        .await
        .unwrap();

    let err = manager.execute_job(job.id).await.unwrap_err();
    assert!(matches!(err, SyncError::TimedOutBeforeExecution { .. }));

    let stored = stores.jobs.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncJobStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("timed out before execution"));
    // No entity work ran.
    assert!(connector.cursors_seen().is_empty());
}

#[tokio::test]
async fn test_terminal_job_cannot_be_reexecuted() {
    let h = harness(vec![("products", EntityScript::Records(1))]).await;
    let job = h
        .manager
        .create_sync_job(
            h.integration.org_id,
            h.integration.id,
            SyncJobType::Full,
            SyncJobConfig::for_entities(["products"]),
        )
        .await
        .unwrap();
    h.manager.execute_job(job.id).await.unwrap();

    let err = h.manager.execute_job(job.id).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }));
    assert!(err.to_string().contains("completed"));
}
