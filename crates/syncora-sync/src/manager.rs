//! Sync job manager and executor
//!
//! Creates jobs, runs them with bounded concurrency under cancellation
//! tokens and timeouts, and writes one terminal result per job. Per-entity
//! connector failures are collected into the result; persistence failures
//! fail the whole job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use syncora_connector::{ConnectorCache, ConnectorError, EntitySyncOptions, SyncMode};
use syncora_core::{JobId, OrgId};

use crate::conflict::{ConflictContext, ConflictResolver, ResolutionStrategy};
use crate::error::{SyncEngineResult, SyncError};
use crate::events::{JobEvent, JobEventBus};
use crate::integration::Integration;
use crate::job::{SyncJob, SyncJobConfig, SyncJobStatus, SyncJobType};
use crate::metrics::{CallKind, PerformanceTracker};
use crate::progress::SyncProgress;
use crate::result::{SyncErrorRecord, SyncJobResult};
use crate::store::{CursorStore, IntegrationStore, JobQueueStore, JobStore, MetricsStore};

/// Execution limits for the manager.
#[derive(Debug, Clone, Copy)]
pub struct SyncLimits {
    /// Maximum number of concurrently executing jobs.
    pub max_concurrent_jobs: usize,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
        }
    }
}

/// Stores and collaborators the manager is built from.
pub struct SyncJobManagerBuilder {
    integrations: Arc<dyn IntegrationStore>,
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueueStore>,
    metrics: Arc<dyn MetricsStore>,
    cursors: Arc<dyn CursorStore>,
    resolver: Arc<ConflictResolver>,
    cache: Arc<ConnectorCache>,
    events: JobEventBus,
    limits: SyncLimits,
    conflict_strategy: ResolutionStrategy,
}

impl SyncJobManagerBuilder {
    /// Override the execution limits.
    #[must_use]
    pub fn limits(mut self, limits: SyncLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Override the conflict resolution strategy applied during jobs.
    #[must_use]
    pub fn conflict_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Override the event bus.
    #[must_use]
    pub fn events(mut self, events: JobEventBus) -> Self {
        self.events = events;
        self
    }

    /// Finish building the manager.
    #[must_use]
    pub fn build(self) -> SyncJobManager {
        SyncJobManager {
            integrations: self.integrations,
            jobs: self.jobs,
            queue: self.queue,
            metrics: self.metrics,
            cursors: self.cursors,
            resolver: self.resolver,
            cache: self.cache,
            events: self.events,
            limits: self.limits,
            conflict_strategy: self.conflict_strategy,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Owns job creation, execution, and cancellation.
pub struct SyncJobManager {
    integrations: Arc<dyn IntegrationStore>,
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueueStore>,
    metrics: Arc<dyn MetricsStore>,
    cursors: Arc<dyn CursorStore>,
    resolver: Arc<ConflictResolver>,
    cache: Arc<ConnectorCache>,
    events: JobEventBus,
    limits: SyncLimits,
    conflict_strategy: ResolutionStrategy,
    active: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl SyncJobManager {
    /// Start building a manager from its stores and collaborators.
    pub fn builder(
        integrations: Arc<dyn IntegrationStore>,
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueueStore>,
        metrics: Arc<dyn MetricsStore>,
        cursors: Arc<dyn CursorStore>,
        resolver: Arc<ConflictResolver>,
        cache: Arc<ConnectorCache>,
    ) -> SyncJobManagerBuilder {
        SyncJobManagerBuilder {
            integrations,
            jobs,
            queue,
            metrics,
            cursors,
            resolver,
            cache,
            events: JobEventBus::new(),
            limits: SyncLimits::default(),
            conflict_strategy: ResolutionStrategy::NewestWins,
        }
    }

    /// The event bus jobs publish to.
    #[must_use]
    pub fn events(&self) -> &JobEventBus {
        &self.events
    }

    /// Number of jobs currently executing.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Create a job row and its queue entry.
    ///
    /// The caller must belong to the integration's organization. When
    /// enqueueing fails after the job row was written, the row is rolled
    /// back and the original enqueue error is surfaced.
    #[instrument(skip(self, config), fields(caller_org = %caller_org, integration_id = %integration_id))]
    pub async fn create_sync_job(
        &self,
        caller_org: OrgId,
        integration_id: syncora_core::IntegrationId,
        job_type: SyncJobType,
        config: SyncJobConfig,
    ) -> SyncEngineResult<SyncJob> {
        config.validate().map_err(SyncError::validation)?;

        let integration = self
            .integrations
            .fetch_integration(integration_id)
            .await?
            .ok_or_else(|| SyncError::not_found("integration", integration_id))?;

        if integration.org_id != caller_org {
            return Err(SyncError::forbidden(format!(
                "integration {integration_id} does not belong to organization {caller_org}"
            )));
        }

        let job = SyncJob::new(integration.org_id, integration.id, job_type, config);
        self.jobs.insert_job(&job).await?;

        let enqueued = self
            .queue
            .enqueue(
                job.id,
                job.config.priority.queue_weight(),
                job.config.retry.max_attempts,
            )
            .await;

        if let Err(enqueue_err) = enqueued {
            if let Err(rollback_err) = self.jobs.delete_job(job.id).await {
                error!(
                    job_id = %job.id,
                    enqueue_error = %enqueue_err,
                    rollback_error = %rollback_err,
                    "failed to roll back job row after enqueue failure"
                );
            } else {
                warn!(job_id = %job.id, error = %enqueue_err, "rolled back job row after enqueue failure");
            }
            return Err(enqueue_err.into());
        }

        info!(job_id = %job.id, priority = %job.config.priority, "sync job created");
        self.events.publish(JobEvent::Created {
            job_id: job.id,
            integration_id: integration.id,
        });

        Ok(job)
    }

    /// Execute a job to its terminal status.
    ///
    /// Refuses once the concurrency cap is reached or when the job is
    /// already executing. The terminal status and result are written exactly
    /// once, on every exit path after execution starts.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn execute_job(&self, job_id: JobId) -> SyncEngineResult<SyncJobResult> {
        let job = self
            .jobs
            .fetch_job(job_id)
            .await?
            .ok_or_else(|| SyncError::not_found("job", job_id))?;

        if job.is_terminal() {
            return Err(SyncError::validation(format!(
                "job {job_id} is already {}",
                job.status
            )));
        }

        let integration = self
            .integrations
            .fetch_integration(job.integration_id)
            .await?
            .ok_or_else(|| SyncError::not_found("integration", job.integration_id))?;

        let token = CancellationToken::new();
        self.claim_slot(job_id, token.clone())?;

        let timed_out = Arc::new(AtomicBool::new(false));
        let timer = job.config.timeout().map(|timeout| {
            let token = token.clone();
            let timed_out = Arc::clone(&timed_out);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                timed_out.store(true, Ordering::SeqCst);
                warn!(timeout_secs = timeout.as_secs(), "sync job timed out");
                token.cancel();
            })
        });

        // Releases the slot and aborts the timer on every exit path.
        let _guard = ActiveJobGuard {
            active: Arc::clone(&self.active),
            job_id,
            timer,
        };

        self.jobs.mark_running(job_id, Utc::now()).await?;
        self.events.publish(JobEvent::Started { job_id });

        let outcome = self.run_entities(&job, &integration, &token, &timed_out).await;

        self.jobs
            .finalize_job(
                job_id,
                outcome.status,
                Some(&outcome.result),
                outcome.error.as_deref(),
            )
            .await?;

        match outcome.status {
            SyncJobStatus::Completed | SyncJobStatus::CompletedWithErrors => {
                self.events.publish(JobEvent::Completed {
                    job_id,
                    with_errors: outcome.status == SyncJobStatus::CompletedWithErrors,
                });
            }
            SyncJobStatus::Cancelled => {
                self.events.publish(JobEvent::Cancelled { job_id });
            }
            _ => {
                self.events.publish(JobEvent::Failed {
                    job_id,
                    error: outcome.error.clone().unwrap_or_default(),
                });
            }
        }

        if outcome.timed_out_before_execution {
            return Err(SyncError::TimedOutBeforeExecution { job_id });
        }

        info!(status = %outcome.status, "sync job finished");
        Ok(outcome.result)
    }

    /// Pop the highest-priority queued job and execute it.
    ///
    /// Returns `None` when the queue is empty.
    pub async fn execute_next(&self) -> SyncEngineResult<Option<SyncJobResult>> {
        match self.queue.dequeue_next().await? {
            Some(job_id) => self.execute_job(job_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Signal cancellation for an executing job.
    ///
    /// Returns `true` when a running job was signalled; a job that is not
    /// executing is left untouched. The executor writes the terminal
    /// `cancelled` status.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(&job_id) {
            Some(token) => {
                info!("cancelling sync job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn claim_slot(&self, job_id: JobId, token: CancellationToken) -> SyncEngineResult<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains_key(&job_id) {
            return Err(SyncError::AlreadyExecuting { job_id });
        }
        if active.len() >= self.limits.max_concurrent_jobs {
            return Err(SyncError::ConcurrencyLimit {
                active: active.len(),
                max: self.limits.max_concurrent_jobs,
            });
        }
        active.insert(job_id, token);
        Ok(())
    }

    async fn run_entities(
        &self,
        job: &SyncJob,
        integration: &Integration,
        token: &CancellationToken,
        timed_out: &AtomicBool,
    ) -> ExecOutcome {
        let tracker = PerformanceTracker::start();
        let entities_total = job.config.entity_types.len() as u32;
        let mut result = SyncJobResult::default();
        let mut cancelled = false;

        self.publish_progress(job.id, SyncProgress::initializing(entities_total));

        // The timer may have fired before any entity work began.
        if token.is_cancelled() && timed_out.load(Ordering::SeqCst) {
            result.duration = tracker.finish().duration;
            return ExecOutcome {
                status: SyncJobStatus::Failed,
                result,
                error: Some("timed out before execution".to_string()),
                timed_out_before_execution: true,
            };
        }

        let connector = match tracker
            .track(
                CallKind::Api,
                self.cache
                    .get_or_init(integration.platform, &integration.connector_config()),
            )
            .await
        {
            Ok(connector) => connector,
            Err(err) => {
                let message = err.to_string();
                result
                    .errors
                    .push(SyncErrorRecord::from_connector("connector", &err));
                let metrics = tracker.finish();
                result.duration = metrics.duration;
                result.metrics = Some(metrics);
                return ExecOutcome {
                    status: SyncJobStatus::Failed,
                    result,
                    error: Some(message),
                    timed_out_before_execution: false,
                };
            }
        };

        let mut entities_completed = 0u32;
        let mut records_processed = 0u64;
        let mut infra_error: Option<String> = None;

        for entity_type in &job.config.entity_types {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            self.publish_progress(
                job.id,
                SyncProgress::fetching(
                    entities_completed,
                    entities_total,
                    records_processed,
                    entity_type.clone(),
                ),
            );

            let options = match self
                .entity_options(job, integration, entity_type, token, &tracker)
                .await
            {
                Ok(options) => options,
                Err(err) => {
                    infra_error = Some(err.to_string());
                    break;
                }
            };

            match tracker
                .track(CallKind::Api, connector.sync(entity_type, &options))
                .await
            {
                Ok(entity_result) => {
                    records_processed += entity_result.processed;
                    result.summary.absorb(&entity_result);

                    if let Some(cursor) = &entity_result.next_cursor {
                        if let Err(err) = tracker
                            .track(
                                CallKind::Storage,
                                self.cursors.put_cursor(integration.id, entity_type, cursor),
                            )
                            .await
                        {
                            infra_error = Some(err.to_string());
                            break;
                        }
                    }

                    if !entity_result.candidate_conflicts.is_empty() {
                        let ctx = ConflictContext {
                            org_id: job.org_id,
                            integration_id: integration.id,
                            entity_type: entity_type.clone(),
                        };
                        let outcome = self
                            .resolver
                            .resolve_batch(
                                &ctx,
                                entity_result.candidate_conflicts.clone(),
                                self.conflict_strategy,
                            )
                            .await;

                        for conflict in &outcome.resolved {
                            self.events.publish(JobEvent::ConflictDetected {
                                job_id: job.id,
                                entity_type: entity_type.clone(),
                                record_id: conflict.record_id.clone(),
                            });
                        }
                        for failure in outcome.failures {
                            result.errors.push(SyncErrorRecord {
                                entity_type: entity_type.clone(),
                                message: failure,
                                error_code: "CONFLICT_PERSIST_FAILED".to_string(),
                                occurred_at: Utc::now(),
                            });
                        }
                        result.conflicts.extend(outcome.resolved);
                    }

                    result
                        .entity_results
                        .insert(entity_type.clone(), entity_result);
                    entities_completed += 1;
                }
                Err(ConnectorError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(err) => {
                    // One entity's failure does not abort its siblings.
                    warn!(entity_type = %entity_type, error = %err, "entity sync failed");
                    result
                        .errors
                        .push(SyncErrorRecord::from_connector(entity_type.clone(), &err));
                }
            }
        }

        self.publish_progress(
            job.id,
            SyncProgress::finalizing(entities_completed, entities_total, records_processed),
        );

        let metrics = tracker.finish();
        result.duration = metrics.duration;
        if let Err(err) = self.metrics.insert_metrics(job.id, &metrics).await {
            warn!(error = %err, "failed to persist job metrics");
        }
        result.metrics = Some(metrics);

        let (status, error) = if let Some(message) = infra_error {
            (SyncJobStatus::Failed, Some(message))
        } else if cancelled || token.is_cancelled() {
            (SyncJobStatus::Cancelled, None)
        } else if result.has_errors() {
            (SyncJobStatus::CompletedWithErrors, None)
        } else {
            (SyncJobStatus::Completed, None)
        };

        result.success = status == SyncJobStatus::Completed;

        ExecOutcome {
            status,
            result,
            error,
            timed_out_before_execution: false,
        }
    }

    async fn entity_options(
        &self,
        job: &SyncJob,
        integration: &Integration,
        entity_type: &str,
        token: &CancellationToken,
        tracker: &PerformanceTracker,
    ) -> SyncEngineResult<EntitySyncOptions> {
        let options = match job.config.mode {
            SyncMode::Full => EntitySyncOptions::full(),
            SyncMode::Incremental => {
                let cursor = tracker
                    .track(
                        CallKind::Storage,
                        self.cursors.get_cursor(integration.id, entity_type),
                    )
                    .await?;
                EntitySyncOptions::incremental(cursor)
            }
        };

        Ok(options
            .with_limit(job.config.batch_size)
            .with_cancel(token.clone()))
    }

    fn publish_progress(&self, job_id: JobId, progress: SyncProgress) {
        self.events.publish(JobEvent::Progress { job_id, progress });
    }

    /// Evict cached connector instances for an integration.
    ///
    /// Used when credentials rotate; the next job builds a fresh connector.
    pub async fn evict_connectors(&self, integration_id: syncora_core::IntegrationId) -> usize {
        self.cache.evict_integration(integration_id).await
    }
}

struct ExecOutcome {
    status: SyncJobStatus,
    result: SyncJobResult,
    error: Option<String>,
    timed_out_before_execution: bool,
}

struct ActiveJobGuard {
    active: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    job_id: JobId,
    timer: Option<JoinHandle<()>>,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}
