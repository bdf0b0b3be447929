//! Durable offline write queue
//!
//! Captures local writes while disconnected and replays them against the
//! backing store when connectivity returns. At most one flush runs at a
//! time; conflicting writes are escalated instead of retried, and other
//! failures retry with exponential backoff up to a ceiling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use syncora_core::OperationId;

use crate::error::{OfflineError, OfflineResult};
use crate::monitor::{ConnectionMonitor, ConnectivityState};
use crate::operation::{OperationInput, OperationKind, QueuedOperation};
use crate::store::{OperationStore, RecordStore};

/// Tuning for the offline queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum failed replays before an operation is dropped. Total
    /// attempts are bounded by `retry_ceiling + 1`.
    pub retry_ceiling: u32,
    /// Base delay for exponential backoff between replays of one operation.
    pub backoff_base_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            backoff_base_secs: 2,
        }
    }
}

/// Outcome of one queue flush.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Operations replayed and removed.
    pub successful: usize,
    /// Operations dropped after exhausting the retry ceiling.
    pub failed: usize,
    /// Operations removed because the backing store reported a conflict.
    pub conflicts: Vec<OperationId>,
    /// Operations skipped because their backoff delay has not elapsed.
    pub deferred: usize,
}

impl FlushReport {
    /// True when the flush touched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.successful == 0 && self.failed == 0 && self.conflicts.is_empty() && self.deferred == 0
    }
}

/// Durable queue of local writes awaiting replay.
pub struct OfflineQueue {
    ops: Arc<dyn OperationStore>,
    records: Arc<dyn RecordStore>,
    config: QueueConfig,
    flushing: AtomicBool,
    flush_notify: Notify,
    connectivity: StdMutex<Option<watch::Receiver<ConnectivityState>>>,
    shutdown: CancellationToken,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineQueue {
    /// Create a queue over the given stores.
    pub fn new(
        ops: Arc<dyn OperationStore>,
        records: Arc<dyn RecordStore>,
        config: QueueConfig,
    ) -> Self {
        Self {
            ops,
            records,
            config,
            flushing: AtomicBool::new(false),
            flush_notify: Notify::new(),
            connectivity: StdMutex::new(None),
            shutdown: CancellationToken::new(),
            watcher: Mutex::new(None),
        }
    }

    /// Persist a write for later replay.
    ///
    /// When the monitor currently reports online and no flush is in flight,
    /// a flush is triggered fire-and-forget.
    #[instrument(skip(self, input), fields(table = %input.table, op = %input.op))]
    pub async fn enqueue(&self, input: OperationInput) -> OfflineResult<QueuedOperation> {
        let operation = QueuedOperation::new(input);
        self.ops.add(&operation).await?;
        debug!(operation_id = %operation.id, "operation queued");

        if self.is_online() && !self.flushing.load(Ordering::SeqCst) {
            self.flush_notify.notify_one();
        }

        Ok(operation)
    }

    /// Replay all due operations against the backing store.
    ///
    /// Single-flight: a call made while another flush is running returns an
    /// empty report without touching the store.
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> OfflineResult<FlushReport> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("flush already in flight");
            return Ok(FlushReport::default());
        }
        let _guard = FlushGuard(&self.flushing);

        let operations = self.ops.get_all().await?;
        let mut report = FlushReport::default();
        let now = Utc::now();

        for operation in operations {
            if operation.is_deferred(now) {
                report.deferred += 1;
                continue;
            }

            match self.execute_operation(&operation).await {
                Ok(()) => {
                    self.ops.delete(operation.id).await?;
                    report.successful += 1;
                }
                Err(err) if err.is_conflict() => {
                    // Conflicts are escalated, never retried.
                    warn!(
                        operation_id = %operation.id,
                        table = %operation.table,
                        error = %err,
                        "queued write conflicts with backing store"
                    );
                    self.ops.delete(operation.id).await?;
                    report.conflicts.push(operation.id);
                }
                Err(err) => {
                    let mut operation = operation;
                    operation.retries += 1;
                    if operation.retries > self.config.retry_ceiling {
                        error!(
                            operation_id = %operation.id,
                            table = %operation.table,
                            retries = operation.retries,
                            error = %err,
                            "dropping operation after exhausting retries"
                        );
                        self.ops.delete(operation.id).await?;
                        report.failed += 1;
                    } else {
                        operation.retry_after = Some(now + self.backoff_delay(operation.retries));
                        warn!(
                            operation_id = %operation.id,
                            retries = operation.retries,
                            error = %err,
                            "replay failed, will retry"
                        );
                        self.ops.update(&operation).await?;
                    }
                }
            }
        }

        if !report.is_empty() {
            info!(
                successful = report.successful,
                failed = report.failed,
                conflicts = report.conflicts.len(),
                deferred = report.deferred,
                "queue flush finished"
            );
        }

        Ok(report)
    }

    /// Watch a connection monitor and flush on offline-to-online edges.
    ///
    /// One watcher task is spawned; it also services flush triggers from
    /// [`enqueue`](Self::enqueue). Call [`shutdown`](Self::shutdown) to stop
    /// it.
    pub async fn subscribe(self: Arc<Self>, monitor: &ConnectionMonitor) {
        let mut rx = monitor.subscribe();
        *self
            .connectivity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(rx.clone());

        let queue = Arc::clone(&self);
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut previous = *rx.borrow();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = *rx.borrow_and_update();
                        if previous == ConnectivityState::Offline
                            && current == ConnectivityState::Online
                        {
                            info!("connectivity restored, flushing queue");
                            if let Err(err) = queue.process_queue().await {
                                warn!(error = %err, "reconnect flush failed");
                            }
                        }
                        previous = current;
                    }
                    _ = queue.flush_notify.notified() => {
                        if let Err(err) = queue.process_queue().await {
                            warn!(error = %err, "triggered flush failed");
                        }
                    }
                }
            }
        });

        *self.watcher.lock().await = Some(handle);
    }

    /// Stop the watcher task.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.watcher.lock().await.take() {
            let _ = handle.await;
        }
    }

    fn is_online(&self) -> bool {
        self.connectivity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|rx| *rx.borrow() == ConnectivityState::Online)
    }

    async fn execute_operation(&self, operation: &QueuedOperation) -> OfflineResult<()> {
        match operation.op {
            OperationKind::Insert => {
                self.records
                    .insert(&operation.table, &operation.payload)
                    .await
            }
            OperationKind::Update => {
                self.records
                    .update(&operation.table, &operation.payload)
                    .await
            }
            OperationKind::Delete => {
                self.records
                    .delete(&operation.table, &operation.payload)
                    .await
            }
        }
    }

    fn backoff_delay(&self, retries: u32) -> ChronoDuration {
        let exponent = retries.saturating_sub(1).min(16);
        let secs = self.config.backoff_base_secs.saturating_mul(1 << exponent);
        ChronoDuration::seconds(secs as i64)
    }
}

/// Clears the in-flight flag when a flush exits, on any path.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OfflineError;
    use crate::store::MemoryOperationStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use syncora_core::OrgId;

    #[derive(Clone, Copy)]
    enum Mode {
        Succeed,
        Fail,
        Conflict,
    }

    struct MockRecordStore {
        mode: StdMutex<Mode>,
        calls: AtomicUsize,
        log: StdMutex<Vec<(OperationKind, String)>>,
    }

    impl MockRecordStore {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode: StdMutex::new(mode),
                calls: AtomicUsize::new(0),
                log: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn apply(&self, kind: OperationKind, table: &str) -> OfflineResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push((kind, table.to_string()));
            match *self.mode.lock().unwrap() {
                Mode::Succeed => Ok(()),
                Mode::Fail => Err(OfflineError::backend("backing store unreachable")),
                Mode::Conflict => Err(OfflineError::conflict("record changed upstream")),
            }
        }
    }

    #[async_trait]
    impl RecordStore for MockRecordStore {
        async fn insert(&self, table: &str, _payload: &Value) -> OfflineResult<()> {
            self.apply(OperationKind::Insert, table)
        }

        async fn update(&self, table: &str, _payload: &Value) -> OfflineResult<()> {
            self.apply(OperationKind::Update, table)
        }

        async fn delete(&self, table: &str, _payload: &Value) -> OfflineResult<()> {
            self.apply(OperationKind::Delete, table)
        }
    }

    fn input(table: &str, op: OperationKind) -> OperationInput {
        OperationInput {
            org_id: OrgId::new(),
            table: table.to_string(),
            op,
            payload: json!({"sku": "A-100"}),
        }
    }

    fn queue_with(
        records: Arc<MockRecordStore>,
        config: QueueConfig,
    ) -> (Arc<OfflineQueue>, Arc<MemoryOperationStore>) {
        let ops = Arc::new(MemoryOperationStore::new());
        let queue = Arc::new(OfflineQueue::new(ops.clone(), records, config));
        (queue, ops)
    }

    #[tokio::test]
    async fn test_enqueue_persists() {
        let records = MockRecordStore::new(Mode::Succeed);
        let (queue, ops) = queue_with(records, QueueConfig::default());

        let op = queue
            .enqueue(input("inventory_counts", OperationKind::Update))
            .await
            .unwrap();
        assert_eq!(op.retries, 0);
        assert_eq!(ops.len().await, 1);
    }

    #[tokio::test]
    async fn test_flush_replays_in_enqueue_order() {
        let records = MockRecordStore::new(Mode::Succeed);
        let (queue, ops) = queue_with(records.clone(), QueueConfig::default());

        queue
            .enqueue(input("orders", OperationKind::Insert))
            .await
            .unwrap();
        queue
            .enqueue(input("inventory_counts", OperationKind::Update))
            .await
            .unwrap();

        let report = queue.process_queue().await.unwrap();
        assert_eq!(report.successful, 2);
        assert!(ops.is_empty().await);

        let log = records.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                (OperationKind::Insert, "orders".to_string()),
                (OperationKind::Update, "inventory_counts".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_flush_in_flight_returns_empty_report() {
        let records = MockRecordStore::new(Mode::Succeed);
        let (queue, ops) = queue_with(records.clone(), QueueConfig::default());
        queue
            .enqueue(input("orders", OperationKind::Insert))
            .await
            .unwrap();

        queue.flushing.store(true, Ordering::SeqCst);
        let report = queue.process_queue().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(records.calls(), 0);
        assert_eq!(ops.len().await, 1);
    }

    #[tokio::test]
    async fn test_conflict_escalated_not_retried() {
        let records = MockRecordStore::new(Mode::Conflict);
        let (queue, ops) = queue_with(records.clone(), QueueConfig::default());

        let op = queue
            .enqueue(input("orders", OperationKind::Update))
            .await
            .unwrap();

        let report = queue.process_queue().await.unwrap();
        assert_eq!(report.conflicts, vec![op.id]);
        assert_eq!(report.failed, 0);
        assert!(ops.is_empty().await);
        assert_eq!(records.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_ceiling_bounds_total_attempts() {
        let records = MockRecordStore::new(Mode::Fail);
        let config = QueueConfig {
            retry_ceiling: 2,
            backoff_base_secs: 0,
        };
        let (queue, ops) = queue_with(records.clone(), config);

        queue
            .enqueue(input("orders", OperationKind::Insert))
            .await
            .unwrap();

        let first = queue.process_queue().await.unwrap();
        assert_eq!(first.failed, 0);
        let second = queue.process_queue().await.unwrap();
        assert_eq!(second.failed, 0);
        let third = queue.process_queue().await.unwrap();
        assert_eq!(third.failed, 1);

        // ceiling + 1 total attempts, then dropped
        assert_eq!(records.calls(), 3);
        assert!(ops.is_empty().await);

        let after = queue.process_queue().await.unwrap();
        assert!(after.is_empty());
        assert_eq!(records.calls(), 3);
    }

    #[tokio::test]
    async fn test_backoff_defers_retry() {
        let records = MockRecordStore::new(Mode::Fail);
        let config = QueueConfig {
            retry_ceiling: 3,
            backoff_base_secs: 60,
        };
        let (queue, _ops) = queue_with(records.clone(), config);

        queue
            .enqueue(input("orders", OperationKind::Insert))
            .await
            .unwrap();

        queue.process_queue().await.unwrap();
        assert_eq!(records.calls(), 1);

        let report = queue.process_queue().await.unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(records.calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_to_online_flushes_once() {
        let records = MockRecordStore::new(Mode::Succeed);
        let (queue, ops) = queue_with(records.clone(), QueueConfig::default());
        let monitor = ConnectionMonitor::new(ConnectivityState::Offline);
        queue.clone().subscribe(&monitor).await;

        queue
            .enqueue(input("orders", OperationKind::Insert))
            .await
            .unwrap();
        assert_eq!(records.calls(), 0);

        monitor.set_state(ConnectivityState::Online);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(ops.is_empty().await);
        assert_eq!(records.calls(), 1);

        // Re-announcing online is not an edge.
        monitor.set_state(ConnectivityState::Online);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(records.calls(), 1);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_while_online_triggers_flush() {
        let records = MockRecordStore::new(Mode::Succeed);
        let (queue, ops) = queue_with(records.clone(), QueueConfig::default());
        let monitor = ConnectionMonitor::new(ConnectivityState::Online);
        queue.clone().subscribe(&monitor).await;

        queue
            .enqueue(input("inventory_counts", OperationKind::Update))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(ops.is_empty().await);
        assert_eq!(records.calls(), 1);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_watcher() {
        let records = MockRecordStore::new(Mode::Succeed);
        let (queue, _ops) = queue_with(records.clone(), QueueConfig::default());
        let monitor = ConnectionMonitor::new(ConnectivityState::Offline);
        queue.clone().subscribe(&monitor).await;
        queue.shutdown().await;

        queue
            .enqueue(input("orders", OperationKind::Insert))
            .await
            .unwrap();
        monitor.set_state(ConnectivityState::Online);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(records.calls(), 0);
    }
}
