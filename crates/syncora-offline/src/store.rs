//! Offline persistence contracts
//!
//! Two seams: the local durable store holding queued operations, and the
//! backing record store writes are replayed against once connectivity
//! returns.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use syncora_core::OperationId;

use crate::error::OfflineResult;
use crate::operation::QueuedOperation;

/// Local durable storage for queued operations.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist a new operation.
    async fn add(&self, operation: &QueuedOperation) -> OfflineResult<()>;

    /// All operations in enqueue order.
    async fn get_all(&self) -> OfflineResult<Vec<QueuedOperation>>;

    /// Replace a stored operation.
    async fn update(&self, operation: &QueuedOperation) -> OfflineResult<()>;

    /// Remove an operation.
    async fn delete(&self, operation_id: OperationId) -> OfflineResult<()>;
}

/// The backing store queued writes replay against.
///
/// A conflicting write must surface as [`OfflineError::Conflict`] so the
/// queue can escalate it instead of retrying.
///
/// [`OfflineError::Conflict`]: crate::error::OfflineError::Conflict
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record.
    async fn insert(&self, table: &str, payload: &Value) -> OfflineResult<()>;

    /// Update a record.
    async fn update(&self, table: &str, payload: &Value) -> OfflineResult<()>;

    /// Delete a record.
    async fn delete(&self, table: &str, payload: &Value) -> OfflineResult<()>;
}

/// In-memory operation store preserving enqueue order.
#[derive(Default)]
pub struct MemoryOperationStore {
    operations: RwLock<VecDeque<QueuedOperation>>,
}

impl MemoryOperationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored operations.
    pub async fn len(&self) -> usize {
        self.operations.read().await.len()
    }

    /// True when no operations are stored.
    pub async fn is_empty(&self) -> bool {
        self.operations.read().await.is_empty()
    }
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn add(&self, operation: &QueuedOperation) -> OfflineResult<()> {
        self.operations.write().await.push_back(operation.clone());
        Ok(())
    }

    async fn get_all(&self) -> OfflineResult<Vec<QueuedOperation>> {
        Ok(self.operations.read().await.iter().cloned().collect())
    }

    async fn update(&self, operation: &QueuedOperation) -> OfflineResult<()> {
        let mut operations = self.operations.write().await;
        if let Some(slot) = operations.iter_mut().find(|op| op.id == operation.id) {
            *slot = operation.clone();
        }
        Ok(())
    }

    async fn delete(&self, operation_id: OperationId) -> OfflineResult<()> {
        self.operations
            .write()
            .await
            .retain(|op| op.id != operation_id);
        Ok(())
    }
}
