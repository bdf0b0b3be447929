//! Job lifecycle events
//!
//! Typed broadcast channel for job state transitions and progress. Emission
//! is best-effort: a bus with no subscribers drops events without failing
//! the publisher.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use syncora_core::{IntegrationId, JobId};

use crate::progress::SyncProgress;

/// Default buffered capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A job lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job row was created and enqueued.
    Created { job_id: JobId, integration_id: IntegrationId },
    /// Execution began.
    Started { job_id: JobId },
    /// A progress snapshot was published.
    Progress { job_id: JobId, progress: SyncProgress },
    /// The job finished cleanly.
    Completed { job_id: JobId, with_errors: bool },
    /// The job failed.
    Failed { job_id: JobId, error: String },
    /// The job was cancelled.
    Cancelled { job_id: JobId },
    /// A conflict was detected during entity reconciliation.
    ConflictDetected { job_id: JobId, entity_type: String, record_id: String },
}

impl JobEvent {
    /// The job this event concerns.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Created { job_id, .. }
            | JobEvent::Started { job_id }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id }
            | JobEvent::ConflictDetected { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast bus for [`JobEvent`]s.
#[derive(Debug, Clone)]
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit buffered capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send failure means no subscriber is listening.
    pub fn publish(&self, event: JobEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(job_id = %event.job_id(), "no subscribers for job event");
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new()
    }
}
