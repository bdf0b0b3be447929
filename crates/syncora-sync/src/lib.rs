//! # Sync Engine
//!
//! Server-side sync jobs for syncora: creation, priority queueing, bounded
//! concurrent execution, conflict resolution, and performance tracking.
//!
//! This crate provides the infrastructure for:
//! - Job creation with org ownership checks and queue rollback
//! - Bounded concurrent execution under cancellation tokens and timeouts
//! - Per-entity progress snapshots and typed lifecycle events
//! - Field-level conflict detection with pluggable resolution strategies
//! - Per-job resource tracking (API/storage calls, memory, CPU)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌───────────────┐
//! │  Caller     │────►│  Job Queue   │────►│   Executor    │
//! │  (API/CLI)  │     │  (priority)  │     │               │
//! └─────────────┘     └──────────────┘     └───────┬───────┘
//!                                                  │
//!                        ┌─────────────────────────┼─────────────────┐
//!                        ▼                         ▼                 ▼
//!                 ┌─────────────┐          ┌───────────────┐  ┌─────────────┐
//!                 │  Connector  │          │   Conflict    │  │ Performance │
//!                 │   Cache     │          │   Resolver    │  │  Tracker    │
//!                 └─────────────┘          └───────────────┘  └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use syncora_sync::{SyncJobManager, SyncJobConfig, SyncJobType, JobPriority};
//!
//! let config = SyncJobConfig::for_entities(vec!["products".into(), "inventory".into()])
//!     .with_priority(JobPriority::High);
//!
//! let job = manager
//!     .create_sync_job(caller_org, integration_id, SyncJobType::Full, config)
//!     .await?;
//!
//! let result = manager.execute_job(job.id).await?;
//! println!("processed {}", result.summary.total_processed);
//! ```

pub mod conflict;
pub mod error;
pub mod events;
pub mod integration;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod progress;
pub mod result;
pub mod store;

pub use conflict::{
    ConflictBatchOutcome, ConflictContext, ConflictResolution, ConflictResolver,
    ResolutionStrategy, SyncConflict,
};
pub use error::{SyncEngineResult, SyncError};
pub use events::{JobEvent, JobEventBus};
pub use integration::Integration;
pub use job::{
    JobPriority, RetryPolicy, SyncJob, SyncJobConfig, SyncJobStatus, SyncJobType,
};
pub use manager::{SyncJobManager, SyncLimits};
pub use metrics::{CallKind, PerformanceMetrics, PerformanceTracker};
pub use progress::{SyncPhase, SyncProgress};
pub use result::{SyncErrorRecord, SyncJobResult, SyncSummary};
pub use store::{
    ConflictStore, CursorStore, IntegrationStore, JobQueueStore, JobStore, MetricsStore,
    QueueStats, StoreError,
};
