//! # Offline Write Queue
//!
//! Client-side durable queue for syncora: local writes made while the
//! backing store is unreachable are persisted and replayed in order once
//! connectivity returns.
//!
//! This crate provides:
//! - Durable capture of insert/update/delete operations per logical table
//! - A connectivity monitor whose offline-to-online edge triggers replay
//! - Single-flight flushing with exponential backoff and a retry ceiling
//! - Conflict escalation: writes the backing store rejects as conflicting
//!   are surfaced, never retried
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use syncora_offline::{
//!     ConnectionMonitor, ConnectivityState, MemoryOperationStore, OfflineQueue,
//!     OperationInput, OperationKind, QueueConfig,
//! };
//!
//! let queue = Arc::new(OfflineQueue::new(ops, records, QueueConfig::default()));
//! queue.clone().subscribe(&monitor).await;
//!
//! queue.enqueue(OperationInput {
//!     org_id,
//!     table: "inventory_counts".into(),
//!     op: OperationKind::Update,
//!     payload: serde_json::json!({"sku": "A-100", "count": 42}),
//! }).await?;
//!
//! // Replay happens automatically when the monitor flips online.
//! monitor.set_state(ConnectivityState::Online);
//! ```

pub mod error;
pub mod monitor;
pub mod operation;
pub mod queue;
pub mod store;

pub use error::{OfflineError, OfflineResult};
pub use monitor::{ConnectionMonitor, ConnectivityState};
pub use operation::{OperationInput, OperationKind, ParseOperationKindError, QueuedOperation};
pub use queue::{FlushReport, OfflineQueue, QueueConfig};
pub use store::{MemoryOperationStore, OperationStore, RecordStore};
