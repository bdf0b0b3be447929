//! Queued write operations
//!
//! A queued operation is one local write captured while disconnected,
//! replayed against the backing store when connectivity returns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use syncora_core::{OperationId, OrgId, OrgScoped};

/// Kind of write an operation replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Insert a new record.
    Insert,
    /// Update an existing record.
    Update,
    /// Delete a record.
    Delete,
}

impl OperationKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ParseOperationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(OperationKind::Insert),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(ParseOperationKindError {
                value: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an unknown operation kind.
#[derive(Debug, Clone)]
pub struct ParseOperationKindError {
    /// The unrecognized input.
    pub value: String,
}

impl fmt::Display for ParseOperationKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation type: {}", self.value)
    }
}

impl std::error::Error for ParseOperationKindError {}

/// Input for enqueueing a new operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationInput {
    /// Owning organization.
    pub org_id: OrgId,
    /// Logical table the write targets.
    pub table: String,
    /// Kind of write.
    pub op: OperationKind,
    /// Record payload.
    pub payload: Value,
}

/// A durable queued write awaiting replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Unique operation id.
    pub id: OperationId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Logical table the write targets.
    pub table: String,
    /// Kind of write.
    pub op: OperationKind,
    /// Record payload.
    pub payload: Value,
    /// When the operation was enqueued.
    pub queued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    pub retries: u32,
    /// Earliest time the next replay attempt may run.
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,
}

impl QueuedOperation {
    /// Create a fresh operation from enqueue input.
    #[must_use]
    pub fn new(input: OperationInput) -> Self {
        Self {
            id: OperationId::new(),
            org_id: input.org_id,
            table: input.table,
            op: input.op,
            payload: input.payload,
            queued_at: Utc::now(),
            retries: 0,
            retry_after: None,
        }
    }

    /// True when the operation must wait before its next replay attempt.
    #[must_use]
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.retry_after.is_some_and(|at| at > now)
    }
}

impl OrgScoped for QueuedOperation {
    fn org_id(&self) -> OrgId {
        self.org_id
    }
}
