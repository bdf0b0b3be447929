//! Sync job model
//!
//! Job rows, configuration and status machine. A job is created `pending`,
//! moved to `running` by the executor and finalized exactly once into a
//! terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use syncora_core::{IntegrationId, JobId, OrgId, OrgScoped};
use syncora_connector::SyncMode;

/// Kind of reconciliation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobType {
    /// Walk every record of every configured entity type.
    Full,
    /// Walk only records changed since the stored cursors.
    Incremental,
    /// Re-sync a single entity type on demand.
    EntityRefresh,
}

impl SyncJobType {
    /// Get the string representation used in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobType::Full => "full",
            SyncJobType::Incremental => "incremental",
            SyncJobType::EntityRefresh => "entity_refresh",
        }
    }
}

impl fmt::Display for SyncJobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncJobType {
    type Err = ParseJobFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncJobType::Full),
            "incremental" => Ok(SyncJobType::Incremental),
            "entity_refresh" => Ok(SyncJobType::EntityRefresh),
            _ => Err(ParseJobFieldError {
                field: "job type",
                value: s.to_string(),
            }),
        }
    }
}

/// Status of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    /// Queued, waiting for an executor.
    #[default]
    Pending,
    /// An executor is driving the job.
    Running,
    /// All entity types succeeded.
    Completed,
    /// Some entity types succeeded, some failed.
    CompletedWithErrors,
    /// The job failed as a whole.
    Failed,
    /// Cancelled by a caller or timeout.
    Cancelled,
}

impl SyncJobStatus {
    /// Get the string representation used in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "pending",
            SyncJobStatus::Running => "running",
            SyncJobStatus::Completed => "completed",
            SyncJobStatus::CompletedWithErrors => "completed_with_errors",
            SyncJobStatus::Failed => "failed",
            SyncJobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states are final; the executor never touches the job again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncJobStatus::Completed
                | SyncJobStatus::CompletedWithErrors
                | SyncJobStatus::Failed
                | SyncJobStatus::Cancelled
        )
    }

    /// Whether a cancellation request has any effect.
    #[must_use]
    pub fn can_cancel(&self) -> bool {
        matches!(self, SyncJobStatus::Pending | SyncJobStatus::Running)
    }
}

impl fmt::Display for SyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncJobStatus {
    type Err = ParseJobFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncJobStatus::Pending),
            "running" => Ok(SyncJobStatus::Running),
            "completed" => Ok(SyncJobStatus::Completed),
            "completed_with_errors" => Ok(SyncJobStatus::CompletedWithErrors),
            "failed" => Ok(SyncJobStatus::Failed),
            "cancelled" => Ok(SyncJobStatus::Cancelled),
            _ => Err(ParseJobFieldError {
                field: "job status",
                value: s.to_string(),
            }),
        }
    }
}

/// Queue priority of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// Operator-initiated or time-critical syncs.
    High,
    #[default]
    Normal,
    /// Bulk backfills that should yield to everything else.
    Low,
}

impl JobPriority {
    /// Numeric weight persisted to the queue; higher dequeues first.
    #[must_use]
    pub fn queue_weight(&self) -> i16 {
        match self {
            JobPriority::High => 80,
            JobPriority::Normal => 50,
            JobPriority::Low => 20,
        }
    }

    /// Get the string representation used in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobPriority {
    type Err = ParseJobFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(JobPriority::High),
            "normal" => Ok(JobPriority::Normal),
            "low" => Ok(JobPriority::Low),
            _ => Err(ParseJobFieldError {
                field: "priority",
                value: s.to_string(),
            }),
        }
    }
}

/// Error parsing a job enum field from its database string.
#[derive(Debug, Clone)]
pub struct ParseJobFieldError {
    field: &'static str,
    value: String,
}

impl fmt::Display for ParseJobFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}'", self.field, self.value)
    }
}

impl std::error::Error for ParseJobFieldError {}

/// Retry policy for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum queue attempts before the job is abandoned.
    pub max_attempts: u32,
    /// Base delay between queue attempts.
    pub backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 60,
        }
    }
}

/// Configuration of one sync job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJobConfig {
    /// Entity types to reconcile, processed strictly in this order.
    pub entity_types: Vec<String>,
    /// Records per connector batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Full or incremental walk.
    #[serde(default)]
    pub mode: SyncMode,
    /// Queue priority.
    #[serde(default)]
    pub priority: JobPriority,
    /// Queue retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Overall job timeout in seconds; None disables the timer.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_batch_size() -> u32 {
    100
}

impl Default for SyncJobConfig {
    fn default() -> Self {
        Self {
            entity_types: Vec::new(),
            batch_size: default_batch_size(),
            mode: SyncMode::default(),
            priority: JobPriority::default(),
            retry: RetryPolicy::default(),
            timeout_secs: None,
        }
    }
}

impl SyncJobConfig {
    /// Configuration syncing the given entity types with defaults.
    pub fn for_entities<I, S>(entity_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_types: entity_types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the overall timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// The configured timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.entity_types.is_empty() {
            return Err("entity_types must not be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }
        Ok(())
    }
}

/// A sync job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Job ID.
    pub id: JobId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Target integration.
    pub integration_id: IntegrationId,
    /// Kind of reconciliation.
    pub job_type: SyncJobType,
    /// Job configuration.
    pub config: SyncJobConfig,
    /// Current status.
    pub status: SyncJobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the executor picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal error message, if the job failed.
    pub error: Option<String>,
}

impl SyncJob {
    /// Create a new pending job.
    pub fn new(
        org_id: OrgId,
        integration_id: IntegrationId,
        job_type: SyncJobType,
        config: SyncJobConfig,
    ) -> Self {
        Self {
            id: JobId::new(),
            org_id,
            integration_id,
            job_type,
            config,
            status: SyncJobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Whether the job has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a cancellation request has any effect.
    #[must_use]
    pub fn can_cancel(&self) -> bool {
        self.status.can_cancel()
    }
}

impl OrgScoped for SyncJob {
    fn org_id(&self) -> OrgId {
        self.org_id
    }
}
