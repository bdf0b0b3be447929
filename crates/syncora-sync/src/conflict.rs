//! Conflict detection and resolution
//!
//! Connectors surface candidate conflicts while reconciling records; the
//! resolver validates them, applies the configured strategy, and persists
//! one row per conflict. Manual-strategy conflicts stay unresolved until an
//! operator picks a value.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use syncora_connector::CandidateConflict;
use syncora_core::{ConflictId, IntegrationId, OrgId};

use crate::store::ConflictStore;

/// How a detected conflict picks a winning value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The source platform's value wins.
    SourceWins,
    /// The target's existing value wins.
    TargetWins,
    /// The value with the most recent update timestamp wins.
    NewestWins,
    /// No automatic pick; the conflict waits for an operator.
    Manual,
}

impl ResolutionStrategy {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::SourceWins => "source_wins",
            ResolutionStrategy::TargetWins => "target_wins",
            ResolutionStrategy::NewestWins => "newest_wins",
            ResolutionStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_wins" => Ok(ResolutionStrategy::SourceWins),
            "target_wins" => Ok(ResolutionStrategy::TargetWins),
            "newest_wins" => Ok(ResolutionStrategy::NewestWins),
            "manual" => Ok(ResolutionStrategy::Manual),
            _ => Err(ParseStrategyError {
                value: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an unknown resolution strategy.
#[derive(Debug, Clone)]
pub struct ParseStrategyError {
    /// The unrecognized input.
    pub value: String,
}

impl fmt::Display for ParseStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resolution strategy: {}", self.value)
    }
}

impl std::error::Error for ParseStrategyError {}

/// The outcome recorded on a resolved conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Strategy that produced the pick.
    pub strategy: ResolutionStrategy,
    /// The value that won.
    pub resolved_value: Value,
    /// When the pick was made.
    pub resolved_at: DateTime<Utc>,
}

/// A field-level conflict between source and target values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique conflict id.
    pub id: ConflictId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Integration the conflict was detected under.
    pub integration_id: IntegrationId,
    /// Entity type of the conflicting record.
    pub entity_type: String,
    /// Platform record identifier.
    pub record_id: String,
    /// Conflicting field name.
    pub field: String,
    /// Value on the source platform.
    pub source_value: Value,
    /// Value currently in the target.
    pub target_value: Value,
    /// Source-side last-modified timestamp, when the platform provides one.
    pub source_updated_at: Option<DateTime<Utc>>,
    /// Target-side last-modified timestamp.
    pub target_updated_at: Option<DateTime<Utc>>,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
    /// Resolution, once one exists. `None` means pending.
    pub resolution: Option<ConflictResolution>,
}

impl SyncConflict {
    /// True while the conflict awaits resolution.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.resolution.is_none()
    }
}

/// Scope under which a batch of candidates was detected.
#[derive(Debug, Clone)]
pub struct ConflictContext {
    /// Owning organization.
    pub org_id: OrgId,
    /// Integration being synced.
    pub integration_id: IntegrationId,
    /// Entity type the candidates belong to.
    pub entity_type: String,
}

/// Result of resolving one batch of candidate conflicts.
#[derive(Debug, Default)]
pub struct ConflictBatchOutcome {
    /// Conflicts persisted, resolved or pending.
    pub resolved: Vec<SyncConflict>,
    /// Candidates dropped for missing identity fields.
    pub discarded: usize,
    /// Per-candidate failures that did not stop the batch.
    pub failures: Vec<String>,
}

/// Applies a resolution strategy to candidate conflicts and persists them.
pub struct ConflictResolver {
    store: Arc<dyn ConflictStore>,
}

impl ConflictResolver {
    /// Create a resolver backed by the given conflict store.
    pub fn new(store: Arc<dyn ConflictStore>) -> Self {
        Self { store }
    }

    /// Resolve and persist a batch of candidates.
    ///
    /// Candidates without a `record_id` or `field` are discarded. A single
    /// candidate's persistence failure is collected and does not stop the
    /// rest of the batch.
    #[instrument(skip(self, candidates), fields(
        integration_id = %ctx.integration_id,
        entity_type = %ctx.entity_type,
        count = candidates.len(),
    ))]
    pub async fn resolve_batch(
        &self,
        ctx: &ConflictContext,
        candidates: Vec<CandidateConflict>,
        strategy: ResolutionStrategy,
    ) -> ConflictBatchOutcome {
        let mut outcome = ConflictBatchOutcome::default();

        for candidate in candidates {
            let (record_id, field) = match (&candidate.record_id, &candidate.field) {
                (Some(record_id), Some(field)) => (record_id.clone(), field.clone()),
                _ => {
                    warn!(
                        entity_type = %ctx.entity_type,
                        has_record_id = candidate.record_id.is_some(),
                        has_field = candidate.field.is_some(),
                        "discarding conflict candidate with missing identity"
                    );
                    outcome.discarded += 1;
                    continue;
                }
            };

            let resolution = pick(&candidate, strategy, &record_id, &field);

            let conflict = SyncConflict {
                id: ConflictId::new(),
                org_id: ctx.org_id,
                integration_id: ctx.integration_id,
                entity_type: ctx.entity_type.clone(),
                record_id,
                field,
                source_value: candidate.source_value,
                target_value: candidate.target_value,
                source_updated_at: candidate.source_updated_at,
                target_updated_at: candidate.target_updated_at,
                detected_at: Utc::now(),
                resolution,
            };

            match self.store.insert_conflict(&conflict).await {
                Ok(()) => {
                    debug!(
                        conflict_id = %conflict.id,
                        record_id = %conflict.record_id,
                        field = %conflict.field,
                        pending = conflict.is_pending(),
                        "conflict persisted"
                    );
                    outcome.resolved.push(conflict);
                }
                Err(err) => {
                    warn!(
                        record_id = %conflict.record_id,
                        field = %conflict.field,
                        error = %err,
                        "failed to persist conflict"
                    );
                    outcome
                        .failures
                        .push(format!("{}/{}: {}", conflict.record_id, conflict.field, err));
                }
            }
        }

        outcome
    }

    /// List unresolved conflicts for an integration.
    pub async fn pending(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Vec<SyncConflict>, crate::store::StoreError> {
        self.store.pending_conflicts(integration_id).await
    }

    /// Apply an operator-chosen resolution to a pending conflict.
    ///
    /// Returns `false` when the conflict was already resolved or does not
    /// exist; the store guards the update on the pending state.
    pub async fn apply_manual(
        &self,
        conflict_id: ConflictId,
        resolution: ConflictResolution,
    ) -> Result<bool, crate::store::StoreError> {
        self.store.resolve_conflict(conflict_id, resolution).await
    }
}

fn pick(
    candidate: &CandidateConflict,
    strategy: ResolutionStrategy,
    record_id: &str,
    field: &str,
) -> Option<ConflictResolution> {
    let resolved_value = match strategy {
        ResolutionStrategy::Manual => return None,
        ResolutionStrategy::SourceWins => candidate.source_value.clone(),
        ResolutionStrategy::TargetWins => candidate.target_value.clone(),
        ResolutionStrategy::NewestWins => {
            match (candidate.source_updated_at, candidate.target_updated_at) {
                (Some(source_ts), Some(target_ts)) => {
                    if source_ts > target_ts {
                        candidate.source_value.clone()
                    } else {
                        candidate.target_value.clone()
                    }
                }
                _ => {
                    warn!(
                        record_id,
                        field, "newest_wins without both timestamps, keeping source value"
                    );
                    candidate.source_value.clone()
                }
            }
        }
    };

    Some(ConflictResolution {
        strategy,
        resolved_value,
        resolved_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryConflictStore;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> ConflictContext {
        ConflictContext {
            org_id: OrgId::new(),
            integration_id: IntegrationId::new(),
            entity_type: "products".to_string(),
        }
    }

    fn candidate(record_id: &str, field: &str) -> CandidateConflict {
        CandidateConflict::new(record_id, field, json!("source"), json!("target"))
    }

    mod strategy_tests {
        use super::*;

        #[test]
        fn test_round_trip() {
            for strategy in [
                ResolutionStrategy::SourceWins,
                ResolutionStrategy::TargetWins,
                ResolutionStrategy::NewestWins,
                ResolutionStrategy::Manual,
            ] {
                let parsed: ResolutionStrategy = strategy.as_str().parse().unwrap();
                assert_eq!(parsed, strategy);
            }
        }

        #[test]
        fn test_unknown_rejected() {
            let err = "latest_wins".parse::<ResolutionStrategy>().unwrap_err();
            assert!(err.to_string().contains("latest_wins"));
        }
    }

    mod resolve_tests {
        use super::*;

        #[tokio::test]
        async fn test_source_wins() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store);
            let outcome = resolver
                .resolve_batch(
                    &ctx(),
                    vec![candidate("rec-1", "price")],
                    ResolutionStrategy::SourceWins,
                )
                .await;

            assert_eq!(outcome.resolved.len(), 1);
            let resolution = outcome.resolved[0].resolution.as_ref().unwrap();
            assert_eq!(resolution.resolved_value, json!("source"));
        }

        #[tokio::test]
        async fn test_target_wins() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store);
            let outcome = resolver
                .resolve_batch(
                    &ctx(),
                    vec![candidate("rec-1", "price")],
                    ResolutionStrategy::TargetWins,
                )
                .await;

            let resolution = outcome.resolved[0].resolution.as_ref().unwrap();
            assert_eq!(resolution.resolved_value, json!("target"));
        }

        #[tokio::test]
        async fn test_newest_wins_picks_later_source() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store);
            let source_ts = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
            let target_ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            let outcome = resolver
                .resolve_batch(
                    &ctx(),
                    vec![candidate("rec-1", "price")
                        .with_timestamps(Some(source_ts), Some(target_ts))],
                    ResolutionStrategy::NewestWins,
                )
                .await;

            let resolution = outcome.resolved[0].resolution.as_ref().unwrap();
            assert_eq!(resolution.resolved_value, json!("source"));
        }

        #[tokio::test]
        async fn test_newest_wins_equal_timestamps_keep_target() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store);
            let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            let outcome = resolver
                .resolve_batch(
                    &ctx(),
                    vec![candidate("rec-1", "price").with_timestamps(Some(ts), Some(ts))],
                    ResolutionStrategy::NewestWins,
                )
                .await;

            let resolution = outcome.resolved[0].resolution.as_ref().unwrap();
            assert_eq!(resolution.resolved_value, json!("target"));
        }

        #[tokio::test]
        async fn test_newest_wins_missing_timestamp_keeps_source() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store);
            let outcome = resolver
                .resolve_batch(
                    &ctx(),
                    vec![candidate("rec-1", "price")],
                    ResolutionStrategy::NewestWins,
                )
                .await;

            let resolution = outcome.resolved[0].resolution.as_ref().unwrap();
            assert_eq!(resolution.resolved_value, json!("source"));
        }

        #[tokio::test]
        async fn test_manual_stays_pending() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store.clone());
            let context = ctx();
            let outcome = resolver
                .resolve_batch(
                    &context,
                    vec![candidate("rec-1", "price")],
                    ResolutionStrategy::Manual,
                )
                .await;

            assert!(outcome.resolved[0].is_pending());

            let pending = resolver.pending(context.integration_id).await.unwrap();
            assert_eq!(pending.len(), 1);
        }

        #[tokio::test]
        async fn test_apply_manual_resolves_once() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store);
            let context = ctx();
            let outcome = resolver
                .resolve_batch(
                    &context,
                    vec![candidate("rec-1", "price")],
                    ResolutionStrategy::Manual,
                )
                .await;
            let conflict_id = outcome.resolved[0].id;

            let resolution = ConflictResolution {
                strategy: ResolutionStrategy::Manual,
                resolved_value: json!("picked"),
                resolved_at: Utc::now(),
            };

            assert!(resolver
                .apply_manual(conflict_id, resolution.clone())
                .await
                .unwrap());
            // Second attempt finds no pending row.
            assert!(!resolver.apply_manual(conflict_id, resolution).await.unwrap());
            assert!(resolver
                .pending(context.integration_id)
                .await
                .unwrap()
                .is_empty());
        }

        #[tokio::test]
        async fn test_missing_identity_discarded() {
            let store = Arc::new(MemoryConflictStore::new());
            let resolver = ConflictResolver::new(store);
            let no_record = CandidateConflict {
                record_id: None,
                ..candidate("rec-1", "price")
            };
            let no_field = CandidateConflict {
                field: None,
                ..candidate("rec-2", "price")
            };
            let outcome = resolver
                .resolve_batch(
                    &ctx(),
                    vec![no_record, no_field, candidate("rec-3", "sku")],
                    ResolutionStrategy::SourceWins,
                )
                .await;

            assert_eq!(outcome.discarded, 2);
            assert_eq!(outcome.resolved.len(), 1);
            assert_eq!(outcome.resolved[0].record_id, "rec-3");
        }

        struct FlakyConflictStore {
            inner: MemoryConflictStore,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl ConflictStore for FlakyConflictStore {
            async fn insert_conflict(&self, conflict: &SyncConflict) -> Result<(), StoreError> {
                // Fail the first insert only.
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(StoreError::internal("disk full"));
                }
                self.inner.insert_conflict(conflict).await
            }

            async fn pending_conflicts(
                &self,
                integration_id: IntegrationId,
            ) -> Result<Vec<SyncConflict>, StoreError> {
                self.inner.pending_conflicts(integration_id).await
            }

            async fn resolve_conflict(
                &self,
                conflict_id: ConflictId,
                resolution: ConflictResolution,
            ) -> Result<bool, StoreError> {
                self.inner.resolve_conflict(conflict_id, resolution).await
            }
        }

        #[tokio::test]
        async fn test_persistence_failure_isolated() {
            let store = Arc::new(FlakyConflictStore {
                inner: MemoryConflictStore::new(),
                calls: AtomicUsize::new(0),
            });
            let resolver = ConflictResolver::new(store);
            let outcome = resolver
                .resolve_batch(
                    &ctx(),
                    vec![candidate("rec-1", "price"), candidate("rec-2", "price")],
                    ResolutionStrategy::SourceWins,
                )
                .await;

            assert_eq!(outcome.failures.len(), 1);
            assert_eq!(outcome.resolved.len(), 1);
            assert_eq!(outcome.resolved[0].record_id, "rec-2");
        }
    }
}
