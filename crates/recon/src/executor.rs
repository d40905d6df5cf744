//! GC executor: applies reconciliation discrepancies to the stores.
//!
//! The deletion policy is fail-safe in both directions. An orphan is only
//! deleted when its size is known and a fresh existence check confirms it is
//! still there; anything ambiguous is skipped and reported, never deleted.
//! Failures are isolated per discrepancy, so one bad object cannot stop a
//! sweep.

use crate::cancel::CancelFlag;
use crate::index::OwnershipRecord;
use crate::ledger::UsageLedger;
use crate::reconcile::{Discrepancy, Reconciliation};
use crate::scan::ObjectSize;
use darkroom_core::config::GcConfig;
use darkroom_core::key::StorageKey;
use darkroom_core::usage::{UsageEvent, UsageOp};
use darkroom_metadata::MetadataStore;
use darkroom_metadata::models::ReferenceDelete;
use darkroom_storage::{ObjectStore, StorageError};
use futures::{StreamExt, stream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Whether a run reports actions or performs them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GcMode {
    /// Report what an execute run would do. No mutating call is made in this
    /// mode, on either store.
    #[default]
    DryRun,
    Execute,
}

/// Why an action was skipped instead of performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The listing reported no size for the object. Deleting bytes that were
    /// never counted is the non-recoverable direction, so the object stays.
    UnknownSize,
    /// The pre-delete existence check failed; present and absent are
    /// indistinguishable, so the object stays.
    VerificationAmbiguous,
    /// The object disappeared between scan and execution.
    AlreadyAbsent,
    /// The missing object reappeared between scan and execution, so the
    /// references to it are live again.
    ObjectPresent,
    Cancelled,
}

/// The mutation a discrepancy calls for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum GcAction {
    DeleteBlob {
        size_bytes: Option<u64>,
    },
    PurgeReferences {
        record_count: usize,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct CompletedAction {
    pub key: StorageKey,
    pub action: GcAction,
}

#[derive(Clone, Debug, Serialize)]
pub struct FailedAction {
    pub key: StorageKey,
    pub action: GcAction,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkippedAction {
    pub key: StorageKey,
    pub action: GcAction,
    pub reason: SkipReason,
}

/// Outcome of one executor run, with every action accounted for.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionResult {
    pub mode: GcMode,
    pub succeeded: Vec<CompletedAction>,
    pub failed: Vec<FailedAction>,
    pub skipped: Vec<SkippedAction>,
}

impl ExecutionResult {
    fn new(mode: GcMode) -> Self {
        Self {
            mode,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Bytes freed (or, in dry-run, that would be freed) by blob deletions.
    pub fn bytes_reclaimed(&self) -> u64 {
        self.succeeded
            .iter()
            .filter_map(|a| match a.action {
                GcAction::DeleteBlob { size_bytes } => size_bytes,
                GcAction::PurgeReferences { .. } => None,
            })
            .sum()
    }
}

enum Outcome {
    Done(CompletedAction),
    Failed(FailedAction),
    Skipped(SkippedAction),
    /// Matched keys require no action.
    None,
}

/// Applies orphan deletions and phantom purges.
pub struct GcExecutor {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    ledger: UsageLedger,
    config: GcConfig,
}

impl GcExecutor {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        ledger: UsageLedger,
        config: GcConfig,
    ) -> Self {
        Self {
            storage,
            metadata,
            ledger,
            config,
        }
    }

    /// Apply every actionable discrepancy, bounded-concurrently.
    ///
    /// The cancellation flag is checked before each action starts; actions
    /// already in flight complete. Every actionable discrepancy lands in
    /// exactly one of the result's three buckets.
    #[tracing::instrument(skip_all, fields(mode = ?mode, discrepancies = reconciliation.discrepancies.len()))]
    pub async fn apply(
        &self,
        reconciliation: &Reconciliation,
        mode: GcMode,
        cancel: &CancelFlag,
    ) -> ExecutionResult {
        let concurrency = self.config.max_concurrent_deletes.max(1);
        let mut result = ExecutionResult::new(mode);

        let mut outcomes = stream::iter(reconciliation.discrepancies.iter())
            .map(|discrepancy| self.process_one(discrepancy, mode, cancel))
            .buffer_unordered(concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Done(a) => result.succeeded.push(a),
                Outcome::Failed(a) => result.failed.push(a),
                Outcome::Skipped(a) => result.skipped.push(a),
                Outcome::None => {}
            }
        }

        // Concurrent completion order is nondeterministic; sort for stable
        // reports.
        result.succeeded.sort_by(|a, b| a.key.cmp(&b.key));
        result.failed.sort_by(|a, b| a.key.cmp(&b.key));
        result.skipped.sort_by(|a, b| a.key.cmp(&b.key));

        tracing::info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            bytes_reclaimed = result.bytes_reclaimed(),
            "executor run complete"
        );
        result
    }

    async fn process_one(
        &self,
        discrepancy: &Discrepancy,
        mode: GcMode,
        cancel: &CancelFlag,
    ) -> Outcome {
        match discrepancy {
            Discrepancy::Matched { .. } => Outcome::None,
            Discrepancy::Orphaned { key, size } => {
                self.process_orphan(key, *size, mode, cancel).await
            }
            Discrepancy::Phantom { key, records } => {
                self.process_phantom(key, records, mode, cancel).await
            }
        }
    }

    async fn process_orphan(
        &self,
        key: &StorageKey,
        size: ObjectSize,
        mode: GcMode,
        cancel: &CancelFlag,
    ) -> Outcome {
        let action = GcAction::DeleteBlob {
            size_bytes: size.known(),
        };

        if cancel.is_cancelled() {
            return Outcome::Skipped(SkippedAction {
                key: key.clone(),
                action,
                reason: SkipReason::Cancelled,
            });
        }

        // Applies in dry-run too: the report must show the object as skipped,
        // not as deletable.
        if size.is_unknown() {
            tracing::warn!(key = %key, "orphan has unknown size, skipping deletion");
            return Outcome::Skipped(SkippedAction {
                key: key.clone(),
                action,
                reason: SkipReason::UnknownSize,
            });
        }

        if mode == GcMode::DryRun {
            return Outcome::Done(CompletedAction {
                key: key.clone(),
                action,
            });
        }

        match self.storage.exists(key.as_str()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(key = %key, "orphan already gone");
                return Outcome::Skipped(SkippedAction {
                    key: key.clone(),
                    action,
                    reason: SkipReason::AlreadyAbsent,
                });
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "existence check failed, skipping deletion");
                return Outcome::Skipped(SkippedAction {
                    key: key.clone(),
                    action,
                    reason: SkipReason::VerificationAmbiguous,
                });
            }
        }

        match self.storage.delete(key.as_str()).await {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                return Outcome::Skipped(SkippedAction {
                    key: key.clone(),
                    action,
                    reason: SkipReason::AlreadyAbsent,
                });
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "orphan deletion failed");
                return Outcome::Failed(FailedAction {
                    key: key.clone(),
                    action,
                    error: e.to_string(),
                });
            }
        }

        // Post-delete verification. A verification error here does not undo
        // the delete the backend acknowledged, so it only downgrades to a
        // warning.
        match self.storage.exists(key.as_str()).await {
            Ok(true) => {
                return Outcome::Failed(FailedAction {
                    key: key.clone(),
                    action,
                    error: "object still present after delete".to_string(),
                });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "post-delete verification failed");
            }
        }

        // Keep the ledger in step with the store. An append failure leaves
        // usage overstated until the next reconciliation, which is the safe
        // direction, so it does not fail the action.
        let event = UsageEvent {
            owner_id: key.owner_id(),
            key: key.clone(),
            size_bytes: size.known().unwrap_or(0),
            op: UsageOp::Delete,
            at: OffsetDateTime::now_utc(),
        };
        if let Err(e) = self.ledger.append(event).await {
            tracing::warn!(key = %key, error = %e, "failed to record delete usage event");
        }

        self.throttle().await;

        tracing::info!(key = %key, size_bytes = size.known(), "deleted orphaned object");
        Outcome::Done(CompletedAction {
            key: key.clone(),
            action,
        })
    }

    async fn process_phantom(
        &self,
        key: &StorageKey,
        records: &[OwnershipRecord],
        mode: GcMode,
        cancel: &CancelFlag,
    ) -> Outcome {
        let action = GcAction::PurgeReferences {
            record_count: records.len(),
        };

        if cancel.is_cancelled() {
            return Outcome::Skipped(SkippedAction {
                key: key.clone(),
                action,
                reason: SkipReason::Cancelled,
            });
        }

        if mode == GcMode::DryRun {
            return Outcome::Done(CompletedAction {
                key: key.clone(),
                action,
            });
        }

        // The scan snapshot may predate an upload; re-check the store before
        // destroying references. Same authoritative-check rule as the orphan
        // path, mirrored.
        match self.storage.exists(key.as_str()).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!(key = %key, "object reappeared, keeping its references");
                return Outcome::Skipped(SkippedAction {
                    key: key.clone(),
                    action,
                    reason: SkipReason::ObjectPresent,
                });
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "existence check failed, keeping references");
                return Outcome::Skipped(SkippedAction {
                    key: key.clone(),
                    action,
                    reason: SkipReason::VerificationAmbiguous,
                });
            }
        }

        let unit: Vec<ReferenceDelete> = records
            .iter()
            .map(|r| ReferenceDelete {
                kind: r.kind,
                record_id: r.record_id,
            })
            .collect();

        match self.metadata.delete_reference_unit(&unit).await {
            Ok(removed) => {
                self.throttle().await;
                tracing::info!(key = %key, removed, "purged dangling references");
                Outcome::Done(CompletedAction {
                    key: key.clone(),
                    action,
                })
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "reference purge failed");
                Outcome::Failed(FailedAction {
                    key: key.clone(),
                    action,
                    error: e.to_string(),
                })
            }
        }
    }

    async fn throttle(&self) {
        if let Some(delay_ms) = self.config.batch_delay_ms {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}
