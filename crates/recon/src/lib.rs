//! Storage reconciliation and garbage collection for Darkroom.
//!
//! Compares three views of the same data (the blob store's listing, the
//! relational ownership tables, the append-only usage ledger) and resolves
//! the differences: orphaned blobs get deleted, dangling references get
//! purged, and derived usage is folded from the ledger rather than trusted
//! from counters.
//!
//! [`ReconContext`] is the entry point; it wires the stores together and
//! exposes the audit, cleanup, and usage operations.

pub mod cancel;
pub mod error;
pub mod executor;
pub mod index;
pub mod ledger;
pub mod reconcile;
pub mod report;
pub mod scan;

pub use cancel::CancelFlag;
pub use error::{ReconError, ReconResult};
pub use executor::{ExecutionResult, GcExecutor, GcMode, SkipReason};
pub use index::{IndexBuilder, OwnershipIndex};
pub use ledger::UsageLedger;
pub use reconcile::{Discrepancy, DiscrepancyKind, Reconciliation, reconcile};
pub use report::{ReconciliationReport, summarize};
pub use scan::{BlobInventory, BlobRecord, ObjectSize, Scanner};

use darkroom_core::config::GcConfig;
use darkroom_core::key::Normalizer;
use darkroom_core::usage::{UsageEvent, UsageTotals};
use darkroom_metadata::MetadataStore;
use darkroom_storage::ObjectStore;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one cleanup run: what was found plus what was done about it.
#[derive(Clone, Debug)]
pub struct CleanupOutcome {
    pub report: ReconciliationReport,
    pub execution: ExecutionResult,
}

/// Wires the blob store and metadata store into the reconciliation
/// operations.
///
/// Holds no per-run state; every audit or cleanup takes fresh snapshots, so
/// one context can serve many runs.
pub struct ReconContext {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    normalizer: Normalizer,
    config: GcConfig,
}

impl ReconContext {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        config: GcConfig,
    ) -> Self {
        let normalizer = Normalizer::new(config.public_base_urls.iter().cloned());
        Self {
            storage,
            metadata,
            normalizer,
            config,
        }
    }

    /// Snapshot both sides, optionally scoped to a key prefix.
    ///
    /// The ownership index is always built over every source and only then
    /// narrowed to the prefix; scoping must never weaken the all-sources
    /// orphan check.
    async fn snapshot(
        &self,
        scope: Option<&str>,
    ) -> ReconResult<(BlobInventory, OwnershipIndex)> {
        let scanner = Scanner::new(
            self.storage.clone(),
            self.normalizer.clone(),
            self.config.scan_page_size,
        );
        let builder = IndexBuilder::new(self.metadata.clone(), self.normalizer.clone());

        let (inventory, index) = tokio::join!(scanner.collect(scope), builder.build());
        let inventory = inventory?;
        let mut index = index?;

        if let Some(prefix) = scope {
            index.retain_prefix(prefix);
        }
        Ok((inventory, index))
    }

    /// Read-only reconciliation: snapshot, classify, report.
    #[tracing::instrument(skip(self))]
    pub async fn run_audit(&self, scope: Option<&str>) -> ReconResult<ReconciliationReport> {
        let (inventory, index) = self.snapshot(scope).await?;
        let reconciliation = reconcile(&inventory, &index);
        let usage = self.platform_usage(scope, &inventory).await?;
        Ok(summarize(&reconciliation, usage, self.config.sample_limit))
    }

    /// Reconcile and apply: delete orphans, purge dangling references.
    ///
    /// In [`GcMode::DryRun`] (the default) nothing is mutated and the result
    /// shows what an execute run would do.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn run_cleanup(
        &self,
        scope: Option<&str>,
        mode: GcMode,
        cancel: &CancelFlag,
    ) -> ReconResult<CleanupOutcome> {
        let (inventory, index) = self.snapshot(scope).await?;
        let reconciliation = reconcile(&inventory, &index);
        let usage = self.platform_usage(scope, &inventory).await?;
        let report = summarize(&reconciliation, usage, self.config.sample_limit);

        let executor = GcExecutor::new(
            self.storage.clone(),
            self.metadata.clone(),
            self.ledger(),
            self.config.clone(),
        );
        let execution = executor.apply(&reconciliation, mode, cancel).await;

        Ok(CleanupOutcome { report, execution })
    }

    /// Record one upload or delete event in the usage ledger.
    pub async fn record_usage(&self, event: UsageEvent) -> ReconResult<()> {
        self.ledger().append(event).await
    }

    /// Current usage folded from the ledger, for one owner or for the whole
    /// platform when `owner_id` is absent.
    ///
    /// With `cross_check` set, a fresh blob inventory is taken and keys the
    /// store no longer holds are excluded from the totals.
    #[tracing::instrument(skip(self))]
    pub async fn current_usage(
        &self,
        owner_id: Option<Uuid>,
        cross_check: bool,
    ) -> ReconResult<UsageTotals> {
        let ledger = self.ledger();
        if cross_check {
            let scanner = Scanner::new(
                self.storage.clone(),
                self.normalizer.clone(),
                self.config.scan_page_size,
            );
            let inventory = scanner.collect(None).await?;
            ledger.current_usage(owner_id, Some(&inventory)).await
        } else {
            ledger.current_usage(owner_id, None).await
        }
    }

    /// Platform-wide usage folded from the full ledger, for the audit
    /// report. The inventory cross-check only applies to full runs; a
    /// scoped inventory would wrongly exclude live keys outside the scope.
    async fn platform_usage(
        &self,
        scope: Option<&str>,
        inventory: &BlobInventory,
    ) -> ReconResult<UsageTotals> {
        let inventory = if scope.is_none() {
            Some(inventory)
        } else {
            None
        };
        self.ledger().current_usage(None, inventory).await
    }

    fn ledger(&self) -> UsageLedger {
        UsageLedger::new(self.metadata.clone(), self.normalizer.clone())
    }
}
