//! Usage ledger: append events and derive current usage by folding them.

use crate::error::ReconResult;
use crate::scan::BlobInventory;
use darkroom_core::key::{Normalizer, StorageKey};
use darkroom_core::usage::{UsageEvent, UsageOp, UsageTotals};
use darkroom_metadata::MetadataStore;
use darkroom_metadata::models::UsageEventRow;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Append-side and fold-side access to the usage event table.
pub struct UsageLedger {
    metadata: Arc<dyn MetadataStore>,
    normalizer: Normalizer,
}

impl UsageLedger {
    pub fn new(metadata: Arc<dyn MetadataStore>, normalizer: Normalizer) -> Self {
        Self {
            metadata,
            normalizer,
        }
    }

    /// Record one upload or delete event.
    pub async fn append(&self, event: UsageEvent) -> ReconResult<()> {
        let row = UsageEventRow {
            event_id: Uuid::new_v4(),
            owner_id: event.owner_id,
            object_key: event.key.as_str().to_string(),
            size_bytes: event.size_bytes as i64,
            operation: event.op.as_str().to_string(),
            created_at: event.at,
        };
        self.metadata.append_usage_event(&row).await?;
        tracing::debug!(
            key = %event.key,
            op = event.op.as_str(),
            size_bytes = event.size_bytes,
            "appended usage event"
        );
        Ok(())
    }

    /// Current usage derived by folding event history, for one owner or for
    /// the whole platform when `owner_id` is absent.
    ///
    /// The fold keeps one final state per key (does the last event leave it
    /// present, and at what size) so out-of-order histories and duplicate
    /// deletes cannot drive a total negative. When an inventory snapshot is
    /// provided, keys the blob store no longer holds are excluded even if
    /// the ledger says they exist; the ledger records intent, the store is
    /// ground truth.
    pub async fn current_usage(
        &self,
        owner_id: Option<Uuid>,
        inventory: Option<&BlobInventory>,
    ) -> ReconResult<UsageTotals> {
        let rows = self.metadata.list_usage_events(owner_id).await?;
        Ok(self.fold(&rows, inventory))
    }

    fn fold(&self, rows: &[UsageEventRow], inventory: Option<&BlobInventory>) -> UsageTotals {
        struct KeyState {
            exists: bool,
            size_bytes: u64,
        }

        let mut ordered: Vec<&UsageEventRow> = rows.iter().collect();
        ordered.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        let mut by_key: BTreeMap<StorageKey, KeyState> = BTreeMap::new();
        for row in ordered {
            let key = match self.normalizer.normalize(&row.object_key) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(
                        event_id = %row.event_id,
                        object_key = row.object_key,
                        error = %e,
                        "usage event has unparsable key, excluded from fold"
                    );
                    continue;
                }
            };
            let op = match UsageOp::parse(&row.operation) {
                Some(op) => op,
                None => {
                    tracing::warn!(
                        event_id = %row.event_id,
                        operation = row.operation,
                        "usage event has unknown operation, excluded from fold"
                    );
                    continue;
                }
            };
            match op {
                UsageOp::Upload => {
                    by_key.insert(
                        key,
                        KeyState {
                            exists: true,
                            size_bytes: row.size_bytes.max(0) as u64,
                        },
                    );
                }
                UsageOp::Delete => {
                    by_key.insert(
                        key,
                        KeyState {
                            exists: false,
                            size_bytes: 0,
                        },
                    );
                }
            }
        }

        let mut totals = UsageTotals::default();
        for (key, state) in &by_key {
            if !state.exists {
                continue;
            }
            if let Some(inventory) = inventory {
                if !inventory.contains(key) {
                    tracing::debug!(key = %key, "ledger says present, store disagrees; excluded");
                    continue;
                }
            }
            totals.total_files += 1;
            totals.total_bytes += state.size_bytes;
        }
        totals
    }
}
