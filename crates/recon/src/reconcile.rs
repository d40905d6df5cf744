//! The reconciler: pure set reconciliation between the blob inventory and
//! the ownership index.
//!
//! No side effects here; given the same two snapshots the output is
//! identical, which is what makes the executor's dry-run/execute split safe.

use crate::index::{OwnershipIndex, OwnershipRecord, UnparsableReference};
use crate::scan::{BlobInventory, ObjectSize};
use darkroom_core::key::StorageKey;

/// Classification of one key across the two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscrepancyKind {
    Orphaned,
    Phantom,
    Matched,
}

/// One classified key.
///
/// Every key appearing in either snapshot lands in exactly one variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Discrepancy {
    /// In the blob store, referenced by nothing. Candidate for deletion.
    Orphaned { key: StorageKey, size: ObjectSize },

    /// Referenced by relational rows but absent from the blob store. The
    /// records are the full reference set for the key and are only ever
    /// purged together.
    Phantom {
        key: StorageKey,
        records: Vec<OwnershipRecord>,
    },

    /// Present on both sides. Counted for reporting, never actioned.
    Matched {
        key: StorageKey,
        size: ObjectSize,
        reference_count: usize,
    },
}

impl Discrepancy {
    pub fn kind(&self) -> DiscrepancyKind {
        match self {
            Self::Orphaned { .. } => DiscrepancyKind::Orphaned,
            Self::Phantom { .. } => DiscrepancyKind::Phantom,
            Self::Matched { .. } => DiscrepancyKind::Matched,
        }
    }

    pub fn key(&self) -> &StorageKey {
        match self {
            Self::Orphaned { key, .. } | Self::Phantom { key, .. } | Self::Matched { key, .. } => {
                key
            }
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Clone, Debug, Default)]
pub struct Reconciliation {
    /// Classified keys, in key order within each classification pass.
    pub discrepancies: Vec<Discrepancy>,
    /// Rows excluded from matching because their reference would not parse.
    pub unparsable: Vec<UnparsableReference>,
}

impl Reconciliation {
    pub fn of_kind(&self, kind: DiscrepancyKind) -> impl Iterator<Item = &Discrepancy> {
        self.discrepancies.iter().filter(move |d| d.kind() == kind)
    }

    pub fn count(&self, kind: DiscrepancyKind) -> usize {
        self.of_kind(kind).count()
    }
}

/// Classify every key from both snapshots.
///
/// `Orphaned = blob − owned`, `Phantom = owned − blob`,
/// `Matched = blob ∩ owned`. The index passed in must be the union of all
/// ownership sources; a key counts as orphaned only when absent from that
/// entire union.
pub fn reconcile(inventory: &BlobInventory, index: &OwnershipIndex) -> Reconciliation {
    let mut discrepancies = Vec::new();

    for (key, size) in inventory.iter() {
        let records = index.records_for(key);
        if records.is_empty() {
            discrepancies.push(Discrepancy::Orphaned {
                key: key.clone(),
                size,
            });
        } else {
            discrepancies.push(Discrepancy::Matched {
                key: key.clone(),
                size,
                reference_count: records.len(),
            });
        }
    }

    for (key, records) in index.iter() {
        if !inventory.contains(key) {
            discrepancies.push(Discrepancy::Phantom {
                key: key.clone(),
                records: records.to_vec(),
            });
        }
    }

    tracing::debug!(
        orphaned = discrepancies
            .iter()
            .filter(|d| d.kind() == DiscrepancyKind::Orphaned)
            .count(),
        phantom = discrepancies
            .iter()
            .filter(|d| d.kind() == DiscrepancyKind::Phantom)
            .count(),
        matched = discrepancies
            .iter()
            .filter(|d| d.kind() == DiscrepancyKind::Matched)
            .count(),
        "reconciled blob inventory against ownership index"
    );

    Reconciliation {
        discrepancies,
        unparsable: index.unparsable.clone(),
    }
}
