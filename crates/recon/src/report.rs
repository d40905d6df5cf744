//! Audit reporting: aggregates a reconciliation into a serializable summary
//! with bounded sample lists and fixed-rule recommendations.

use crate::reconcile::{Discrepancy, DiscrepancyKind, Reconciliation};
use crate::scan::ObjectSize;
use darkroom_core::key::StorageKey;
use darkroom_core::usage::UsageTotals;
use serde::Serialize;
use time::OffsetDateTime;

/// Summary of the orphaned or matched keys of one run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct KindSummary {
    pub count: usize,
    /// Sum of the sizes the listing reported. Objects with unknown size are
    /// counted in `unknown_size_count` and contribute nothing here.
    pub known_bytes: u64,
    pub unknown_size_count: usize,
    /// At most `sample_limit` keys, in key order.
    pub sample_keys: Vec<StorageKey>,
}

/// Summary of phantom references.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PhantomSummary {
    /// Distinct keys referenced but missing from the blob store.
    pub count: usize,
    /// Relational rows across those keys.
    pub record_count: usize,
    pub sample_keys: Vec<StorageKey>,
}

/// One unparsable-reference diagnostic, flattened for the report.
#[derive(Clone, Debug, Serialize)]
pub struct UnparsableSample {
    pub kind: &'static str,
    pub record_id: String,
    pub raw_reference: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct UnparsableSummary {
    pub count: usize,
    pub samples: Vec<UnparsableSample>,
}

/// Human- and machine-readable outcome of one audit.
#[derive(Clone, Debug, Serialize)]
pub struct ReconciliationReport {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub orphaned: KindSummary,
    pub matched: KindSummary,
    pub phantom: PhantomSummary,
    pub unparsable: UnparsableSummary,
    /// Platform-wide usage folded from the ledger at audit time.
    pub usage: UsageTotals,
    pub recommendations: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.count == 0 && self.phantom.count == 0 && self.unparsable.count == 0
    }
}

/// Aggregate a reconciliation and the ledger's usage totals into a report.
///
/// Sample lists are capped at `sample_limit` keys each so a bucket with a
/// million entries cannot blow up the report payload; counts and byte totals
/// always cover everything.
pub fn summarize(
    reconciliation: &Reconciliation,
    usage: UsageTotals,
    sample_limit: usize,
) -> ReconciliationReport {
    let mut orphaned = KindSummary::default();
    let mut matched = KindSummary::default();
    let mut phantom = PhantomSummary::default();

    for discrepancy in &reconciliation.discrepancies {
        match discrepancy {
            Discrepancy::Orphaned { key, size } => {
                tally(&mut orphaned, key, *size, sample_limit);
            }
            Discrepancy::Matched { key, size, .. } => {
                tally(&mut matched, key, *size, sample_limit);
            }
            Discrepancy::Phantom { key, records } => {
                phantom.count += 1;
                phantom.record_count += records.len();
                if phantom.sample_keys.len() < sample_limit {
                    phantom.sample_keys.push(key.clone());
                }
            }
        }
    }

    let unparsable = UnparsableSummary {
        count: reconciliation.unparsable.len(),
        samples: reconciliation
            .unparsable
            .iter()
            .take(sample_limit)
            .map(|u| UnparsableSample {
                kind: u.kind.as_str(),
                record_id: u.record_id.to_string(),
                raw_reference: u.raw_reference.clone(),
                reason: u.reason.clone(),
            })
            .collect(),
    };

    let mut report = ReconciliationReport {
        generated_at: OffsetDateTime::now_utc(),
        orphaned,
        matched,
        phantom,
        unparsable,
        usage,
        recommendations: Vec::new(),
    };
    report.recommendations = recommend(&report);
    report
}

fn tally(summary: &mut KindSummary, key: &StorageKey, size: ObjectSize, sample_limit: usize) {
    summary.count += 1;
    match size {
        ObjectSize::Known(bytes) => summary.known_bytes += bytes,
        ObjectSize::Unknown => summary.unknown_size_count += 1,
    }
    if summary.sample_keys.len() < sample_limit {
        summary.sample_keys.push(key.clone());
    }
}

fn recommend(report: &ReconciliationReport) -> Vec<String> {
    let mut recommendations = Vec::new();

    if report.orphaned.count > 0 {
        recommendations.push(format!(
            "{} orphaned object(s) holding {} known byte(s) ({} with unknown size); \
             run cleanup in execute mode to delete them",
            report.orphaned.count, report.orphaned.known_bytes, report.orphaned.unknown_size_count
        ));
    }
    if report.phantom.count > 0 {
        recommendations.push(format!(
            "{} missing object(s) still referenced by {} record(s); \
             run cleanup in execute mode to purge the dangling references",
            report.phantom.count, report.phantom.record_count
        ));
    }
    if report.unparsable.count > 0 {
        recommendations.push(format!(
            "{} reference(s) could not be parsed and were excluded from matching; \
             fix the raw references before trusting orphan classification near them",
            report.unparsable.count
        ));
    }
    if recommendations.is_empty() {
        recommendations.push("storage and metadata are consistent; no action needed".to_string());
    }
    recommendations
}
