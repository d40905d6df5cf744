//! Usage-ledger event types.
//!
//! The ledger is append-only: the upload/delete pipeline writes one event
//! per action and nothing ever mutates or removes them. Aggregate usage is
//! derived by folding the event sequence (see `darkroom-recon`), never by
//! re-scanning the blob store.

use crate::key::StorageKey;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Operation recorded by a usage event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageOp {
    Upload,
    Delete,
}

impl UsageOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(Self::Upload),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One append-only upload/delete event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageEvent {
    /// Owner the bytes are accounted to. `None` for `global/` keys, which
    /// are not charged against any single owner's quota.
    pub owner_id: Option<Uuid>,
    pub key: StorageKey,
    pub size_bytes: u64,
    pub op: UsageOp,
    pub at: OffsetDateTime,
}

/// Aggregate usage derived from the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_bytes: u64,
    pub total_files: u64,
}
