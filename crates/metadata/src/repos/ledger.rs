//! Usage-ledger repository.

use crate::error::MetadataResult;
use crate::models::UsageEventRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository over the append-only usage-event table.
///
/// Append is the only mutation; events are never updated or deleted.
#[async_trait]
pub trait LedgerRepo: Send + Sync {
    /// Append one usage event.
    async fn append_usage_event(&self, event: &UsageEventRow) -> MetadataResult<()>;

    /// Events in ascending timestamp order, optionally for a single owner.
    async fn list_usage_events(&self, owner_id: Option<Uuid>)
    -> MetadataResult<Vec<UsageEventRow>>;
}
