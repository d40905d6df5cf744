//! Metadata store abstraction and implementations for Darkroom.
//!
//! This crate provides the relational side of reconciliation:
//! - The three ownership sources (photos, hero selections, profile images)
//! - The append-only usage-event ledger table
//! - A combined `MetadataStore` trait with an SQLite implementation

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{LedgerRepo, OwnershipRepo};
pub use store::{MetadataStore, SqliteStore};

use darkroom_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
