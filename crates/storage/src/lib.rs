//! Object storage abstraction and backends for Darkroom.
//!
//! This crate provides:
//! - The `ObjectStore` trait: the narrow blob-store interface the
//!   reconciliation core consumes (exists/head/get/put/delete plus paginated
//!   listing)
//! - A strict listing adapter (`ObjectEntry`) so unknown object sizes stay
//!   explicit instead of defaulting to zero
//! - Backend: local filesystem

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{
    ContinuationToken, ListingCapabilities, ListingOptions, ListingPage, ListingResume,
    ObjectEntry, ObjectMeta, ObjectStore,
};

use darkroom_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
