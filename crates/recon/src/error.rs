//! Reconciliation error types.

use darkroom_metadata::MetadataError;
use darkroom_storage::StorageError;
use thiserror::Error;

/// Reconciliation run errors.
///
/// Only listing-level failures are fatal: without a complete blob inventory
/// there is no ground truth to reconcile against. Item-level problems
/// (malformed references, individual delete failures) are captured in the
/// run's result structures instead of propagating here.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("blob store listing failed: {source}")]
    ScanFailure {
        #[source]
        source: StorageError,
    },

    #[error("unusable listing entry: {0}")]
    InvalidListing(String),

    #[error("metadata query failed: {0}")]
    Metadata(#[from] MetadataError),
}

/// Result type for reconciliation operations.
pub type ReconResult<T> = std::result::Result<T, ReconError>;
