//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem backend rooted at `path`.
    Filesystem { path: PathBuf },
}

impl StorageConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem storage requires a non-empty path".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    Sqlite {
        path: PathBuf,
        /// Advisory query timeout in seconds.
        #[serde(default)]
        query_timeout_secs: Option<u64>,
    },
}

/// Reconciliation and garbage-collection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Public URL prefixes stripped when normalizing stored references
    /// (e.g. `https://cdn.example.com/storage/`).
    #[serde(default)]
    pub public_base_urls: Vec<String>,

    /// Maximum concurrent blob deletes during an execute run. Bounds the
    /// pressure a sweep puts on the blob store's API.
    #[serde(default = "default_max_concurrent_deletes")]
    pub max_concurrent_deletes: usize,

    /// Optional delay in milliseconds after each mutating action, for
    /// rate-limiting long sweeps.
    #[serde(default)]
    pub batch_delay_ms: Option<u64>,

    /// Maximum number of individual keys included per discrepancy kind in a
    /// reconciliation report. Keeps report payloads bounded.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,

    /// Listing page size used while scanning the blob inventory.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
}

fn default_max_concurrent_deletes() -> usize {
    8
}

fn default_sample_limit() -> usize {
    20
}

fn default_scan_page_size() -> usize {
    1000
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            public_base_urls: Vec::new(),
            max_concurrent_deletes: default_max_concurrent_deletes(),
            batch_delay_ms: None,
            sample_limit: default_sample_limit(),
            scan_page_size: default_scan_page_size(),
        }
    }
}
