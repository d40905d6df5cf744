#![allow(dead_code)]

pub mod mocks;

use darkroom_core::config::GcConfig;
use darkroom_recon::ReconContext;
use mocks::{MockBlobStore, MockMetadataStore};
use std::sync::Arc;

pub const CDN_BASE: &str = "https://cdn.example.com/storage/";

/// Stores plus a context wired over them, for end-to-end style tests.
pub struct Fixture {
    pub blob: Arc<MockBlobStore>,
    pub metadata: Arc<MockMetadataStore>,
    pub context: ReconContext,
}

pub fn fixture() -> Fixture {
    fixture_with(GcConfig {
        public_base_urls: vec![CDN_BASE.to_string()],
        ..GcConfig::default()
    })
}

pub fn fixture_with(config: GcConfig) -> Fixture {
    let blob = Arc::new(MockBlobStore::new());
    let metadata = Arc::new(MockMetadataStore::new());
    let context = ReconContext::new(blob.clone(), metadata.clone(), config);
    Fixture {
        blob,
        metadata,
        context,
    }
}
