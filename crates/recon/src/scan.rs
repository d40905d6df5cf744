//! Blob inventory scanner.
//!
//! Streams the blob store's listing into [`BlobRecord`]s. A listing failure
//! is fatal to the run (no ground truth), while a missing per-object size
//! degrades only that record to [`ObjectSize::Unknown`].

use crate::error::{ReconError, ReconResult};
use darkroom_core::key::{Normalizer, StorageKey};
use darkroom_storage::{ListingOptions, ObjectStore};
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

/// Size of one stored object as reported by the blob store.
///
/// `Unknown` is a distinct state, never coerced to zero: folding an unknown
/// size into a byte total as 0 would silently understate usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectSize {
    Known(u64),
    Unknown,
}

impl ObjectSize {
    pub fn known(&self) -> Option<u64> {
        match self {
            Self::Known(n) => Some(*n),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<Option<u64>> for ObjectSize {
    fn from(size: Option<u64>) -> Self {
        match size {
            Some(n) => Self::Known(n),
            None => Self::Unknown,
        }
    }
}

/// One object in the blob inventory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobRecord {
    pub key: StorageKey,
    pub size: ObjectSize,
}

/// Snapshot of everything the blob store holds (under one prefix).
#[derive(Clone, Debug, Default)]
pub struct BlobInventory {
    records: BTreeMap<StorageKey, ObjectSize>,
}

impl BlobInventory {
    pub fn insert(&mut self, record: BlobRecord) {
        self.records.insert(record.key, record.size);
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn size_of(&self, key: &StorageKey) -> Option<ObjectSize> {
        self.records.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keys and sizes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&StorageKey, ObjectSize)> {
        self.records.iter().map(|(k, s)| (k, *s))
    }
}

impl FromIterator<BlobRecord> for BlobInventory {
    fn from_iter<I: IntoIterator<Item = BlobRecord>>(iter: I) -> Self {
        let mut inventory = Self::default();
        for record in iter {
            inventory.insert(record);
        }
        inventory
    }
}

/// Lazily paginating scanner over the blob store's listing API.
///
/// Each call to [`scan`](Self::scan) starts a fresh listing; there is no
/// shared cursor state between scans.
pub struct Scanner {
    store: Arc<dyn ObjectStore>,
    normalizer: Normalizer,
    page_size: usize,
}

impl Scanner {
    pub fn new(store: Arc<dyn ObjectStore>, normalizer: Normalizer, page_size: usize) -> Self {
        Self {
            store,
            normalizer,
            page_size,
        }
    }

    /// Stream blob records, optionally restricted to a key prefix.
    ///
    /// The first listing error ends the stream: a partial inventory would
    /// make live objects look orphaned downstream.
    pub fn scan<'a>(
        &'a self,
        prefix: Option<&str>,
    ) -> Pin<Box<dyn Stream<Item = ReconResult<BlobRecord>> + Send + 'a>> {
        let prefix = prefix.unwrap_or("").to_string();
        let options = ListingOptions::new(self.page_size);

        Box::pin(async_stream::try_stream! {
            let mut pages = self.store.list_pages(&prefix, options, None);
            while let Some(page) = pages.next().await {
                let page = page.map_err(|source| ReconError::ScanFailure { source })?;
                for entry in page.entries {
                    // Listed keys are raw store keys, not references; they
                    // are validated without the URL-stripping decode pass so
                    // a literal `%` in an object name survives. A key the
                    // validator rejects means the inventory itself is
                    // unusable; fail loudly.
                    let key = self.normalizer.normalize_listed(&entry.key).map_err(|e| {
                        ReconError::InvalidListing(format!(
                            "listing key {:?} is not a valid storage key: {e}",
                            entry.key
                        ))
                    })?;

                    let size = ObjectSize::from(entry.size);
                    if size.is_unknown() {
                        tracing::debug!(key = %key, "listing returned no size, recording as unknown");
                    }

                    yield BlobRecord { key, size };
                }
            }
        })
    }

    /// Run a full scan and collect it into an inventory snapshot.
    pub async fn collect(&self, prefix: Option<&str>) -> ReconResult<BlobInventory> {
        let mut inventory = BlobInventory::default();
        let mut records = self.scan(prefix);
        while let Some(record) = records.next().await {
            inventory.insert(record?);
        }
        tracing::debug!(
            objects = inventory.len(),
            prefix = prefix.unwrap_or(""),
            "collected blob inventory"
        );
        Ok(inventory)
    }
}
