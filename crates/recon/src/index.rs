//! Ownership index builder.
//!
//! Reads the three relational sources that embed storage references and
//! groups them by normalized key. The index is always the union of all
//! sources; orphan classification against anything less would wrongly flag
//! keys referenced only by one of the other tables.

use crate::error::ReconResult;
use darkroom_core::key::{Normalizer, StorageKey};
use darkroom_metadata::MetadataStore;
use darkroom_metadata::models::RecordKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// One relational row that references a storage key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipRecord {
    pub kind: RecordKind,
    pub record_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub key: StorageKey,
}

/// A relational row whose reference failed normalization.
///
/// Recorded rather than dropped: silently dropping the row would make the
/// file it points at look orphaned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnparsableReference {
    pub kind: RecordKind,
    pub record_id: Uuid,
    pub raw_reference: String,
    pub reason: String,
}

/// Mapping from normalized key to the set of rows referencing it.
#[derive(Clone, Debug, Default)]
pub struct OwnershipIndex {
    by_key: BTreeMap<StorageKey, Vec<OwnershipRecord>>,
    pub unparsable: Vec<UnparsableReference>,
}

impl OwnershipIndex {
    pub(crate) fn add(&mut self, record: OwnershipRecord) {
        let records = self.by_key.entry(record.key.clone()).or_default();
        // One row can only reference a key once.
        if !records
            .iter()
            .any(|r| r.kind == record.kind && r.record_id == record.record_id)
        {
            records.push(record);
        }
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn records_for(&self, key: &StorageKey) -> &[OwnershipRecord] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Referenced keys and their records, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&StorageKey, &[OwnershipRecord])> {
        self.by_key.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of distinct referenced keys.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Drop keys outside the given prefix.
    ///
    /// Used for scoped runs after the full-union index is built, so scoping
    /// never weakens the all-sources orphan check.
    pub fn retain_prefix(&mut self, prefix: &str) {
        self.by_key.retain(|key, _| key.as_str().starts_with(prefix));
    }
}

/// Builds the ownership index from the metadata store.
pub struct IndexBuilder {
    metadata: Arc<dyn MetadataStore>,
    normalizer: Normalizer,
}

impl IndexBuilder {
    pub fn new(metadata: Arc<dyn MetadataStore>, normalizer: Normalizer) -> Self {
        Self {
            metadata,
            normalizer,
        }
    }

    /// Query all three ownership sources and group rows by normalized key.
    ///
    /// Rows whose reference fails normalization are collected as
    /// [`UnparsableReference`] diagnostics and excluded from matching; they
    /// never abort the build.
    pub async fn build(&self) -> ReconResult<OwnershipIndex> {
        let mut index = OwnershipIndex::default();

        for photo in self.metadata.list_photos().await? {
            self.insert(
                &mut index,
                RecordKind::Photo,
                photo.photo_id,
                Some(photo.owner_id),
                &photo.image_ref,
            );
        }

        for selection in self.metadata.list_hero_selections().await? {
            self.insert(
                &mut index,
                RecordKind::HeroImage,
                selection.selection_id,
                Some(selection.owner_id),
                &selection.image_ref,
            );
        }

        for profile in self.metadata.list_profile_images().await? {
            self.insert(
                &mut index,
                RecordKind::ProfileImage,
                profile.user_id,
                Some(profile.user_id),
                &profile.image_ref,
            );
        }

        tracing::debug!(
            keys = index.len(),
            unparsable = index.unparsable.len(),
            "built ownership index"
        );
        Ok(index)
    }

    fn insert(
        &self,
        index: &mut OwnershipIndex,
        kind: RecordKind,
        record_id: Uuid,
        owner_id: Option<Uuid>,
        raw_reference: &str,
    ) {
        match self.normalizer.normalize(raw_reference) {
            Ok(key) => index.add(OwnershipRecord {
                kind,
                record_id,
                owner_id,
                key,
            }),
            Err(e) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    record_id = %record_id,
                    raw_reference = raw_reference,
                    error = %e,
                    "ownership row has unparsable storage reference"
                );
                index.unparsable.push(UnparsableReference {
                    kind,
                    record_id,
                    raw_reference: raw_reference.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}
