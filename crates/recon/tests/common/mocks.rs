//! In-memory store doubles with failure injection and call counters.

use async_trait::async_trait;
use bytes::Bytes;
use darkroom_metadata::error::{MetadataError, MetadataResult};
use darkroom_metadata::models::{
    HeroSelectionRow, PhotoRow, ProfileImageRow, RecordKind, ReferenceDelete, UsageEventRow,
};
use darkroom_metadata::repos::{LedgerRepo, OwnershipRepo};
use darkroom_metadata::store::MetadataStore;
use darkroom_storage::error::{StorageError, StorageResult};
use darkroom_storage::traits::{
    ListingCapabilities, ListingOptions, ListingPage, ListingResume, ObjectEntry, ObjectMeta,
    ObjectStore,
};
use futures::{Stream, stream};
use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

fn injected(what: &str) -> StorageError {
    StorageError::Backend(format!("injected {what} failure").into())
}

/// Object store double backed by a key-to-size map.
#[derive(Default)]
pub struct MockBlobStore {
    objects: Mutex<BTreeMap<String, Option<u64>>>,
    fail_listing: AtomicBool,
    fail_exists: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
    pub exists_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, size: Option<u64>) {
        self.objects.lock().unwrap().insert(key.to_string(), size);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Make every listing page fail.
    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    /// Make existence checks for `key` fail.
    pub fn fail_exists_for(&self, key: &str) {
        self.fail_exists.lock().unwrap().insert(key.to_string());
    }

    /// Make deletes of `key` fail.
    pub fn fail_delete_for(&self, key: &str) {
        self.fail_delete.lock().unwrap().insert(key.to_string());
    }

    pub fn mutation_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst) + self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MockBlobStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exists.lock().unwrap().contains(key) {
            return Err(injected("exists"));
        }
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        match self.objects.lock().unwrap().get(key) {
            Some(size) => Ok(ObjectMeta {
                size: *size,
                last_modified: None,
            }),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        match self.objects.lock().unwrap().get(key) {
            Some(size) => Ok(Bytes::from(vec![0u8; size.unwrap_or(0) as usize])),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Some(data.len() as u64));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.lock().unwrap().contains(key) {
            return Err(injected("delete"));
        }
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }

    fn listing_capabilities(&self) -> ListingCapabilities {
        ListingCapabilities { resumable: false }
    }

    fn list_pages<'a>(
        &'a self,
        prefix: &str,
        options: ListingOptions,
        resume: Option<ListingResume>,
    ) -> Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>> {
        if resume.is_some() {
            return Box::pin(stream::iter(vec![Err(StorageError::ListingNotResumable)]));
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Box::pin(stream::iter(vec![Err(injected("listing"))]));
        }

        let entries: Vec<ObjectEntry> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, size)| ObjectEntry {
                key: key.clone(),
                size: *size,
            })
            .collect();

        let pages: Vec<StorageResult<ListingPage>> = entries
            .chunks(options.normalized_page_size())
            .map(|chunk| {
                Ok(ListingPage {
                    entries: chunk.to_vec(),
                    next_token: None,
                })
            })
            .collect();
        Box::pin(stream::iter(pages))
    }
}

/// Metadata store double backed by row vectors.
#[derive(Default)]
pub struct MockMetadataStore {
    photos: Mutex<Vec<PhotoRow>>,
    hero_selections: Mutex<Vec<HeroSelectionRow>>,
    profile_images: Mutex<Vec<ProfileImageRow>>,
    events: Mutex<Vec<UsageEventRow>>,
    fail_delete_unit: AtomicBool,
    pub delete_unit_calls: AtomicUsize,
}

impl MockMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_photo(&self, owner_id: Uuid, image_ref: &str) -> Uuid {
        let photo_id = Uuid::new_v4();
        self.photos.lock().unwrap().push(PhotoRow {
            photo_id,
            owner_id,
            image_ref: image_ref.to_string(),
            title: None,
            created_at: time::OffsetDateTime::now_utc(),
        });
        photo_id
    }

    pub fn add_hero_selection(&self, owner_id: Uuid, image_ref: &str) -> Uuid {
        let selection_id = Uuid::new_v4();
        self.hero_selections.lock().unwrap().push(HeroSelectionRow {
            selection_id,
            owner_id,
            image_ref: image_ref.to_string(),
            created_at: time::OffsetDateTime::now_utc(),
        });
        selection_id
    }

    pub fn add_profile_image(&self, user_id: Uuid, image_ref: &str) {
        self.profile_images.lock().unwrap().push(ProfileImageRow {
            user_id,
            image_ref: image_ref.to_string(),
            updated_at: time::OffsetDateTime::now_utc(),
        });
    }

    pub fn add_event(&self, row: UsageEventRow) {
        self.events.lock().unwrap().push(row);
    }

    pub fn events(&self) -> Vec<UsageEventRow> {
        self.events.lock().unwrap().clone()
    }

    pub fn photo_count(&self) -> usize {
        self.photos.lock().unwrap().len()
    }

    pub fn hero_selection_count(&self) -> usize {
        self.hero_selections.lock().unwrap().len()
    }

    /// Make every reference purge fail with a constraint violation.
    pub fn fail_delete_unit(&self) {
        self.fail_delete_unit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OwnershipRepo for MockMetadataStore {
    async fn create_photo(&self, photo: &PhotoRow) -> MetadataResult<()> {
        self.photos.lock().unwrap().push(photo.clone());
        Ok(())
    }

    async fn create_hero_selection(&self, selection: &HeroSelectionRow) -> MetadataResult<()> {
        self.hero_selections.lock().unwrap().push(selection.clone());
        Ok(())
    }

    async fn set_profile_image(&self, profile: &ProfileImageRow) -> MetadataResult<()> {
        let mut rows = self.profile_images.lock().unwrap();
        rows.retain(|row| row.user_id != profile.user_id);
        rows.push(profile.clone());
        Ok(())
    }

    async fn list_photos(&self) -> MetadataResult<Vec<PhotoRow>> {
        Ok(self.photos.lock().unwrap().clone())
    }

    async fn list_hero_selections(&self) -> MetadataResult<Vec<HeroSelectionRow>> {
        Ok(self.hero_selections.lock().unwrap().clone())
    }

    async fn list_profile_images(&self) -> MetadataResult<Vec<ProfileImageRow>> {
        Ok(self.profile_images.lock().unwrap().clone())
    }

    async fn delete_reference_unit(&self, unit: &[ReferenceDelete]) -> MetadataResult<u64> {
        self.delete_unit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete_unit.load(Ordering::SeqCst) {
            return Err(MetadataError::Constraint(
                "injected delete-unit failure".to_string(),
            ));
        }

        let mut photos = self.photos.lock().unwrap();
        let mut heroes = self.hero_selections.lock().unwrap();
        let mut profiles = self.profile_images.lock().unwrap();

        // All-or-nothing, like the transactional implementation: verify the
        // whole unit is present before removing anything.
        let present = unit
            .iter()
            .filter(|r| match r.kind {
                RecordKind::Photo => photos.iter().any(|p| p.photo_id == r.record_id),
                RecordKind::HeroImage => heroes.iter().any(|h| h.selection_id == r.record_id),
                RecordKind::ProfileImage => profiles.iter().any(|p| p.user_id == r.record_id),
            })
            .count();
        if present != unit.len() {
            return Err(MetadataError::Constraint(format!(
                "reference unit is stale: {present} of {} rows present",
                unit.len()
            )));
        }

        for r in unit {
            match r.kind {
                RecordKind::Photo => photos.retain(|p| p.photo_id != r.record_id),
                RecordKind::HeroImage => heroes.retain(|h| h.selection_id != r.record_id),
                RecordKind::ProfileImage => profiles.retain(|p| p.user_id != r.record_id),
            }
        }
        Ok(unit.len() as u64)
    }
}

#[async_trait]
impl LedgerRepo for MockMetadataStore {
    async fn append_usage_event(&self, event: &UsageEventRow) -> MetadataResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn list_usage_events(
        &self,
        owner_id: Option<Uuid>,
    ) -> MetadataResult<Vec<UsageEventRow>> {
        let mut rows: Vec<UsageEventRow> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|row| owner_id.is_none() || row.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.created_at);
        Ok(rows)
    }
}

#[async_trait]
impl MetadataStore for MockMetadataStore {
    async fn migrate(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}
