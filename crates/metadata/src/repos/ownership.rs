//! Ownership repository.
//!
//! Read access to the three tables that embed storage references (photos,
//! hero selections, profile-image pointers) plus the single write operation
//! the GC executor needs: purging every reference to one key as a unit.

use crate::error::MetadataResult;
use crate::models::{HeroSelectionRow, PhotoRow, ProfileImageRow, ReferenceDelete};
use async_trait::async_trait;

/// Repository over the relational ownership sources.
#[async_trait]
pub trait OwnershipRepo: Send + Sync {
    /// Create a photo record.
    async fn create_photo(&self, photo: &PhotoRow) -> MetadataResult<()>;

    /// Create a hero-banner selection.
    async fn create_hero_selection(&self, selection: &HeroSelectionRow) -> MetadataResult<()>;

    /// Create or replace a user's profile-image pointer.
    async fn set_profile_image(&self, profile: &ProfileImageRow) -> MetadataResult<()>;

    /// All photo records.
    async fn list_photos(&self) -> MetadataResult<Vec<PhotoRow>>;

    /// All hero-banner selections.
    async fn list_hero_selections(&self) -> MetadataResult<Vec<HeroSelectionRow>>;

    /// All profile-image pointers.
    async fn list_profile_images(&self) -> MetadataResult<Vec<ProfileImageRow>>;

    /// Delete every row in `unit` inside a single transaction and return the
    /// number of rows removed.
    ///
    /// The unit is all ownership records referencing one storage key; either
    /// all of them go or none do, so a key is never left half-referenced.
    async fn delete_reference_unit(&self, unit: &[ReferenceDelete]) -> MetadataResult<u64>;
}
