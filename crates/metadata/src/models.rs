//! Database models mapping to the ownership and ledger schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Ownership sources
// =============================================================================

/// Photo record. `image_ref` is the raw stored reference (URL or key) and
/// must go through the key normalizer before any comparison.
#[derive(Debug, Clone, FromRow)]
pub struct PhotoRow {
    pub photo_id: Uuid,
    pub owner_id: Uuid,
    pub image_ref: String,
    pub title: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Hero-banner selection. Several users may select the same shared hero
/// image, so multiple rows can reference one key.
#[derive(Debug, Clone, FromRow)]
pub struct HeroSelectionRow {
    pub selection_id: Uuid,
    pub owner_id: Uuid,
    pub image_ref: String,
    pub created_at: OffsetDateTime,
}

/// Profile-image pointer, one per user.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileImageRow {
    pub user_id: Uuid,
    pub image_ref: String,
    pub updated_at: OffsetDateTime,
}

/// Which ownership table a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    Photo,
    HeroImage,
    ProfileImage,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::HeroImage => "hero_image",
            Self::ProfileImage => "profile_image",
        }
    }
}

/// One row to remove when purging every reference to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDelete {
    pub kind: RecordKind,
    pub record_id: Uuid,
}

// =============================================================================
// Usage ledger
// =============================================================================

/// Append-only usage event row. Created once per upload/delete action and
/// never mutated or deleted.
#[derive(Debug, Clone, FromRow)]
pub struct UsageEventRow {
    pub event_id: Uuid,
    /// NULL for `global/` keys, which are not charged to any owner.
    pub owner_id: Option<Uuid>,
    pub object_key: String,
    pub size_bytes: i64,
    /// "upload" or "delete".
    pub operation: String,
    pub created_at: OffsetDateTime,
}
