//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{
    HeroSelectionRow, PhotoRow, ProfileImageRow, RecordKind, ReferenceDelete, UsageEventRow,
};
use crate::repos::{LedgerRepo, OwnershipRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: OwnershipRepo + LedgerRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    photo_id   TEXT PRIMARY KEY,
    owner_id   TEXT NOT NULL,
    image_ref  TEXT NOT NULL,
    title      TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_photos_owner ON photos(owner_id);

CREATE TABLE IF NOT EXISTS hero_selections (
    selection_id TEXT PRIMARY KEY,
    owner_id     TEXT NOT NULL,
    image_ref    TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_hero_selections_owner ON hero_selections(owner_id);

CREATE TABLE IF NOT EXISTS profile_images (
    user_id    TEXT PRIMARY KEY,
    image_ref  TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS usage_events (
    event_id   TEXT PRIMARY KEY,
    owner_id   TEXT,
    object_key TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    operation  TEXT NOT NULL CHECK (operation IN ('upload', 'delete')),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_events_owner ON usage_events(owner_id, created_at);
"#;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    #[allow(dead_code)] // Advisory only; SQLite lacks statement cancellation.
    query_timeout_secs: u64,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under test
            // concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout_secs,
        };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OwnershipRepo for SqliteStore {
    async fn create_photo(&self, photo: &PhotoRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO photos (photo_id, owner_id, image_ref, title, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(photo.photo_id)
        .bind(photo.owner_id)
        .bind(&photo.image_ref)
        .bind(&photo.title)
        .bind(photo.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_hero_selection(&self, selection: &HeroSelectionRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO hero_selections (selection_id, owner_id, image_ref, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(selection.selection_id)
        .bind(selection.owner_id)
        .bind(&selection.image_ref)
        .bind(selection.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_profile_image(&self, profile: &ProfileImageRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO profile_images (user_id, image_ref, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                 image_ref = excluded.image_ref,
                 updated_at = excluded.updated_at",
        )
        .bind(profile.user_id)
        .bind(&profile.image_ref)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_photos(&self) -> MetadataResult<Vec<PhotoRow>> {
        let rows = sqlx::query_as::<_, PhotoRow>(
            "SELECT photo_id, owner_id, image_ref, title, created_at FROM photos",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_hero_selections(&self) -> MetadataResult<Vec<HeroSelectionRow>> {
        let rows = sqlx::query_as::<_, HeroSelectionRow>(
            "SELECT selection_id, owner_id, image_ref, created_at FROM hero_selections",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_profile_images(&self) -> MetadataResult<Vec<ProfileImageRow>> {
        let rows = sqlx::query_as::<_, ProfileImageRow>(
            "SELECT user_id, image_ref, updated_at FROM profile_images",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_reference_unit(&self, unit: &[ReferenceDelete]) -> MetadataResult<u64> {
        if unit.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        for reference in unit {
            let query = match reference.kind {
                RecordKind::Photo => "DELETE FROM photos WHERE photo_id = ?",
                RecordKind::HeroImage => "DELETE FROM hero_selections WHERE selection_id = ?",
                RecordKind::ProfileImage => "DELETE FROM profile_images WHERE user_id = ?",
            };
            let result = sqlx::query(query)
                .bind(reference.record_id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        if deleted != unit.len() as u64 {
            // A missing row means the unit was built from a stale index;
            // roll back rather than delete a partial set.
            return Err(MetadataError::Constraint(format!(
                "reference unit expected {} rows, matched {}",
                unit.len(),
                deleted
            )));
        }

        tx.commit().await?;
        Ok(deleted)
    }
}

#[async_trait]
impl LedgerRepo for SqliteStore {
    async fn append_usage_event(&self, event: &UsageEventRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO usage_events
                 (event_id, owner_id, object_key, size_bytes, operation, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.event_id)
        .bind(event.owner_id)
        .bind(&event.object_key)
        .bind(event.size_bytes)
        .bind(&event.operation)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_usage_events(
        &self,
        owner_id: Option<Uuid>,
    ) -> MetadataResult<Vec<UsageEventRow>> {
        let rows = match owner_id {
            Some(owner_id) => {
                sqlx::query_as::<_, UsageEventRow>(
                    "SELECT event_id, owner_id, object_key, size_bytes, operation, created_at
                     FROM usage_events
                     WHERE owner_id = ?
                     ORDER BY created_at ASC, event_id ASC",
                )
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, UsageEventRow>(
                    "SELECT event_id, owner_id, object_key, size_bytes, operation, created_at
                     FROM usage_events
                     ORDER BY created_at ASC, event_id ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}
