//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ListingCapabilities, ListingOptions, ListingPage, ListingResume, ObjectEntry, ObjectMeta,
    ObjectStore,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Prefix used for in-progress atomic writes; hidden from listings.
const TMP_PREFIX: &str = ".tmp-";

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key, with path traversal protection.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        // Every component must be a plain name (no roots, no `.`/`..`).
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        Ok(self.root.join(key))
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Convert an absolute path under the root back into a listing key.
    fn relative_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            parts.push(component.as_os_str().to_str()?);
        }
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        Ok(ObjectMeta {
            size: Some(metadata.len()),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", len = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        self.ensure_parent(&path).await?;

        // Write to a temp file in the same directory, then rename for
        // atomicity. The temp name prefix keeps listings from seeing it.
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidKey(format!("no file name in key: {key}")))?;
        let tmp_path = path.with_file_name(format!("{TMP_PREFIX}{}-{file_name}", Uuid::new_v4()));

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    fn listing_capabilities(&self) -> ListingCapabilities {
        // A directory walk has no stable cursor to hand out.
        ListingCapabilities { resumable: false }
    }

    fn list_pages<'a>(
        &'a self,
        prefix: &str,
        options: ListingOptions,
        resume: Option<ListingResume>,
    ) -> Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>> {
        let page_size = options.normalized_page_size();
        let prefix = prefix.to_string();

        if resume.is_some() {
            return Box::pin(futures::stream::iter([Err(
                StorageError::ListingNotResumable,
            )]));
        }

        Box::pin(async_stream::try_stream! {
            // Depth-first walk with per-directory sorted children, so keys
            // come out in lexicographic order across runs.
            enum WalkItem {
                Dir(PathBuf),
                File(PathBuf),
            }

            let mut stack = vec![WalkItem::Dir(self.root.clone())];
            let mut entries: Vec<ObjectEntry> = Vec::new();

            while let Some(item) = stack.pop() {
                let path = match item {
                    WalkItem::Dir(dir) => {
                        let mut read_dir = match fs::read_dir(&dir).await {
                            Ok(rd) => rd,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                            Err(e) => Err::<fs::ReadDir, _>(StorageError::Io(e))?,
                        };

                        let mut children = Vec::new();
                        while let Some(entry) =
                            read_dir.next_entry().await.map_err(StorageError::Io)?
                        {
                            let is_dir = entry
                                .file_type()
                                .await
                                .map_err(StorageError::Io)?
                                .is_dir();
                            children.push((entry.path(), is_dir));
                        }
                        children.sort_by(|a, b| a.0.cmp(&b.0));

                        for (child, is_dir) in children.into_iter().rev() {
                            stack.push(if is_dir {
                                WalkItem::Dir(child)
                            } else {
                                WalkItem::File(child)
                            });
                        }
                        continue;
                    }
                    WalkItem::File(path) => path,
                };

                let Some(key) = self.relative_key(&path) else {
                    // Non-UTF-8 names cannot be storage keys.
                    continue;
                };
                if key.rsplit('/').next().is_some_and(|n| n.starts_with(TMP_PREFIX)) {
                    continue;
                }
                if !key.starts_with(&prefix) {
                    continue;
                }

                // A file removed mid-walk degrades to an unknown size
                // rather than failing the whole listing.
                let size = fs::metadata(&path).await.ok().map(|m| m.len());
                entries.push(ObjectEntry { key, size });

                if entries.len() >= page_size {
                    yield ListingPage {
                        entries: std::mem::take(&mut entries),
                        next_token: None,
                    };
                }
            }

            if !entries.is_empty() {
                yield ListingPage { entries, next_token: None };
            }
        })
    }
}
