//! Media store abstraction for uploaded binaries.
//!
//! The core never touches bytes beyond handing them to a [`MediaStore`] and
//! remembering the returned [`MediaRef`]. Transcoding and serving are the
//! store's concern.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{AppError, AppResult, IdGenerator};

/// Public reference to a stored media object (its URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

impl MediaRef {
    /// Wrap an existing media URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The URL of the media object.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the reference, returning the URL.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file handed over by the request layer.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    /// Original file name, used only for its extension.
    pub file_name: String,
    /// File contents.
    pub data: Vec<u8>,
}

impl MediaUpload {
    /// Create a new upload.
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data,
        }
    }

    fn extension(&self) -> Option<&str> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(char::is_alphanumeric))
    }
}

/// Media store backend trait.
#[async_trait::async_trait]
pub trait MediaStore: Send + Sync {
    /// Store an upload and return its public reference.
    async fn store(&self, upload: &MediaUpload) -> AppResult<MediaRef>;

    /// Remove a previously stored object.
    async fn remove(&self, media: &MediaRef) -> AppResult<()>;
}

/// Shared handle to a media store.
pub type SharedMediaStore = Arc<dyn MediaStore>;

fn storage_key(id_gen: &IdGenerator, upload: &MediaUpload) -> String {
    match upload.extension() {
        Some(ext) => format!("{}.{}", id_gen.generate(), ext.to_lowercase()),
        None => id_gen.generate(),
    }
}

/// Local filesystem media store.
pub struct LocalMediaStore {
    base_path: PathBuf,
    base_url: String,
    id_gen: IdGenerator,
}

impl LocalMediaStore {
    /// Create a new local media store.
    #[must_use]
    pub fn new(base_path: PathBuf, base_url: String) -> Self {
        Self {
            base_path,
            base_url: base_url.trim_end_matches('/').to_string(),
            id_gen: IdGenerator::new(),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn key_of<'a>(&self, media: &'a MediaRef) -> AppResult<&'a str> {
        media
            .as_str()
            .strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty() && !key.contains(".."))
            .ok_or_else(|| AppError::MediaStore("media reference is not owned by this store".into()))
    }
}

#[async_trait::async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, upload: &MediaUpload) -> AppResult<MediaRef> {
        if upload.data.is_empty() {
            return Err(AppError::invalid("Media file is empty"));
        }

        tokio::fs::create_dir_all(&self.base_path).await?;

        let key = storage_key(&self.id_gen, upload);
        tokio::fs::write(self.base_path.join(&key), &upload.data).await?;

        tracing::debug!(key = %key, size = upload.data.len(), "Stored media file");
        Ok(MediaRef::new(self.public_url(&key)))
    }

    async fn remove(&self, media: &MediaRef) -> AppResult<()> {
        let path = self.base_path.join(self.key_of(media)?);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

/// In-memory media store, for tests and local development.
///
/// Removal can be switched to fail to exercise best-effort cleanup paths.
#[derive(Default)]
pub struct InMemoryMediaStore {
    objects: Mutex<BTreeMap<String, usize>>,
    fail_removals: AtomicBool,
    id_gen: IdGenerator,
}

impl InMemoryMediaStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `remove` call fail.
    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    /// Whether an object is currently stored.
    pub async fn contains(&self, media: &MediaRef) -> bool {
        self.objects.lock().await.contains_key(media.as_str())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    /// Whether the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn store(&self, upload: &MediaUpload) -> AppResult<MediaRef> {
        if upload.data.is_empty() {
            return Err(AppError::invalid("Media file is empty"));
        }
        let url = format!("memory://{}", storage_key(&self.id_gen, upload));
        self.objects.lock().await.insert(url.clone(), upload.data.len());
        Ok(MediaRef::new(url))
    }

    async fn remove(&self, media: &MediaRef) -> AppResult<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(AppError::MediaStore("removal rejected".to_string()));
        }
        self.objects.lock().await.remove(media.as_str());
        Ok(())
    }
}
