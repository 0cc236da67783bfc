//! Disk-based cache store with versioning and atomic writes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CacheKey, CacheStats, CacheStore};
use crate::errors::CacheError;

/// Current on-disk file format version
const FILE_FORMAT_VERSION: u32 = 1;

/// Serialized store format (versioned)
///
/// This version covers the file layout only; entry invalidation goes through
/// the cache-key version, which is part of every key.
#[derive(Debug, Serialize, Deserialize)]
struct StoreData {
    version: u32,
    entries: HashMap<CacheKey, String>,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            version: FILE_FORMAT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// Disk-backed cache store persisting entries as a single JSON file
///
/// Writes are atomic: the full store is serialized to a temp file and
/// renamed over the target, so readers never observe a partially written
/// file. The whole-file model suits churn entries, which are small and
/// written one period at a time by backfill and gap fills.
///
/// # Examples
///
/// ```rust,ignore
/// use churnscan::cache::DiskStore;
///
/// let store = DiskStore::new("/var/cache/churn.json").validate()?;
/// ```
///
/// # Performance
///
/// Every operation reads or rewrites the full file. Adequate for periodic
/// backfill jobs and low-concurrency dashboards; high-traffic deployments
/// should put a [`CacheStore`] implementation over a real key-value service
/// behind the same trait.
#[derive(Debug)]
pub struct DiskStore {
    path: PathBuf,
    state: Mutex<CacheStats>,
}

impl DiskStore {
    /// Creates a disk store at the specified path
    ///
    /// The path is not validated until the first I/O operation; use
    /// [`validate()`](Self::validate) to check it immediately.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(CacheStats::default()),
        }
    }

    /// Validates the store path, creating the parent directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no parent directory, or the parent
    /// cannot be created or is not writable.
    pub fn validate(self) -> Result<Self, CacheError> {
        let parent = self.path.parent().ok_or_else(|| {
            CacheError::io(
                self.path.display().to_string(),
                "store path has no parent directory",
                None,
            )
        })?;

        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::io(
                    parent.display().to_string(),
                    "failed to create store directory",
                    Some(e),
                )
            })?;
            debug!(path = %parent.display(), "Created cache store directory");
        }

        let test_file = parent.join(".churn_cache_write_test");
        std::fs::write(&test_file, b"test").map_err(|e| {
            CacheError::io(
                parent.display().to_string(),
                "store directory is not writable",
                Some(e),
            )
        })?;
        let _ = std::fs::remove_file(&test_file);

        debug!(path = %self.path.display(), "Cache store path validated");
        Ok(self)
    }

    /// Loads store data from disk
    ///
    /// A missing file is an empty store. A file that fails to parse, or one
    /// with an unknown format version, is discarded with a warning rather
    /// than failing reads.
    async fn load(&self) -> Result<StoreData, CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Store file does not exist, using empty store");
                return Ok(StoreData::default());
            }
            Err(e) => {
                return Err(CacheError::io(
                    self.path.display().to_string(),
                    "failed to read store file",
                    Some(e),
                ));
            }
        };

        let data: StoreData = match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to parse store file, using empty store"
                );
                return Ok(StoreData::default());
            }
        };

        if data.version != FILE_FORMAT_VERSION {
            warn!(
                path = %self.path.display(),
                stored_version = data.version,
                current_version = FILE_FORMAT_VERSION,
                "Store file format mismatch, ignoring stored data"
            );
            return Ok(StoreData::default());
        }

        Ok(data)
    }

    /// Saves store data to disk with an atomic temp-file rename
    async fn save(&self, data: &StoreData) -> Result<(), CacheError> {
        let json = serde_json::to_vec(data)
            .map_err(|e| CacheError::serialization("failed to encode store file", e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CacheError::io(
                        parent.display().to_string(),
                        "failed to create store directory",
                        Some(e),
                    )
                })?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json).await.map_err(|e| {
            CacheError::io(
                temp_path.display().to_string(),
                "failed to write store file",
                Some(e),
            )
        })?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| {
                CacheError::io(
                    self.path.display().to_string(),
                    "failed to move store file into place",
                    Some(e),
                )
            })?;

        debug!(
            path = %self.path.display(),
            entries = data.entries.len(),
            "Saved cache store"
        );
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn batch_get(
        &self,
        keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, String>, CacheError> {
        let mut stats = self.state.lock().await;
        let data = self.load().await?;

        let mut found = HashMap::new();
        for key in keys {
            if let Some(blob) = data.entries.get(key) {
                found.insert(key.clone(), blob.clone());
            }
        }

        stats.hits += found.len() as u64;
        stats.misses += (keys.len() - found.len()) as u64;
        stats.entries = data.entries.len();
        debug!(
            requested = keys.len(),
            found = found.len(),
            "Batch read (disk)"
        );

        Ok(found)
    }

    async fn upsert(&self, key: CacheKey, blob: String) -> Result<(), CacheError> {
        let mut stats = self.state.lock().await;

        let mut data = self.load().await.unwrap_or_default();
        debug!(key = %key, "Upserting entry into disk store");
        data.entries.insert(key, blob);

        stats.writes += 1;
        stats.entries = data.entries.len();

        self.save(&data).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut stats = self.state.lock().await;

        info!(path = %self.path.display(), "Clearing disk store");
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CacheError::io(
                    self.path.display().to_string(),
                    "failed to delete store file",
                    Some(e),
                ));
            }
        }

        stats.entries = 0;
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let mut stats = self.state.lock().await;
        if let Ok(data) = self.load().await {
            stats.entries = data.entries.len();
        }
        stats.clone()
    }

    fn name(&self) -> &'static str {
        "DiskStore"
    }
}
