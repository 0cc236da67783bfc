//! Cache-store backends for computed churn statistics
//!
//! The proxy persists per-period [`ChurnData`](crate::types::ChurnData)
//! slices under [versioned keys](key::cache_key) in a key→blob store:
//!
//! - [`MemoryStore`]: in-memory map (tests, single-process deployments)
//! - [`DiskStore`]: single JSON file with atomic rewrites
//! - [`NoOpStore`]: disables caching entirely
//!
//! All operations are async to support networked stores behind the same
//! trait. Entries are written with overwrite semantics and never deleted;
//! an entry is superseded only by an upsert for the same key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::errors::CacheError;
use crate::types::ChurnData;

mod disk;
pub mod key;
mod memory;
mod noop;

pub use disk::DiskStore;
pub use key::{cache_key, CacheKey};
pub use memory::MemoryStore;
pub use noop::NoOpStore;

/// Statistics about cache performance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Keys found by batch reads
    pub hits: u64,
    /// Keys absent from batch reads
    pub misses: u64,
    /// Upserts performed
    pub writes: u64,
    /// Current number of entries in the store
    pub entries: usize,
}

impl CacheStats {
    /// Cache hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={}, misses={}, writes={}, entries={}, hit_rate={:.1}%",
            self.hits,
            self.misses,
            self.writes,
            self.entries,
            self.hit_rate()
        )
    }
}

/// Trait for churn cache-store backends
///
/// # Thread Safety
///
/// Implementations must be thread-safe. Concurrent requests may fill the
/// same gap independently; `upsert` is last-writer-wins, which keeps those
/// races harmless because every writer computed an equivalent value.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieves all present entries for `keys` in one batch
    ///
    /// Absent keys are simply missing from the returned map.
    async fn batch_get(
        &self,
        keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, String>, CacheError>;

    /// Writes an entry, replacing any existing blob for the key
    async fn upsert(&self, key: CacheKey, blob: String) -> Result<(), CacheError>;

    /// Removes every entry
    ///
    /// Used for testing and store management; production invalidation goes
    /// through the key version instead.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Returns current cache statistics
    async fn stats(&self) -> CacheStats;

    /// Human-readable backend name for logging
    fn name(&self) -> &'static str;
}

/// Serializes one cache entry's churn data
pub fn encode_entry(data: &ChurnData) -> Result<String, CacheError> {
    serde_json::to_string(data)
        .map_err(|e| CacheError::serialization("failed to encode churn data", e))
}

/// Deserializes a cache entry's blob
///
/// Returns `None` for corrupt blobs so callers fall through to live
/// recomputation instead of serving malformed statistics.
pub fn decode_entry(key: &CacheKey, blob: &str) -> Option<ChurnData> {
    match serde_json::from_str(blob) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding corrupt cache entry");
            None
        }
    }
}


#[cfg(test)]
impl CacheKey {
    /// Builds an arbitrary key for store tests
    pub(crate) fn from_test_str(raw: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(raw.to_string()))
            .expect("string deserializes into transparent key")
    }
}
