//! In-memory cache store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheKey, CacheStats, CacheStore};
use crate::errors::CacheError;

/// Internal state for the memory store
#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<CacheKey, String>,
    stats: CacheStats,
}

/// In-memory cache store backed by a HashMap
///
/// Unbounded by design: churn entries are small and keyed per (seller,
/// granularity, period), so the working set is proportional to cached
/// history, not to traffic. Suited to tests and single-process deployments;
/// entries do not survive a restart.
///
/// # Examples
///
/// ```rust,ignore
/// use churnscan::cache::{CacheStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// assert_eq!(store.stats().await.entries, 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn batch_get(
        &self,
        keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, String>, CacheError> {
        let mut state = self.state.lock().await;

        let mut found = HashMap::new();
        for key in keys {
            if let Some(blob) = state.entries.get(key) {
                found.insert(key.clone(), blob.clone());
            }
        }

        state.stats.hits += found.len() as u64;
        state.stats.misses += (keys.len() - found.len()) as u64;
        debug!(
            requested = keys.len(),
            found = found.len(),
            "Batch read (memory)"
        );

        Ok(found)
    }

    async fn upsert(&self, key: CacheKey, blob: String) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;

        debug!(key = %key, "Upserting entry into memory store");
        state.entries.insert(key, blob);
        state.stats.writes += 1;
        state.stats.entries = state.entries.len();

        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        debug!(entries = state.entries.len(), "Clearing memory store");
        state.entries.clear();
        state.stats.entries = 0;
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        state.stats.clone()
    }

    fn name(&self) -> &'static str {
        "MemoryStore"
    }
}
