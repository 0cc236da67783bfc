//! No-op cache store for disabling caching

use async_trait::async_trait;
use std::collections::HashMap;

use super::{CacheKey, CacheStats, CacheStore};
use crate::errors::CacheError;

/// Cache store that never stores anything
///
/// Every read misses and every write succeeds without effect, which makes
/// the proxy recompute all periods live. Useful for benchmarking against
/// uncached behavior and for deployments that disable caching outright.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpStore;

impl NoOpStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NoOpStore {
    async fn batch_get(
        &self,
        _keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, String>, CacheError> {
        Ok(HashMap::new())
    }

    async fn upsert(&self, _key: CacheKey, _blob: String) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn name(&self) -> &'static str {
        "NoOpStore"
    }
}
