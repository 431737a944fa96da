//! Cache backend implementations.

use super::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key-value contract the cache layer needs from a store.
///
/// Entries are append-only: there is no delete and no expiry. A `set` on an
/// existing key replaces it, which is harmless because a key always maps to
/// the same request.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// Unbounded in-process store.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(&key.hash).cloned())
    }
    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.hash.clone(), value.to_vec());
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_point_ops() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("abc");
        assert!(cache.get(&key).await.unwrap().is_none());

        cache.set(&key, b"one").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(cache.len().await.unwrap(), 1);

        // Idempotent rewrite.
        cache.set(&key, b"one").await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_clones_share_entries() {
        let a = MemoryCache::new();
        let b = a.clone();
        a.set(&CacheKey::new("k"), b"v").await.unwrap();
        assert!(b.get(&CacheKey::new("k")).await.unwrap().is_some());
    }
}
