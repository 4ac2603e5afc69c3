//! In-memory key-value cache.

use async_trait::async_trait;
use parking_lot::RwLock;
use sb_error::CacheError;
use sb_traits::Cache;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default maximum number of entries in the cache.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe in-memory cache with optional per-key TTL.
///
/// When full, expired entries are dropped first and then the oldest entry is
/// evicted. A `default_ttl` applies to writes that carry no TTL of their own.
#[derive(Debug)]
pub struct MemoryCache {
    max_entries: usize,
    default_ttl: Option<Duration>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    /// Creates an unbounded-lifetime cache with default capacity.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_ENTRIES, None)
    }

    /// Creates a cache with custom capacity and default TTL.
    pub fn with_config(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            max_entries: max_entries.max(1),
            default_ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries, including expired ones not yet cleaned up.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Removes expired entries.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Cleaned up expired cache entries");
        }
    }

    fn evict(&self, entries: &mut HashMap<String, CacheEntry>) {
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));

        if entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&oldest);
                trace!(key = %oldest, "Evicted oldest cache entry");
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                trace!(key = %key, "Cache hit");
                Ok(entry.value.clone())
            }
            Some(_) => {
                trace!(key = %key, "Cache entry expired");
                Err(CacheError::NotFound(key.to_string()))
            }
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = ttl.or(self.default_ttl).map(|ttl| now + ttl);

        let mut entries = self.entries.write();
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            self.evict(&mut entries);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                expires_at,
            },
        );

        trace!(key = %key, cache_size = entries.len(), "Cache entry written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), b"v");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let cache = MemoryCache::new();
        assert_eq!(
            cache.get("nope").await,
            Err(CacheError::NotFound("nope".to_string()))
        );
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("short", b"v".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        cache.set("long", b"v".to_vec(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get("short").await.is_err());
        assert!(cache.get("long").await.is_ok());

        cache.cleanup_expired();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let cache = MemoryCache::with_config(10, Some(Duration::from_millis(10)));
        cache.set("k", b"v".to_vec(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_eviction_at_capacity() {
        let cache = MemoryCache::with_config(2, None);
        cache.set("a", b"1".to_vec(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("b", b"2".to_vec(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("c", b"3".to_vec(), None).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").await.is_err());
        assert!(cache.get("c").await.is_ok());
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = MemoryCache::with_config(2, None);
        cache.set("a", b"1".to_vec(), None).await.unwrap();
        cache.set("b", b"2".to_vec(), None).await.unwrap();
        cache.set("a", b"3".to_vec(), None).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").await.unwrap(), b"3");
    }
}
