//! TTL Cache
//!
//! Lazy expiry: an expired entry is never returned, and is removed by the
//! lookup that finds it or by `purge_expired`. Bounded by `max_entries`;
//! on overflow expired entries go first, then the oldest insertion.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

/// Cache entry with TTL tracking
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently stored (may include not-yet-purged expired ones)
    pub entries: usize,
    /// Entries removed to respect max_entries
    pub evictions: u64,
}

/// Concurrent key -> value cache with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Default max cache entries
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a cached value if it has not expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_valid(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        self.entries.remove_if(key, |_, entry| !entry.is_valid(now));
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite; the entry expires `ttl` from now
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.purge_expired(now);
            while self.entries.len() >= self.max_entries {
                if !self.remove_oldest() {
                    break;
                }
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Return the cached value, or run `fetch` and store its successful result.
    ///
    /// A hit never calls `fetch`. Errors are returned as-is and not cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!("Cache hit for {}", key);
            return Ok(value);
        }

        let value = fetch().await?;
        self.put(key, value.clone(), ttl);
        Ok(value)
    }

    /// Remove every entry with `expires_at <= now`; returns how many went
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid(now));
        before.saturating_sub(self.entries.len())
    }

    /// Remove the oldest entry
    fn remove_oldest(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                if self.entries.remove(&key).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                true
            }
            None => false,
        }
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn cache() -> TtlCache<u32> {
        TtlCache::new(Duration::from_secs(60), 100)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_before_expiry() {
        let cache = cache();
        cache.put("eth:pool:1h", 7, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("eth:pool:1h"), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_after_expiry_and_lazy_removal() {
        let cache = cache();
        cache.put("k", 1, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_expiry() {
        let cache = cache();
        cache.put("k", 1, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put("k", 2, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache();
        cache.put("short", 1, Duration::from_secs(5));
        cache.put("long", 2, Duration::from_secs(50));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.purge_expired(Instant::now()), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_evicts_expired_then_oldest() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 3);
        cache.put("a", 1, Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.put("b", 2, Duration::from_secs(60));
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.put("c", 3, Duration::from_secs(60));

        // "a" has expired: it goes, nothing live is evicted
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.put("d", 4, Duration::from_secs(60));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("b"), Some(2));

        // all live: the oldest insertion ("b") is evicted
        cache.put("e", 5, Duration::from_secs(60));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("e"), Some(5));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_fetch_hit_skips_fetch() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<u32, String> = cache
                .get_or_fetch("k", Duration::from_secs(30), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value, Ok(42));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_fetch_error_not_cached() {
        let cache = cache();
        let first: Result<u32, &str> = cache
            .get_or_fetch("k", Duration::from_secs(30), || async { Err("boom") })
            .await;
        assert_eq!(first, Err("boom"));
        assert!(cache.is_empty());

        let second: Result<u32, &str> = cache
            .get_or_fetch("k", Duration::from_secs(30), || async { Ok(5) })
            .await;
        assert_eq!(second, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_and_writers() {
        let cache = std::sync::Arc::new(cache());
        let mut handles = Vec::new();
        for i in 0..16u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("key-{}", i % 4);
                cache.put(key.clone(), i, Duration::from_secs(30));
                cache.get(&key).is_some()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(cache.len(), 4);
    }
}
