//! Seen Cache
//!
//! Presence-only skip list. Best-effort: a false negative just means one
//! redundant probe.

use std::time::Duration;

use super::ttl::{CacheStats, TtlCache};

#[derive(Debug)]
pub struct SeenCache {
    inner: TtlCache<()>,
    ttl: Duration,
}

impl SeenCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: TtlCache::new(ttl, max_entries),
            ttl,
        }
    }

    /// True if the key was marked within the TTL
    pub fn get(&self, key: &str) -> bool {
        self.inner.get(key).is_some()
    }

    /// Mark the key as seen for the configured TTL
    pub fn put(&self, key: impl Into<String>) {
        self.inner.put(key, (), self.ttl);
    }

    /// Keep only the items whose key has not been seen
    pub fn retain_unseen<T, F>(&self, items: Vec<T>, key_fn: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        items.into_iter().filter(|item| !self.get(key_fn(item))).collect()
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired(tokio::time::Instant::now())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_seen_expires() {
        let seen = SeenCache::new(Duration::from_secs(600), 100);
        assert!(!seen.get("bsc:0xabc"));

        seen.put("bsc:0xabc");
        assert!(seen.get("bsc:0xabc"));

        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(!seen.get("bsc:0xabc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retain_unseen_keeps_order() {
        let seen = SeenCache::new(Duration::from_secs(600), 100);
        seen.put("b");

        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let left = seen.retain_unseen(items, |s| s.as_str());
        assert_eq!(left, vec!["a".to_string(), "c".to_string()]);
    }
}
