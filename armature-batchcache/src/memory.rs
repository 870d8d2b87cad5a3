//! In-memory cache store.

use crate::config::{CacheConfig, Expiry};
use crate::error::CacheResult;
use crate::traits::CacheStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Lookup statistics of an [`InMemoryCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Keys found on lookup
    pub hits: u64,
    /// Keys not found (or expired) on lookup
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, `0.0` when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process cache store.
///
/// Every looked-up key counts as a hit or a miss, which makes the store
/// handy for asserting how a reconciler used the cache.
#[derive(Clone)]
pub struct InMemoryCache {
    data: Arc<RwLock<HashMap<String, CacheEntry>>>,
    counters: Arc<Counters>,
    config: CacheConfig,
}

impl InMemoryCache {
    /// Create new in-memory cache without expiration.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::memory())
    }

    /// Create from a configuration (only the key prefix and expiry apply).
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            config,
        }
    }

    /// Expire entries a fixed time after their last access.
    pub fn with_expire_after_access(ttl: Duration) -> Self {
        Self::with_config(CacheConfig::memory().with_expire_after_access(ttl))
    }

    /// Expire entries a fixed time after they were written.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_config(CacheConfig::memory().with_default_ttl(ttl))
    }

    /// Current hit/miss counts.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    /// Reset the hit/miss counts.
    pub fn reset_stats(&self) {
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
    }

    /// Number of stored entries, expired ones included until next touched.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Clean up expired entries
    pub async fn cleanup_expired(&self) {
        let mut data = self.data.write().await;
        let now = Instant::now();
        data.retain(|_, entry| entry.expires_at.is_none_or(|exp| exp > now));
    }

    fn deadline(&self, now: Instant) -> Option<Instant> {
        self.config.expiry.map(|expiry| now + expiry.duration())
    }

    // Looks up one key, dropping it when expired and sliding its deadline on
    // access when configured to.
    fn lookup(
        &self,
        data: &mut HashMap<String, CacheEntry>,
        key: &str,
        now: Instant,
    ) -> Option<String> {
        let expired = match data.get(key) {
            Some(entry) => entry.expires_at.is_some_and(|exp| exp <= now),
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            data.remove(key);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let refresh = match self.config.expiry {
            Some(Expiry::AfterAccess(_)) => self.deadline(now),
            _ => None,
        };
        let entry = data.get_mut(key)?;
        if refresh.is_some() {
            entry.expires_at = refresh;
        }
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get_json(&self, key: &str) -> CacheResult<Option<String>> {
        let key = self.config.build_key(key);
        let mut data = self.data.write().await;
        Ok(self.lookup(&mut data, &key, Instant::now()))
    }

    async fn set_json(&self, key: &str, value: String) -> CacheResult<()> {
        let key = self.config.build_key(key);
        let entry = CacheEntry {
            value,
            expires_at: self.deadline(Instant::now()),
        };
        self.data.write().await.insert(key, entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.config.build_key(key);
        self.data.write().await.remove(&key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let key = self.config.build_key(key);
        let data = self.data.read().await;
        let now = Instant::now();
        Ok(data
            .get(&key)
            .is_some_and(|entry| entry.expires_at.is_none_or(|exp| exp > now)))
    }

    async fn clear(&self) -> CacheResult<()> {
        self.data.write().await.clear();
        Ok(())
    }

    async fn get_many(&self, keys: &[&str]) -> CacheResult<HashMap<String, String>> {
        let mut data = self.data.write().await;
        let now = Instant::now();

        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let full_key = self.config.build_key(key);
            if let Some(value) = self.lookup(&mut data, &full_key, now) {
                found.insert(key.to_string(), value);
            }
        }
        Ok(found)
    }

    async fn set_many(&self, items: &[(&str, String)]) -> CacheResult<()> {
        let mut data = self.data.write().await;
        let expires_at = self.deadline(Instant::now());
        for (key, value) in items {
            let entry = CacheEntry {
                value: value.clone(),
                expires_at,
            };
            data.insert(self.config.build_key(key), entry);
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[&str]) -> CacheResult<()> {
        let mut data = self.data.write().await;
        for key in keys {
            data.remove(&self.config.build_key(key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();

        cache.set_json("company-1", "1".to_string()).await.unwrap();
        assert_eq!(
            cache.get_json("company-1").await.unwrap(),
            Some("1".to_string())
        );

        cache.delete("company-1").await.unwrap();
        assert_eq!(cache.get_json("company-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stats_count_each_key() {
        let cache = InMemoryCache::new();
        cache
            .set_many(&[("c-1", "1".to_string()), ("c-3", "3".to_string())])
            .await
            .unwrap();

        let found = cache.get_many(&["c-1", "c-2", "c-3"]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });

        cache.reset_stats();
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_key_prefix_is_transparent() {
        let cache = InMemoryCache::with_config(CacheConfig::memory().with_key_prefix("app"));
        cache.set_json("company-1", "1".to_string()).await.unwrap();

        assert!(cache.exists("company-1").await.unwrap());
        let found = cache.get_many(&["company-1"]).await.unwrap();
        assert!(found.contains_key("company-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_after_write() {
        let cache = InMemoryCache::with_ttl(Duration::from_secs(10));
        cache.set_json("k", "v".to_string()).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.get_json("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get_json("k").await.unwrap().is_none());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_after_access_slides() {
        let cache = InMemoryCache::with_expire_after_access(Duration::from_secs(10));
        cache.set_json("k", "v".to_string()).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.get_json("k").await.unwrap().is_some());

        // Read above pushed the deadline out again
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.get_json("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get_json("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let cache = InMemoryCache::with_ttl(Duration::from_secs(1));
        cache.set_json("k", "v".to_string()).await.unwrap();
        assert_eq!(cache.len().await, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.cleanup_expired().await;
        assert!(cache.is_empty().await);
    }
}
