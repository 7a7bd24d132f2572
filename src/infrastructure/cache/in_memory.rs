//! In-memory LRU response cache with per-class TTLs

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::{CacheKey, CacheStats, Clock, GatewayError, ResponseCache, TtlClass};

/// Configuration for the in-memory cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_capacity: usize,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self { max_capacity: 1000 }
    }
}

impl InMemoryCacheConfig {
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    /// Wall-clock insertion time since the epoch
    inserted_at: Duration,
    ttl_class: TtlClass,
}

impl CacheEntry {
    fn is_expired(&self, now: Duration) -> bool {
        now.saturating_sub(self.inserted_at) > self.ttl_class.ttl()
    }
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn purge_expired(&mut self, now: Duration) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }
}

/// LRU cache guarded by a single async mutex
pub struct InMemoryResponseCache {
    state: Mutex<CacheState>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryResponseCache {
    pub fn new(config: InMemoryCacheConfig, clock: Arc<dyn Clock>) -> Result<Self, GatewayError> {
        let capacity = NonZeroUsize::new(config.max_capacity)
            .ok_or_else(|| GatewayError::config("Cache capacity must be at least 1"))?;

        Ok(Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity: capacity.get(),
            clock,
        })
    }
}

impl fmt::Debug for InMemoryResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryResponseCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = self.clock.unix_time();
        let mut state = self.state.lock().await;

        let expired = match state.entries.peek(key.fingerprint()) {
            Some(entry) => entry.is_expired(now),
            None => {
                state.misses += 1;
                return None;
            }
        };

        if expired {
            state.entries.pop(key.fingerprint());
            state.misses += 1;
            tracing::trace!(key = key.fingerprint(), "Cache entry expired");
            return None;
        }

        let payload = state
            .entries
            .get(key.fingerprint())
            .map(|entry| entry.payload.clone());
        state.hits += 1;
        payload
    }

    async fn put(&self, key: &CacheKey, payload: Value, ttl_class: TtlClass) {
        let now = self.clock.unix_time();
        let mut state = self.state.lock().await;

        let purged = state.purge_expired(now);
        if purged > 0 {
            tracing::trace!(purged, "Purged expired cache entries");
        }

        let entry = CacheEntry {
            payload,
            inserted_at: now,
            ttl_class,
        };

        if let Some((evicted, _)) = state.entries.push(key.fingerprint().to_string(), entry) {
            if evicted != key.fingerprint() {
                state.evictions += 1;
                tracing::debug!(evicted = %evicted, "Evicted least recently used cache entry");
            }
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> bool {
        self.state.lock().await.entries.pop(key.fingerprint()).is_some()
    }

    async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        tracing::debug!("Response cache cleared");
    }

    async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;

        CacheStats {
            size: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            hit_rate_percent: CacheStats::hit_rate(state.hits, state.misses),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ManualClock;
    use serde_json::json;
    use std::collections::BTreeMap;

    const START: u64 = 1_700_000_000;

    fn create_cache(capacity: usize) -> (InMemoryResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix_secs(START));
        let cache = InMemoryResponseCache::new(
            InMemoryCacheConfig::default().with_max_capacity(capacity),
            clock.clone(),
        )
        .unwrap();
        (cache, clock)
    }

    fn key(endpoint: &str, clock: &ManualClock, class: TtlClass) -> CacheKey {
        CacheKey::new("coingecko", endpoint, &BTreeMap::new(), class, clock.unix_time())
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (cache, clock) = create_cache(10);
        let key = key("/simple/price", &clock, TtlClass::Short);

        cache.put(&key, json!({"bitcoin": {"usd": 65000}}), TtlClass::Short).await;

        assert_eq!(cache.get(&key).await, Some(json!({"bitcoin": {"usd": 65000}})));
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (cache, clock) = create_cache(10);

        assert!(cache.get(&key("/global", &clock, TtlClass::Medium)).await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_on_lookup() {
        let (cache, clock) = create_cache(10);
        let key = key("/simple/price", &clock, TtlClass::Short);
        cache.put(&key, json!(1), TtlClass::Short).await;

        clock.advance(Duration::from_secs(120));
        assert!(cache.get(&key).await.is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_put_purges_expired_entries() {
        let (cache, clock) = create_cache(10);
        let old = key("/simple/price", &clock, TtlClass::Short);
        let long = key("/coins/bitcoin/ohlc", &clock, TtlClass::Long);
        cache.put(&old, json!("old"), TtlClass::Short).await;
        cache.put(&long, json!("long"), TtlClass::Long).await;

        clock.advance(Duration::from_secs(600));
        let fresh = key("/simple/price", &clock, TtlClass::Short);
        cache.put(&fresh, json!("fresh"), TtlClass::Short).await;

        let stats = cache.stats().await;
        assert_eq!(stats.size, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(cache.get(&long).await, Some(json!("long")));
    }

    #[tokio::test]
    async fn test_lru_eviction_removes_least_recently_used() {
        let (cache, clock) = create_cache(3);
        let a = key("/a", &clock, TtlClass::Short);
        let b = key("/b", &clock, TtlClass::Short);
        let c = key("/c", &clock, TtlClass::Short);
        let d = key("/d", &clock, TtlClass::Short);

        cache.put(&a, json!("a"), TtlClass::Short).await;
        cache.put(&b, json!("b"), TtlClass::Short).await;
        cache.put(&c, json!("c"), TtlClass::Short).await;
        cache.get(&a).await;
        cache.put(&d, json!("d"), TtlClass::Short).await;

        assert!(cache.get(&b).await.is_none());
        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&c).await.is_some());
        assert!(cache.get(&d).await.is_some());

        let stats = cache.stats().await;
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 3);
    }

    #[tokio::test]
    async fn test_overwrite_is_not_an_eviction() {
        let (cache, clock) = create_cache(2);
        let a = key("/a", &clock, TtlClass::Short);

        cache.put(&a, json!(1), TtlClass::Short).await;
        cache.put(&a, json!(2), TtlClass::Short).await;

        assert_eq!(cache.get(&a).await, Some(json!(2)));
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let (cache, clock) = create_cache(10);
        let a = key("/a", &clock, TtlClass::Short);
        let b = key("/b", &clock, TtlClass::Short);
        cache.put(&a, json!(1), TtlClass::Short).await;
        cache.put(&b, json!(2), TtlClass::Short).await;

        assert!(cache.invalidate(&a).await);
        assert!(!cache.invalidate(&a).await);
        assert_eq!(cache.stats().await.size, 1);

        cache.clear().await;
        assert_eq!(cache.stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let (cache, clock) = create_cache(10);
        let a = key("/a", &clock, TtlClass::Short);
        cache.put(&a, json!(1), TtlClass::Short).await;

        cache.get(&a).await;
        cache.get(&a).await;
        cache.get(&a).await;
        cache.get(&key("/missing", &clock, TtlClass::Short)).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hit_rate_percent, 75.0);
        assert_eq!(stats.capacity, 10);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        let result = InMemoryResponseCache::new(
            InMemoryCacheConfig::default().with_max_capacity(0),
            Arc::new(ManualClock::at_unix_secs(START)),
        );
        assert!(matches!(result, Err(GatewayError::Config { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_access_stays_bounded() {
        let (cache, clock) = create_cache(8);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let key = key(&format!("/coins/{}", i), &clock, TtlClass::Medium);
                tokio::spawn(async move {
                    cache.put(&key, json!(i), TtlClass::Medium).await;
                    cache.get(&key).await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let stats = cache.stats().await;
        assert_eq!(stats.size, 8);
        assert_eq!(stats.evictions, 24);
    }
}
