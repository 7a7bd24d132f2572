//! Response cache trait definition

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{CacheKey, TtlClass};

/// Cache counters and occupancy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate_percent: f64,
}

impl CacheStats {
    pub fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 * 100.0 / total as f64
        }
    }
}

/// Cache of decoded provider responses
#[async_trait]
pub trait ResponseCache: Send + Sync + Debug {
    /// Returns the payload unless absent or expired
    async fn get(&self, key: &CacheKey) -> Option<Value>;

    async fn put(&self, key: &CacheKey, payload: Value, ttl_class: TtlClass);

    /// Returns whether an entry was removed
    async fn invalidate(&self, key: &CacheKey) -> bool;

    async fn clear(&self);

    async fn stats(&self) -> CacheStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheStats::hit_rate(0, 0), 0.0);
        assert_eq!(CacheStats::hit_rate(1, 3), 25.0);
        assert_eq!(CacheStats::hit_rate(4, 0), 100.0);
    }
}
