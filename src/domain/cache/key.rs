//! Cache keys and TTL classification

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Volatility class of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
    /// Live prices and tickers
    Short,
    /// Market metadata (coin lists, global stats)
    Medium,
    /// OHLC and historical series
    Long,
}

impl TtlClass {
    pub fn ttl(&self) -> Duration {
        match self {
            Self::Short => Duration::from_secs(120),
            Self::Medium => Duration::from_secs(600),
            Self::Long => Duration::from_secs(3600),
        }
    }

    /// Width of the time bucket folded into the key
    pub fn bucket_width(&self) -> Duration {
        match self {
            Self::Short => Duration::from_secs(60),
            Self::Medium => Duration::from_secs(300),
            Self::Long => Duration::from_secs(3600),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for TtlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps endpoints to TTL classes by substring
///
/// Short patterns are checked first so live prices under a medium prefix
/// (`/coins/markets`) stay short; then long, then medium. Anything unmatched
/// is short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    pub short_patterns: Vec<String>,
    pub long_patterns: Vec<String>,
    pub medium_patterns: Vec<String>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            short_patterns: ["price", "markets", "ticker", "Ticker"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            long_patterns: ["ohlc", "OHLC", "market_chart", "history", "candles"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            medium_patterns: ["coins", "global"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TtlPolicy {
    pub fn classify(&self, endpoint: &str) -> TtlClass {
        let matches = |patterns: &[String]| patterns.iter().any(|p| endpoint.contains(p.as_str()));

        if matches(&self.short_patterns) {
            TtlClass::Short
        } else if matches(&self.long_patterns) {
            TtlClass::Long
        } else if matches(&self.medium_patterns) {
            TtlClass::Medium
        } else {
            TtlClass::Short
        }
    }
}

/// Fingerprint of (provider, endpoint, sorted params, time bucket)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    fingerprint: String,
    bucket: u64,
}

impl CacheKey {
    /// `now` is wall-clock time since the Unix epoch
    pub fn new(
        provider: &str,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        class: TtlClass,
        now: Duration,
    ) -> Self {
        let bucket = now.as_secs() / class.bucket_width().as_secs().max(1);
        // A map of strings always serializes; BTreeMap keeps the order stable.
        let params_json = serde_json::to_string(params).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(endpoint.as_bytes());
        hasher.update([0u8]);
        hasher.update(params_json.as_bytes());
        hasher.update([0u8]);
        hasher.update(bucket.to_be_bytes());

        Self {
            fingerprint: hex::encode(hasher.finalize()),
            bucket,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn bucket(&self) -> u64 {
        self.bucket
    }
}
