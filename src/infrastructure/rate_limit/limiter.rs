//! Per-identity admission control
//!
//! Each identity owns its bucket lock and its waiter semaphore, so identities
//! never contend with one another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};

use super::token_bucket::{Admission, TokenBucket};
use crate::domain::{ApiIdentity, BackoffConfig, Clock, GatewayError, LimiterSettings, LimiterSnapshot};
use crate::infrastructure::observability::record_throttle;

#[derive(Debug)]
struct IdentityLimiter {
    bucket: Mutex<TokenBucket>,
    waiters: Semaphore,
    max_waiters: usize,
}

#[derive(Debug)]
pub struct RateLimiter {
    limiters: HashMap<String, Arc<IdentityLimiter>>,
    settings: LimiterSettings,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(settings: LimiterSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiters: HashMap::new(),
            settings,
            clock,
        }
    }

    /// Adds a bucket for the identity, replacing any previous one
    pub fn register(&mut self, identity: &ApiIdentity, backoff: BackoffConfig) {
        let bucket = TokenBucket::new(identity.tier(), backoff, self.clock.now());
        self.limiters.insert(
            identity.name().to_string(),
            Arc::new(IdentityLimiter {
                bucket: Mutex::new(bucket),
                waiters: Semaphore::new(self.settings.max_waiters),
                max_waiters: self.settings.max_waiters,
            }),
        );
    }

    fn limiter(&self, provider: &str) -> Result<&Arc<IdentityLimiter>, GatewayError> {
        self.limiters.get(provider).ok_or_else(|| {
            GatewayError::config(format!("No rate limiter registered for provider '{}'", provider))
        })
    }

    /// Suspends until a token is available for `provider`
    ///
    /// Fails fast when the waiter queue is full or when the required wait
    /// would pass the acquisition deadline.
    pub async fn acquire(&self, provider: &str) -> Result<(), GatewayError> {
        let limiter = self.limiter(provider)?;

        let _permit = limiter.waiters.try_acquire().map_err(|_| {
            tracing::warn!(provider, max_waiters = limiter.max_waiters, "Rate limiter queue full");
            GatewayError::rate_limit_exceeded(provider, "too many requests waiting for a token")
        })?;

        let deadline = self.clock.now() + self.settings.acquire_timeout;

        loop {
            let now = self.clock.now();
            let admission = limiter.bucket.lock().await.try_acquire(now);

            let wait = match admission {
                Admission::Granted => {
                    tracing::trace!(provider, "Token acquired");
                    return Ok(());
                }
                Admission::Wait(wait) => wait.max(self.settings.min_sleep),
            };

            if now + wait > deadline {
                tracing::warn!(
                    provider,
                    wait_ms = wait.as_millis() as u64,
                    "Token wait exceeds acquisition deadline"
                );
                return Err(GatewayError::rate_limit_exceeded(
                    provider,
                    format!(
                        "no token available within {}s",
                        self.settings.acquire_timeout.as_secs()
                    ),
                ));
            }

            tracing::debug!(provider, wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Applies backoff after the provider throttled us; returns the cooldown
    pub async fn report_throttled(
        &self,
        provider: &str,
        retry_after: Option<Duration>,
    ) -> Result<Duration, GatewayError> {
        let limiter = self.limiter(provider)?;
        let mut bucket = limiter.bucket.lock().await;
        let cooldown = bucket.penalize(self.clock.now(), retry_after);

        tracing::warn!(
            provider,
            backoff_level = bucket.backoff_level(),
            effective_rate = bucket.effective_rate(),
            cooldown_secs = cooldown.as_secs_f64(),
            "Provider throttled, backing off"
        );
        record_throttle(provider);

        Ok(cooldown)
    }

    pub async fn report_success(&self, provider: &str) -> Result<(), GatewayError> {
        let limiter = self.limiter(provider)?;
        let mut bucket = limiter.bucket.lock().await;

        if bucket.backoff_level() > 0 {
            tracing::info!(provider, "Backoff cleared after successful call");
        }
        bucket.reset_backoff(self.clock.now());
        Ok(())
    }

    /// Current state of every registered identity, sorted by provider
    pub async fn snapshot(&self) -> Vec<LimiterSnapshot> {
        let now = self.clock.now();
        let mut snapshots = Vec::with_capacity(self.limiters.len());

        for (provider, limiter) in &self.limiters {
            let bucket = limiter.bucket.lock().await;
            snapshots.push(LimiterSnapshot {
                provider: provider.clone(),
                tokens: bucket.tokens_at(now),
                capacity: bucket.capacity(),
                base_rate: bucket.base_rate(),
                effective_rate: bucket.effective_rate(),
                backoff_level: bucket.backoff_level(),
                cooldown_remaining_secs: bucket.cooldown_remaining(now).as_secs_f64(),
                waiters: limiter.max_waiters - limiter.waiters.available_permits(),
            });
        }

        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }
}
