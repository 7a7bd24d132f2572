//! Token bucket with throttling backoff
//!
//! Pure state machine: every method takes the current instant, nothing sleeps.

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{BackoffConfig, RateTier};

/// Outcome of one admission attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Granted,
    /// Earliest time from now a retry may succeed
    Wait(Duration),
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    base_rate: f64,
    last_refill: Instant,
    backoff_level: u32,
    cooldown_until: Option<Instant>,
    backoff: BackoffConfig,
}

impl TokenBucket {
    /// Starts full
    pub fn new(tier: &RateTier, backoff: BackoffConfig, now: Instant) -> Self {
        Self {
            tokens: tier.capacity(),
            capacity: tier.capacity(),
            base_rate: tier.rate_per_second(),
            last_refill: now,
            backoff_level: 0,
            cooldown_until: None,
            backoff,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn base_rate(&self) -> f64 {
        self.base_rate
    }

    pub fn backoff_level(&self) -> u32 {
        self.backoff_level
    }

    /// Tokens per second after backoff
    pub fn effective_rate(&self) -> f64 {
        let exponent = i32::try_from(self.backoff_level).unwrap_or(i32::MAX);
        self.base_rate * self.backoff.rate_factor.powi(exponent)
    }

    /// Token count as of `now`, without mutating
    pub fn tokens_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.effective_rate()).min(self.capacity)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    fn refill(&mut self, now: Instant) {
        self.tokens = self.tokens_at(now);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    pub fn try_acquire(&mut self, now: Instant) -> Admission {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return Admission::Wait(until - now);
            }
            self.cooldown_until = None;
        }

        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Admission::Granted;
        }

        let deficit = 1.0 - self.tokens;
        Admission::Wait(Duration::from_secs_f64(deficit / self.effective_rate()))
    }

    /// Raises the backoff level, drains the bucket and starts a cooldown.
    /// Refill resumes only once the cooldown ends. Returns the cooldown applied.
    pub fn penalize(&mut self, now: Instant, retry_after: Option<Duration>) -> Duration {
        self.refill(now);
        self.backoff_level = (self.backoff_level + 1).min(self.backoff.max_level);

        let cooldown = match retry_after {
            Some(retry_after) => retry_after.min(self.backoff.max_cooldown),
            None => self.backoff.cooldown_for_level(self.backoff_level),
        };

        self.tokens = 0.0;
        self.cooldown_until = Some(now + cooldown);
        self.last_refill = self.last_refill.max(now + cooldown);
        cooldown
    }

    /// Clears backoff after a successful call
    pub fn reset_backoff(&mut self, now: Instant) {
        self.refill(now);
        self.last_refill = self.last_refill.min(now);
        self.backoff_level = 0;
        self.cooldown_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(rpm: u32, burst: Option<f64>, now: Instant) -> TokenBucket {
        TokenBucket::new(
            &RateTier::new(rpm, burst).unwrap(),
            BackoffConfig::default(),
            now,
        )
    }

    #[test]
    fn test_starts_full_and_drains() {
        let now = Instant::now();
        let mut bucket = bucket(60, Some(3.0), now);

        assert_eq!(bucket.try_acquire(now), Admission::Granted);
        assert_eq!(bucket.try_acquire(now), Admission::Granted);
        assert_eq!(bucket.try_acquire(now), Admission::Granted);
        assert_eq!(bucket.try_acquire(now), Admission::Wait(Duration::from_secs(1)));
    }

    #[test]
    fn test_refill_is_lazy_and_capped() {
        let start = Instant::now();
        let mut bucket = bucket(60, Some(2.0), start);
        bucket.try_acquire(start);
        bucket.try_acquire(start);

        let later = start + Duration::from_millis(500);
        assert!((bucket.tokens_at(later) - 0.5).abs() < 1e-9);

        let much_later = start + Duration::from_secs(3600);
        assert_eq!(bucket.tokens_at(much_later), 2.0);
    }

    #[test]
    fn test_admission_bound_over_window() {
        // capacity 5, 1 token/s: window of 4.9s admits at most 5 + 4.9
        let start = Instant::now();
        let mut bucket = bucket(60, Some(5.0), start);

        let mut granted = 0;
        for step in 0..=490u64 {
            let now = start + Duration::from_millis(step * 10);
            while bucket.try_acquire(now) == Admission::Granted {
                granted += 1;
            }
        }

        assert!(granted <= 9, "granted {}", granted);
        assert!(granted >= 8, "granted {}", granted);
    }

    #[test]
    fn test_penalize_halves_rate_and_sets_cooldown() {
        let now = Instant::now();
        let mut bucket = bucket(60, None, now);

        let cooldown = bucket.penalize(now, None);

        assert_eq!(cooldown, Duration::from_secs(60));
        assert_eq!(bucket.backoff_level(), 1);
        assert_eq!(bucket.effective_rate(), 0.5);
        assert_eq!(bucket.try_acquire(now), Admission::Wait(Duration::from_secs(60)));
        assert_eq!(bucket.cooldown_remaining(now + Duration::from_secs(20)), Duration::from_secs(40));

        let second = bucket.penalize(now, None);
        assert_eq!(second, Duration::from_secs(120));
        assert_eq!(bucket.effective_rate(), 0.25);
    }

    #[test]
    fn test_retry_after_overrides_cooldown() {
        let now = Instant::now();
        let mut bucket = bucket(60, None, now);

        assert_eq!(bucket.penalize(now, Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(
            bucket.penalize(now, Some(Duration::from_secs(3600))),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_backoff_level_is_capped() {
        let now = Instant::now();
        let mut bucket = bucket(60, None, now);

        for _ in 0..20 {
            bucket.penalize(now, Some(Duration::ZERO));
        }

        assert_eq!(bucket.backoff_level(), BackoffConfig::default().max_level);
        assert!(bucket.effective_rate() > 0.0);
    }

    #[test]
    fn test_reset_restores_rate() {
        let now = Instant::now();
        let mut bucket = bucket(60, None, now);
        bucket.penalize(now, None);

        bucket.reset_backoff(now);

        assert_eq!(bucket.backoff_level(), 0);
        assert_eq!(bucket.effective_rate(), 1.0);
        assert_eq!(bucket.cooldown_remaining(now), Duration::ZERO);
        assert!((bucket.tokens_at(now + Duration::from_secs(1)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_grants_after_cooldown_elapses() {
        let now = Instant::now();
        let mut bucket = bucket(60, None, now);
        bucket.penalize(now, Some(Duration::from_secs(4)));

        // Nothing accrues during the cooldown, then 0.5 tokens/s
        assert_eq!(bucket.tokens_at(now + Duration::from_secs(4)), 0.0);
        let after = now + Duration::from_secs(4);
        assert_eq!(bucket.try_acquire(after), Admission::Wait(Duration::from_secs(2)));
        assert_eq!(bucket.try_acquire(after + Duration::from_secs(2)), Admission::Granted);
    }
}
