//! Rate limiting configuration and state snapshots

use std::time::Duration;

use serde::Serialize;

use super::GatewayError;

/// Hard ceiling for the acquisition deadline
pub const MAX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(300);

/// Backoff applied when a provider throttles us
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_cooldown: Duration,
    pub max_cooldown: Duration,
    /// Multiplier applied to the refill rate per backoff level
    pub rate_factor: f64,
    pub max_level: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(300),
            rate_factor: 0.5,
            max_level: 5,
        }
    }
}

impl BackoffConfig {
    pub fn with_cooldowns(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_cooldown = initial;
        self.max_cooldown = max;
        self
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if !(self.rate_factor > 0.0 && self.rate_factor <= 1.0) {
            return Err(GatewayError::config(format!(
                "backoff rate_factor must be in (0, 1], got {}",
                self.rate_factor
            )));
        }
        if self.initial_cooldown > self.max_cooldown {
            return Err(GatewayError::config(
                "backoff initial_cooldown cannot exceed max_cooldown",
            ));
        }
        Ok(())
    }

    /// Cooldown for a level when the provider sent no Retry-After
    pub fn cooldown_for_level(&self, level: u32) -> Duration {
        let exponent = level.saturating_sub(1).min(16);
        self.initial_cooldown
            .saturating_mul(1u32 << exponent)
            .min(self.max_cooldown)
    }
}

/// Limiter-wide settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSettings {
    /// Bound on tasks waiting per identity
    pub max_waiters: usize,
    pub acquire_timeout: Duration,
    /// Shortest sleep between admission attempts
    pub min_sleep: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_waiters: 100,
            acquire_timeout: Duration::from_secs(30),
            min_sleep: Duration::from_millis(10),
        }
    }
}

impl LimiterSettings {
    pub fn with_max_waiters(mut self, max_waiters: usize) -> Self {
        self.max_waiters = max_waiters;
        self
    }

    /// Clamped to [`MAX_ACQUIRE_TIMEOUT`]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        if timeout > MAX_ACQUIRE_TIMEOUT {
            tracing::warn!(
                requested_secs = timeout.as_secs(),
                max_secs = MAX_ACQUIRE_TIMEOUT.as_secs(),
                "Acquire timeout capped"
            );
        }
        self.acquire_timeout = timeout.min(MAX_ACQUIRE_TIMEOUT);
        self
    }
}

/// Point-in-time view of one identity's limiter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterSnapshot {
    pub provider: String,
    pub tokens: f64,
    pub capacity: f64,
    pub base_rate: f64,
    pub effective_rate: f64,
    pub backoff_level: u32,
    pub cooldown_remaining_secs: f64,
    pub waiters: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_doubles_and_caps() {
        let backoff = BackoffConfig::default();

        assert_eq!(backoff.cooldown_for_level(1), Duration::from_secs(60));
        assert_eq!(backoff.cooldown_for_level(2), Duration::from_secs(120));
        assert_eq!(backoff.cooldown_for_level(3), Duration::from_secs(240));
        assert_eq!(backoff.cooldown_for_level(4), Duration::from_secs(300));
        assert_eq!(backoff.cooldown_for_level(40), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_validation() {
        assert!(BackoffConfig::default().validate().is_ok());

        let bad_factor = BackoffConfig {
            rate_factor: 0.0,
            ..BackoffConfig::default()
        };
        assert!(bad_factor.validate().is_err());

        let inverted = BackoffConfig::default()
            .with_cooldowns(Duration::from_secs(10), Duration::from_secs(1));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_acquire_timeout_is_capped() {
        let settings = LimiterSettings::default().with_acquire_timeout(Duration::from_secs(900));
        assert_eq!(settings.acquire_timeout, MAX_ACQUIRE_TIMEOUT);
    }
}
