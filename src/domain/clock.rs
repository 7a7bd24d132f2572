//! Time sources
//!
//! The rate limiter needs a monotonic instant, the cache and the signers need
//! wall-clock time. Both come from one injectable [`Clock`].

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

pub trait Clock: Send + Sync + Debug {
    /// Monotonic instant, follows tokio's paused clock in tests
    fn now(&self) -> Instant;

    /// Wall-clock time elapsed since the Unix epoch
    fn unix_time(&self) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> Duration {
        let micros = chrono::Utc::now().timestamp_micros();
        Duration::from_micros(u64::try_from(micros).unwrap_or_default())
    }
}

/// Clock advanced by hand
///
/// Only suitable for components that read time without sleeping (cache, bucket
/// arithmetic, signers).
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    unix_origin: Duration,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(unix_origin: Duration) -> Self {
        Self {
            origin: Instant::now(),
            unix_origin,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn at_unix_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn unix_time(&self) -> Duration {
        self.unix_origin + self.offset()
    }
}
