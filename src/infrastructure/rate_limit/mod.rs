//! Token bucket rate limiting with throttling backoff

mod limiter;
mod token_bucket;

pub use limiter::RateLimiter;
pub use token_bucket::{Admission, TokenBucket};
