//! Response cache domain

mod key;
mod repository;

pub use key::{CacheKey, TtlClass, TtlPolicy};
pub use repository::{CacheStats, ResponseCache};
