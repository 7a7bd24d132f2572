//! Infrastructure layer - signers, limiter, cache, transport and the gateway

pub mod auth;
pub mod cache;
pub mod credentials;
pub mod gateway;
pub mod http;
pub mod logging;
pub mod observability;
pub mod rate_limit;

pub use logging::init_logging;
