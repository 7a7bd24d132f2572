//! Gateway composition: provider registry, endpoint sanitizing and the call pipeline

mod registry;
mod sanitize;
mod service;

pub use registry::{ProviderEntry, ProviderRegistry, ProviderSummary};
pub use sanitize::sanitize_endpoint;
pub use service::{Gateway, GatewayBuilder, GatewayRequest, GatewayStats};
