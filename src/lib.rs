//! Crypto API Gateway
//!
//! Signed, rate-limited and cached access to exchange and price-data APIs:
//! - Per-provider request signing (HMAC-SHA512, ES256 JWT, bearer and header API keys)
//! - Token bucket admission with backoff when a provider throttles
//! - LRU response cache with endpoint-based TTL classes

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::GatewayError;
pub use infrastructure::gateway::{Gateway, GatewayRequest, GatewayStats};

use std::sync::Arc;

use domain::{Clock, CredentialSource, SystemClock};
use infrastructure::cache::{InMemoryCacheConfig, InMemoryResponseCache};
use infrastructure::credentials::EnvCredentialSource;
use infrastructure::gateway::ProviderRegistry;
use infrastructure::http::{HttpClientConfig, ReqwestTransport};

/// Builds a gateway with credentials read from the environment
pub async fn create_gateway(config: &AppConfig) -> Result<Gateway, GatewayError> {
    let source = EnvCredentialSource::from_providers(&config.providers);
    create_gateway_with_source(config, &source).await
}

pub async fn create_gateway_with_source(
    config: &AppConfig,
    source: &dyn CredentialSource,
) -> Result<Gateway, GatewayError> {
    let settings = &config.gateway;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry = ProviderRegistry::from_config(config, source).await?;

    let transport = ReqwestTransport::new(&HttpClientConfig {
        timeout: settings.request_timeout()?,
        max_response_bytes: settings.max_response_bytes,
        user_agent: settings.user_agent.clone(),
    })?;

    let cache = InMemoryResponseCache::new(
        InMemoryCacheConfig::default().with_max_capacity(settings.cache_capacity),
        Arc::clone(&clock),
    )?;

    let gateway = Gateway::builder(registry)
        .transport(Arc::new(transport))
        .cache(Arc::new(cache))
        .clock(clock)
        .limiter_settings(settings.limiter_settings()?)
        .ttl_policy(settings.cache_ttl.clone())
        .build()?;

    tracing::info!(
        providers = gateway.providers().len(),
        cache_capacity = settings.cache_capacity,
        "Gateway initialized"
    );

    Ok(gateway)
}
