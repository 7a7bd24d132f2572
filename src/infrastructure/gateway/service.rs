//! The gateway: sanitize, cache, admit, sign, send, decode

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

use super::registry::{ProviderEntry, ProviderRegistry, ProviderSummary};
use super::sanitize::sanitize_endpoint;
use crate::domain::{
    AuthScheme, CacheKey, CacheStats, Clock, GatewayError, HttpMethod, LimiterSettings, LimiterSnapshot,
    RequestSigner, ResponseCache, ResponseEnvelope, SignedRequest, SystemClock, TtlClass,
    TtlPolicy, UnsignedRequest,
};
use crate::infrastructure::cache::{InMemoryCacheConfig, InMemoryResponseCache};
use crate::infrastructure::http::{HttpResponse, HttpTransport, TransportError};
use crate::infrastructure::observability::{
    GatewayCallMetricParams, record_cache_lookup, record_gateway_call,
};
use crate::infrastructure::rate_limit::RateLimiter;

/// One outbound call
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub provider: String,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub method: HttpMethod,
    pub auth_required: bool,
}

impl GatewayRequest {
    pub fn new(provider: impl Into<String>, endpoint: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            method,
            auth_required: false,
        }
    }

    pub fn get(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(provider, endpoint, HttpMethod::Get)
    }

    pub fn post(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(provider, endpoint, HttpMethod::Post)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.auth_required = true;
        self
    }
}

/// Snapshot of cache and limiter state
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub cache: CacheStats,
    pub rate_limits: Vec<LimiterSnapshot>,
}

/// Identical cacheable calls queue behind the first, which fills the cache
#[derive(Debug, Default)]
struct InFlight {
    calls: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InFlight {
    async fn join(self: &Arc<Self>, fingerprint: &str) -> FlightGuard {
        let slot = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(calls.entry(fingerprint.to_string()).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;

        FlightGuard {
            in_flight: Arc::clone(self),
            fingerprint: fingerprint.to_string(),
            slot,
            _guard: guard,
        }
    }
}

struct FlightGuard {
    in_flight: Arc<InFlight>,
    fingerprint: String,
    slot: Arc<tokio::sync::Mutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut calls = self
            .in_flight
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // The map, `slot` and the held guard; anything more is a queued caller
        let idle = Arc::strong_count(&self.slot) <= 3;
        let current = calls
            .get(&self.fingerprint)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot));
        if idle && current {
            calls.remove(&self.fingerprint);
        }
    }
}

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    registry: ProviderRegistry,
    transport: Option<Arc<dyn HttpTransport>>,
    cache: Option<Arc<dyn ResponseCache>>,
    clock: Arc<dyn Clock>,
    limiter_settings: LimiterSettings,
    ttl_policy: TtlPolicy,
}

impl GatewayBuilder {
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn limiter_settings(mut self, settings: LimiterSettings) -> Self {
        self.limiter_settings = settings;
        self
    }

    pub fn ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    pub fn build(self) -> Result<Gateway, GatewayError> {
        let transport = self
            .transport
            .ok_or_else(|| GatewayError::config("Gateway requires an HTTP transport"))?;

        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(InMemoryResponseCache::new(
                InMemoryCacheConfig::default(),
                Arc::clone(&self.clock),
            )?),
        };

        let mut limiter = RateLimiter::new(self.limiter_settings, Arc::clone(&self.clock));
        for entry in self.registry.entries() {
            limiter.register(entry.identity(), entry.backoff());
        }

        Ok(Gateway {
            registry: self.registry,
            limiter,
            cache,
            transport,
            clock: self.clock,
            ttl_policy: self.ttl_policy,
            in_flight: Arc::default(),
        })
    }
}

/// Rate-limited, cached, authenticated access to the registered providers
///
/// `Send + Sync`; share it through an `Arc`.
pub struct Gateway {
    registry: ProviderRegistry,
    limiter: RateLimiter,
    cache: Arc<dyn ResponseCache>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    ttl_policy: TtlPolicy,
    in_flight: Arc<InFlight>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("ttl_policy", &self.ttl_policy)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn builder(registry: ProviderRegistry) -> GatewayBuilder {
        GatewayBuilder {
            registry,
            transport: None,
            cache: None,
            clock: Arc::new(SystemClock),
            limiter_settings: LimiterSettings::default(),
            ttl_policy: TtlPolicy::default(),
        }
    }

    pub async fn call(
        &self,
        provider: &str,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        method: HttpMethod,
        auth_required: bool,
    ) -> Result<Value, GatewayError> {
        self.call_request(GatewayRequest {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            params: params.clone(),
            method,
            auth_required,
        })
        .await
    }

    pub async fn call_request(&self, request: GatewayRequest) -> Result<Value, GatewayError> {
        let started = std::time::Instant::now();
        let result = self.execute(&request).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(error) => error.kind(),
        };
        record_gateway_call(GatewayCallMetricParams {
            provider: &request.provider,
            endpoint: &request.endpoint,
            outcome,
            duration: started.elapsed(),
        });

        if let Err(error) = &result {
            tracing::debug!(
                provider = %request.provider,
                endpoint = %request.endpoint,
                kind = error.kind(),
                "Gateway call failed"
            );
        }

        result
    }

    async fn execute(&self, request: &GatewayRequest) -> Result<Value, GatewayError> {
        let entry = self.registry.get(&request.provider)?;
        let provider = entry.identity().name();
        let endpoint = sanitize_endpoint(&request.endpoint)?;

        let mut _flight = None;
        let cache_slot = if request.method.is_cacheable() {
            let class = self.ttl_policy.classify(&endpoint);
            let key = CacheKey::new(provider, &endpoint, &request.params, class, self.clock.unix_time());
            _flight = Some(self.in_flight.join(key.fingerprint()).await);

            if let Some(payload) = self.cache.get(&key).await {
                record_cache_lookup(provider, true);
                tracing::debug!(provider, endpoint = %endpoint, "Cache hit");
                return Ok(payload);
            }
            record_cache_lookup(provider, false);
            Some((key, class))
        } else {
            None
        };

        let unsigned = UnsignedRequest {
            method: request.method,
            host: entry.identity().authority(),
            path: entry.identity().full_path(&endpoint),
            params: request.params.clone(),
        };
        let url = entry.identity().url_for(&unsigned.path);
        if !entry.identity().is_within_base(&url) {
            tracing::warn!(provider, endpoint = %endpoint, "Endpoint resolves outside the base path");
            return Err(GatewayError::invalid_endpoint(
                "endpoint resolves outside the provider base path",
            ));
        }

        self.limiter.acquire(provider).await?;
        let signed = self.prepare(entry, &unsigned, request.auth_required)?;

        tracing::debug!(provider, endpoint = %endpoint, method = %request.method, "Sending request");
        let response = self
            .transport
            .send(url, signed)
            .await
            .map_err(|e| map_transport_error(e, provider, &endpoint))?;

        let payload = self.handle_response(entry, &endpoint, response).await?;
        self.limiter.report_success(provider).await?;

        if let Some((key, class)) = cache_slot {
            self.store(&key, &payload, class).await;
        }

        Ok(payload)
    }

    /// Signs when asked to; never falls back to an unsigned request
    fn prepare(
        &self,
        entry: &ProviderEntry,
        unsigned: &UnsignedRequest,
        auth_required: bool,
    ) -> Result<SignedRequest, GatewayError> {
        if !auth_required {
            return Ok(SignedRequest::unsigned(unsigned));
        }

        let provider = entry.identity().name();
        if matches!(entry.identity().auth(), AuthScheme::None) {
            return Err(GatewayError::config(format!(
                "Provider '{}' does not support authenticated calls",
                provider
            )));
        }

        let signer = entry.signer().ok_or_else(|| {
            GatewayError::config(format!(
                "Credentials for provider '{}' are not configured",
                provider
            ))
        })?;

        signer.sign(unsigned, self.clock.unix_time())
    }

    async fn handle_response(
        &self,
        entry: &ProviderEntry,
        endpoint: &str,
        response: HttpResponse,
    ) -> Result<Value, GatewayError> {
        let provider = entry.identity().name();

        match response.status {
            200..=299 => {}
            429 => {
                self.limiter
                    .report_throttled(provider, response.retry_after)
                    .await?;
                return Err(GatewayError::throttled(provider, endpoint, response.retry_after));
            }
            401 | 403 => {
                tracing::warn!(provider, endpoint, status = response.status, "Provider rejected credentials");
                return Err(GatewayError::auth(
                    provider,
                    format!("provider rejected the request (HTTP {})", response.status),
                ));
            }
            status => {
                tracing::warn!(provider, endpoint, status, "Unexpected HTTP status");
                return Err(GatewayError::http_status(provider, endpoint, status));
            }
        }

        let payload: Value = serde_json::from_slice(&response.body)
            .map_err(|e| GatewayError::decode(provider, endpoint, format!("malformed JSON: {}", e)))?;

        if entry.identity().envelope() == ResponseEnvelope::Kraken {
            self.check_kraken_envelope(provider, endpoint, &payload).await?;
        }

        Ok(payload)
    }

    /// A non-empty `error` array is a failure even on HTTP 200
    async fn check_kraken_envelope(
        &self,
        provider: &str,
        endpoint: &str,
        payload: &Value,
    ) -> Result<(), GatewayError> {
        let errors: Vec<&str> = payload
            .get("error")
            .and_then(Value::as_array)
            .map(|errors| errors.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if errors.is_empty() {
            return Ok(());
        }

        if errors
            .iter()
            .any(|e| e.to_ascii_lowercase().contains("rate limit"))
        {
            self.limiter.report_throttled(provider, None).await?;
            return Err(GatewayError::throttled(provider, endpoint, None));
        }

        Err(GatewayError::provider(provider, endpoint, errors.join("; ")))
    }

    async fn store(&self, key: &CacheKey, payload: &Value, class: TtlClass) {
        self.cache.put(key, payload.clone(), class).await;
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            cache: self.cache.stats().await,
            rate_limits: self.limiter.snapshot().await,
        }
    }

    pub fn providers(&self) -> Vec<ProviderSummary> {
        self.registry.summaries()
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}

fn map_transport_error(error: TransportError, provider: &str, endpoint: &str) -> GatewayError {
    match error {
        TransportError::Timeout => GatewayError::timeout(provider, endpoint),
        TransportError::TooLarge { size, limit } => GatewayError::decode(
            provider,
            endpoint,
            format!("response of {} bytes exceeds limit of {} bytes", size, limit),
        ),
        TransportError::Body(message) => GatewayError::decode(provider, endpoint, message),
        TransportError::Connect(message) | TransportError::Request(message) => {
            GatewayError::transport(provider, endpoint, message)
        }
    }
}
