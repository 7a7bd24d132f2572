use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use super::GatewayError;

/// Highest accepted requests-per-minute figure for a provider tier
pub const MAX_REQUESTS_PER_MINUTE: u32 = 10_000;

/// Upper bound for the derived burst capacity
const DEFAULT_MAX_BURST: f64 = 5.0;

/// HTTP method of an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    /// Only GET responses are cached
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(GatewayError::config(format!(
                "Unsupported HTTP method '{}'",
                other
            ))),
        }
    }
}

/// Rate-limit tier of a provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTier {
    requests_per_minute: u32,
    capacity: f64,
}

impl RateTier {
    /// Burst capacity defaults to `rpm / 12` clamped into `[1, 5]`
    pub fn new(requests_per_minute: u32, burst: Option<f64>) -> Result<Self, GatewayError> {
        if requests_per_minute == 0 || requests_per_minute > MAX_REQUESTS_PER_MINUTE {
            return Err(GatewayError::config(format!(
                "requests_per_minute must be between 1 and {}, got {}",
                MAX_REQUESTS_PER_MINUTE, requests_per_minute
            )));
        }

        let capacity = match burst {
            Some(burst) if !burst.is_finite() || burst < 1.0 => {
                return Err(GatewayError::config(format!(
                    "burst must be a finite number >= 1, got {}",
                    burst
                )));
            }
            Some(burst) => burst,
            None => (f64::from(requests_per_minute) / 12.0).clamp(1.0, DEFAULT_MAX_BURST),
        };

        Ok(Self {
            requests_per_minute,
            capacity,
        })
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second
    pub fn rate_per_second(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }
}

/// Authentication scheme used by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    HmacSha512,
    JwtEs256 { issuer: String, service: String },
    Bearer,
    ApiKeyHeader { header: String },
}

impl AuthScheme {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::HmacSha512 => "hmac_sha512",
            Self::JwtEs256 { .. } => "jwt_es256",
            Self::Bearer => "bearer",
            Self::ApiKeyHeader { .. } => "api_key_header",
        }
    }
}

/// Shape of successful response bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// Body is the payload
    #[default]
    Plain,
    /// `{"error": [...], "result": ...}`, a non-empty `error` array is a failure
    Kraken,
}

/// A configured upstream provider
#[derive(Debug, Clone)]
pub struct ApiIdentity {
    name: String,
    base_url: Url,
    tier: RateTier,
    auth: AuthScheme,
    envelope: ResponseEnvelope,
}

impl ApiIdentity {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        tier: RateTier,
        auth: AuthScheme,
    ) -> Result<Self, GatewayError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GatewayError::config("Provider name cannot be empty"));
        }

        let base_url = parse_base_url(&name, base_url)?;

        if let AuthScheme::ApiKeyHeader { header } = &auth {
            if header.trim().is_empty() {
                return Err(GatewayError::config(format!(
                    "Provider '{}' has an empty API key header name",
                    name
                )));
            }
        }

        Ok(Self {
            name,
            base_url,
            tier,
            auth,
            envelope: ResponseEnvelope::default(),
        })
    }

    pub fn with_envelope(mut self, envelope: ResponseEnvelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tier(&self) -> &RateTier {
        &self.tier
    }

    pub fn auth(&self) -> &AuthScheme {
        &self.auth
    }

    pub fn envelope(&self) -> ResponseEnvelope {
        self.envelope
    }

    /// Host with an explicit port when one is configured
    pub fn authority(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Base path joined with an already sanitized endpoint
    pub fn full_path(&self, endpoint: &str) -> String {
        let base = self.base_url.path().trim_end_matches('/');
        format!("{}{}", base, endpoint)
    }

    /// Whether `url` stays on this identity's origin and under its base path
    pub fn is_within_base(&self, url: &Url) -> bool {
        let base = self.base_url.path().trim_end_matches('/');
        let path = url.path();

        url.origin() == self.base_url.origin()
            && (path == base || path.starts_with(&format!("{}/", base)))
    }

    pub fn url_for(&self, full_path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(full_path);
        url.set_query(None);
        url
    }
}

fn parse_base_url(name: &str, raw: &str) -> Result<Url, GatewayError> {
    let url = Url::parse(raw).map_err(|e| {
        GatewayError::config(format!("Provider '{}' has an invalid base_url: {}", name, e))
    })?;

    if url.query().is_some() || url.fragment().is_some() {
        return Err(GatewayError::config(format!(
            "Provider '{}' base_url must not carry a query or fragment",
            name
        )));
    }

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        scheme => Err(GatewayError::config(format!(
            "Provider '{}' base_url must use https, got '{}'",
            name, scheme
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}
