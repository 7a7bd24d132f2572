use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{
    ApiIdentity, AuthScheme, BackoffConfig, GatewayError, LimiterSettings, RateTier,
    ResponseEnvelope, TtlPolicy,
};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Gateway-wide limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub request_timeout_secs: u64,
    pub max_response_bytes: u64,
    pub cache_capacity: usize,
    pub acquire_timeout_secs: u64,
    pub max_waiters: usize,
    pub user_agent: String,
    pub cache_ttl: TtlPolicy,
}

/// One upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    pub requests_per_minute: u32,
    #[serde(default)]
    pub burst: Option<f64>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub envelope: ResponseEnvelope,
    #[serde(default)]
    pub backoff: BackoffSettings,
    /// Fail at startup when the credentials are absent
    #[serde(default)]
    pub require_credentials: bool,
}

/// Authentication scheme plus the environment variables holding its secrets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    HmacSha512 {
        api_key_env: String,
        secret_env: String,
    },
    JwtEs256 {
        key_id_env: String,
        key_name_env: String,
        private_key_env: String,
        #[serde(default = "default_jwt_issuer")]
        issuer: String,
        #[serde(default = "default_jwt_service")]
        service: String,
    },
    Bearer {
        api_key_env: String,
    },
    ApiKeyHeader {
        header: String,
        api_key_env: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub initial_cooldown_secs: u64,
    pub max_cooldown_secs: u64,
    pub rate_factor: f64,
    pub max_level: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_jwt_issuer() -> String {
    "coinbase-cloud".to_string()
}

fn default_jwt_service() -> String {
    "retail_rest_api_proxy".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            gateway: GatewaySettings::default(),
            providers: default_providers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_response_bytes: 10 * 1024 * 1024,
            cache_capacity: 1000,
            acquire_timeout_secs: 30,
            max_waiters: 100,
            user_agent: concat!("crypto-api-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
            cache_ttl: TtlPolicy::default(),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            initial_cooldown_secs: backoff.initial_cooldown.as_secs(),
            max_cooldown_secs: backoff.max_cooldown.as_secs(),
            rate_factor: backoff.rate_factor,
            max_level: backoff.max_level,
        }
    }
}

/// Kraken, Coinbase, CoinDesk and CoinGecko with their published limits
pub fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let provider = |base_url: &str, rpm: u32, auth: AuthConfig| ProviderConfig {
        enabled: true,
        base_url: base_url.to_string(),
        requests_per_minute: rpm,
        burst: None,
        auth,
        envelope: ResponseEnvelope::Plain,
        backoff: BackoffSettings::default(),
        require_credentials: false,
    };

    let mut providers = BTreeMap::new();
    providers.insert(
        "kraken".to_string(),
        ProviderConfig {
            envelope: ResponseEnvelope::Kraken,
            ..provider(
                "https://api.kraken.com",
                15,
                AuthConfig::HmacSha512 {
                    api_key_env: "KRAKEN_API_KEY".to_string(),
                    secret_env: "KRAKEN_PRIVATE_KEY".to_string(),
                },
            )
        },
    );
    providers.insert(
        "coinbase".to_string(),
        provider(
            "https://api.coinbase.com",
            10,
            AuthConfig::JwtEs256 {
                key_id_env: "COINBASE_KEY_ID".to_string(),
                key_name_env: "COINBASE_API_KEY_NAME".to_string(),
                private_key_env: "COINBASE_PRIVATE_KEY".to_string(),
                issuer: default_jwt_issuer(),
                service: default_jwt_service(),
            },
        ),
    );
    providers.insert(
        "coindesk".to_string(),
        provider(
            "https://data-api.coindesk.com",
            50,
            AuthConfig::Bearer {
                api_key_env: "COINDESK_API_KEY".to_string(),
            },
        ),
    );
    providers.insert(
        "coingecko".to_string(),
        provider(
            "https://api.coingecko.com/api/v3",
            30,
            AuthConfig::ApiKeyHeader {
                header: "x-cg-demo-api-key".to_string(),
                api_key_env: "COINGECKO_API_KEY".to_string(),
            },
        ),
    );
    providers
}

impl AppConfig {
    /// Defaults, then `config/default.*`, `config/local.*`, then `GATEWAY__*`
    /// environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())?;

        let config = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Enabled providers only
    pub fn enabled_providers(&self) -> impl Iterator<Item = (&String, &ProviderConfig)> {
        self.providers.iter().filter(|(_, provider)| provider.enabled)
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Result<Duration, GatewayError> {
        if self.request_timeout_secs == 0 {
            return Err(GatewayError::config("gateway.request_timeout_secs must be positive"));
        }
        Ok(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn limiter_settings(&self) -> Result<LimiterSettings, GatewayError> {
        if self.acquire_timeout_secs == 0 {
            return Err(GatewayError::config("gateway.acquire_timeout_secs must be positive"));
        }
        if self.max_waiters == 0 {
            return Err(GatewayError::config("gateway.max_waiters must be positive"));
        }

        Ok(LimiterSettings::default()
            .with_max_waiters(self.max_waiters)
            .with_acquire_timeout(Duration::from_secs(self.acquire_timeout_secs)))
    }
}

impl AuthConfig {
    pub fn scheme(&self) -> AuthScheme {
        match self {
            Self::None => AuthScheme::None,
            Self::HmacSha512 { .. } => AuthScheme::HmacSha512,
            Self::JwtEs256 {
                issuer, service, ..
            } => AuthScheme::JwtEs256 {
                issuer: issuer.clone(),
                service: service.clone(),
            },
            Self::Bearer { .. } => AuthScheme::Bearer,
            Self::ApiKeyHeader { header, .. } => AuthScheme::ApiKeyHeader {
                header: header.clone(),
            },
        }
    }
}

impl BackoffSettings {
    pub fn to_backoff(&self) -> Result<BackoffConfig, GatewayError> {
        let backoff = BackoffConfig {
            initial_cooldown: Duration::from_secs(self.initial_cooldown_secs),
            max_cooldown: Duration::from_secs(self.max_cooldown_secs),
            rate_factor: self.rate_factor,
            max_level: self.max_level,
        };
        backoff.validate()?;
        Ok(backoff)
    }
}

impl ProviderConfig {
    pub fn to_identity(&self, name: &str) -> Result<ApiIdentity, GatewayError> {
        let tier = RateTier::new(self.requests_per_minute, self.burst)
            .map_err(|e| GatewayError::config(format!("Provider '{}': {}", name, e)))?;

        Ok(ApiIdentity::new(name, &self.base_url, tier, self.auth.scheme())?.with_envelope(self.envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers() {
        let config = AppConfig::default();

        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.providers["kraken"].requests_per_minute, 15);
        assert_eq!(config.providers["coinbase"].requests_per_minute, 10);
        assert_eq!(config.providers["coindesk"].requests_per_minute, 50);
        assert_eq!(config.providers["coingecko"].requests_per_minute, 30);
        assert_eq!(config.providers["kraken"].envelope, ResponseEnvelope::Kraken);
    }

    #[test]
    fn test_default_providers_build_identities() {
        let config = AppConfig::default();

        for (name, provider) in config.enabled_providers() {
            let identity = provider.to_identity(name).unwrap();
            assert_eq!(identity.name(), name);
            assert_eq!(identity.base_url().scheme(), "https");
        }
    }

    #[test]
    fn test_invalid_provider_is_config_error() {
        let mut provider = AppConfig::default().providers["coindesk"].clone();
        provider.requests_per_minute = 0;
        assert!(matches!(provider.to_identity("coindesk"), Err(GatewayError::Config { .. })));

        provider.requests_per_minute = 50;
        provider.base_url = "http://data-api.coindesk.com".to_string();
        assert!(provider.to_identity("coindesk").is_err());
    }

    #[test]
    fn test_auth_config_deserializes_tagged() {
        let json = serde_json::json!({
            "scheme": "api_key_header",
            "header": "x-api-key",
            "api_key_env": "MY_KEY"
        });
        let auth: AuthConfig = serde_json::from_value(json).unwrap();

        assert_eq!(
            auth.scheme(),
            AuthScheme::ApiKeyHeader {
                header: "x-api-key".to_string()
            }
        );

        let jwt: AuthConfig = serde_json::from_value(serde_json::json!({
            "scheme": "jwt_es256",
            "key_id_env": "A",
            "key_name_env": "B",
            "private_key_env": "C"
        }))
        .unwrap();
        assert_eq!(
            jwt.scheme(),
            AuthScheme::JwtEs256 {
                issuer: "coinbase-cloud".to_string(),
                service: "retail_rest_api_proxy".to_string()
            }
        );
    }

    #[test]
    fn test_backoff_settings_validation() {
        let mut settings = BackoffSettings::default();
        assert_eq!(settings.to_backoff().unwrap(), BackoffConfig::default());

        settings.rate_factor = 1.5;
        assert!(settings.to_backoff().is_err());
    }

    #[test]
    fn test_gateway_settings_validation() {
        let mut settings = GatewaySettings::default();
        assert_eq!(settings.request_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(settings.limiter_settings().unwrap().max_waiters, 100);

        settings.max_waiters = 0;
        assert!(settings.limiter_settings().is_err());

        settings.request_timeout_secs = 0;
        assert!(settings.request_timeout().is_err());
    }

    #[test]
    fn test_load_merges_defaults() {
        let config = AppConfig::load().unwrap();
        assert!(config.providers.contains_key("kraken"));
        assert_eq!(config.gateway.cache_capacity, 1000);
    }
}
