use async_trait::async_trait;
use std::collections::HashMap;
use std::env;

use crate::config::{AuthConfig, ProviderConfig};
use crate::domain::{Credential, CredentialSource, GatewayError};

/// Environment variables holding one provider's credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvMapping {
    pub api_key_var: String,
    pub secret_var: Option<String>,
    pub key_name_var: Option<String>,
}

impl EnvMapping {
    pub fn new(api_key_var: impl Into<String>) -> Self {
        Self {
            api_key_var: api_key_var.into(),
            secret_var: None,
            key_name_var: None,
        }
    }

    pub fn with_secret(mut self, var: impl Into<String>) -> Self {
        self.secret_var = Some(var.into());
        self
    }

    pub fn with_key_name(mut self, var: impl Into<String>) -> Self {
        self.key_name_var = Some(var.into());
        self
    }

    /// `None` for providers without authentication
    pub fn for_auth(auth: &AuthConfig) -> Option<Self> {
        match auth {
            AuthConfig::None => None,
            AuthConfig::HmacSha512 {
                api_key_env,
                secret_env,
            } => Some(Self::new(api_key_env).with_secret(secret_env)),
            AuthConfig::JwtEs256 {
                key_id_env,
                key_name_env,
                private_key_env,
                ..
            } => Some(
                Self::new(key_id_env)
                    .with_secret(private_key_env)
                    .with_key_name(key_name_env),
            ),
            AuthConfig::Bearer { api_key_env } | AuthConfig::ApiKeyHeader { api_key_env, .. } => {
                Some(Self::new(api_key_env))
            }
        }
    }
}

/// Credential source that reads from environment variables
#[derive(Debug, Default)]
pub struct EnvCredentialSource {
    mappings: HashMap<String, EnvMapping>,
}

impl EnvCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, provider: impl Into<String>, mapping: EnvMapping) -> Self {
        self.mappings.insert(provider.into(), mapping);
        self
    }

    pub fn from_providers<'a>(providers: impl IntoIterator<Item = (&'a String, &'a ProviderConfig)>) -> Self {
        providers
            .into_iter()
            .filter_map(|(name, provider)| EnvMapping::for_auth(&provider.auth).map(|m| (name, m)))
            .fold(Self::new(), |source, (name, mapping)| source.with_mapping(name.clone(), mapping))
    }

    fn read_credential(&self, provider: &str) -> Result<Option<Credential>, GatewayError> {
        let Some(mapping) = self.mappings.get(provider) else {
            return Ok(None);
        };

        let Ok(api_key) = env::var(&mapping.api_key_var) else {
            return Ok(None);
        };

        let required = |var: &String| {
            env::var(var).map_err(|_| {
                GatewayError::config(format!(
                    "Environment variable '{}' not set for provider '{}'",
                    var, provider
                ))
            })
        };

        let mut credential = Credential::new(provider, api_key);
        if let Some(var) = &mapping.secret_var {
            credential = credential.with_secret(required(var)?);
        }
        if let Some(var) = &mapping.key_name_var {
            credential = credential.with_key_name(required(var)?);
        }

        Ok(Some(credential))
    }
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn get_credential(&self, provider: &str) -> Result<Option<Credential>, GatewayError> {
        self.read_credential(provider)
    }

    fn source_name(&self) -> &'static str {
        "env"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::env;

    #[tokio::test]
    async fn test_env_source_with_set_variables() {
        // SAFETY: Test runs in isolation
        unsafe {
            env::set_var("TEST_GW_KRAKEN_KEY", "kraken-key");
            env::set_var("TEST_GW_KRAKEN_SECRET", "c2VjcmV0");
        }

        let source = EnvCredentialSource::new().with_mapping(
            "kraken",
            EnvMapping::new("TEST_GW_KRAKEN_KEY").with_secret("TEST_GW_KRAKEN_SECRET"),
        );

        let cred = source.get_credential("kraken").await.unwrap().unwrap();
        assert_eq!(cred.api_key(), "kraken-key");
        assert_eq!(cred.secret(), Some("c2VjcmV0"));

        // SAFETY: Test cleanup
        unsafe {
            env::remove_var("TEST_GW_KRAKEN_KEY");
            env::remove_var("TEST_GW_KRAKEN_SECRET");
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_is_none() {
        let source = EnvCredentialSource::new()
            .with_mapping("coindesk", EnvMapping::new("NONEXISTENT_GW_VAR_12345"));

        assert!(source.get_credential("coindesk").await.unwrap().is_none());
        assert!(source.get_credential("unmapped").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_credential_is_config_error() {
        // SAFETY: Test runs in isolation
        unsafe { env::set_var("TEST_GW_COINBASE_KID", "kid") };

        let source = EnvCredentialSource::new().with_mapping(
            "coinbase",
            EnvMapping::new("TEST_GW_COINBASE_KID")
                .with_secret("NONEXISTENT_GW_PEM_67890")
                .with_key_name("NONEXISTENT_GW_NAME_67890"),
        );

        let result = source.get_credential("coinbase").await;
        assert!(matches!(result, Err(GatewayError::Config { .. })));

        // SAFETY: Test cleanup
        unsafe { env::remove_var("TEST_GW_COINBASE_KID") };
    }

    #[test]
    fn test_mappings_from_default_providers() {
        let config = AppConfig::default();
        let source = EnvCredentialSource::from_providers(&config.providers);

        assert_eq!(
            source.mappings.get("kraken"),
            Some(&EnvMapping::new("KRAKEN_API_KEY").with_secret("KRAKEN_PRIVATE_KEY"))
        );
        assert_eq!(
            source.mappings.get("coinbase"),
            Some(
                &EnvMapping::new("COINBASE_KEY_ID")
                    .with_secret("COINBASE_PRIVATE_KEY")
                    .with_key_name("COINBASE_API_KEY_NAME")
            )
        );
        assert_eq!(
            source.mappings.get("coingecko"),
            Some(&EnvMapping::new("COINGECKO_API_KEY"))
        );
    }
}
