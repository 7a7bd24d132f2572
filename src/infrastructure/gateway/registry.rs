//! Provider registry: identities, their signers and backoff settings

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::AppConfig;
use crate::domain::{ApiIdentity, BackoffConfig, CredentialSource, GatewayError, RequestSigner};
use crate::infrastructure::auth::{SchemeSigner, build_signer};

#[derive(Debug)]
pub struct ProviderEntry {
    identity: ApiIdentity,
    signer: Option<SchemeSigner>,
    backoff: BackoffConfig,
}

impl ProviderEntry {
    pub fn new(identity: ApiIdentity) -> Self {
        Self {
            identity,
            signer: None,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_signer(mut self, signer: SchemeSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn identity(&self) -> &ApiIdentity {
        &self.identity
    }

    pub fn signer(&self) -> Option<&SchemeSigner> {
        self.signer.as_ref()
    }

    pub fn backoff(&self) -> BackoffConfig {
        self.backoff
    }
}

/// Listing entry for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub base_url: String,
    pub auth_scheme: String,
    pub requests_per_minute: u32,
    pub burst: f64,
    pub credentials_loaded: bool,
}

/// Immutable after construction
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: BTreeMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: ProviderEntry) -> Result<(), GatewayError> {
        let name = entry.identity.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(GatewayError::config(format!(
                "Provider '{}' is registered twice",
                name
            )));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    pub fn with_entry(mut self, entry: ProviderEntry) -> Result<Self, GatewayError> {
        self.register(entry)?;
        Ok(self)
    }

    /// Builds every enabled provider, loading credentials from `source`
    pub async fn from_config(
        config: &AppConfig,
        source: &dyn CredentialSource,
    ) -> Result<Self, GatewayError> {
        let mut registry = Self::new();

        for (name, provider) in config.enabled_providers() {
            let identity = provider.to_identity(name)?;
            let mut entry = ProviderEntry::new(identity).with_backoff(provider.backoff.to_backoff()?);

            match source.get_credential(name).await? {
                Some(credential) => {
                    if let Some(signer) = build_signer(entry.identity(), &credential)? {
                        entry = entry.with_signer(signer);
                    }
                }
                None if provider.require_credentials => {
                    return Err(GatewayError::config(format!(
                        "Credentials for provider '{}' are required but not configured",
                        name
                    )));
                }
                None => {}
            }

            tracing::info!(
                provider = %name,
                auth = entry.identity().auth().name(),
                credentials = entry.signer().is_some(),
                source = source.source_name(),
                "Provider registered"
            );
            registry.register(entry)?;
        }

        Ok(registry)
    }

    pub fn get(&self, provider: &str) -> Result<&ProviderEntry, GatewayError> {
        self.entries
            .get(provider)
            .ok_or_else(|| GatewayError::config(format!("Unknown provider '{}'", provider)))
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.entries.values()
    }

    pub fn summaries(&self) -> Vec<ProviderSummary> {
        self.entries
            .values()
            .map(|entry| ProviderSummary {
                name: entry.identity.name().to_string(),
                base_url: entry.identity.base_url().to_string(),
                auth_scheme: entry
                    .signer
                    .as_ref()
                    .map(|signer| signer.scheme())
                    .unwrap_or_else(|| entry.identity.auth().name())
                    .to_string(),
                requests_per_minute: entry.identity.tier().requests_per_minute(),
                burst: entry.identity.tier().capacity(),
                credentials_loaded: entry.signer.is_some(),
            })
            .collect()
    }
}
