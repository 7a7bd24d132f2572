use async_trait::async_trait;
use std::fmt::Debug;

use super::Credential;
use crate::domain::GatewayError;

/// Source of provider credentials (environment, secret stores, tests)
#[async_trait]
pub trait CredentialSource: Send + Sync + Debug {
    /// `Ok(None)` when nothing is configured for the provider
    async fn get_credential(&self, provider: &str) -> Result<Option<Credential>, GatewayError>;

    /// Source name for logging
    fn source_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    #[derive(Debug, Default)]
    pub struct MockCredentialSource {
        credentials: RwLock<HashMap<String, Credential>>,
    }

    impl MockCredentialSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_credential(self, cred: Credential) -> Self {
            self.credentials
                .write()
                .unwrap()
                .insert(cred.provider().to_string(), cred);
            self
        }
    }

    #[async_trait]
    impl CredentialSource for MockCredentialSource {
        async fn get_credential(&self, provider: &str) -> Result<Option<Credential>, GatewayError> {
            Ok(self.credentials.read().unwrap().get(provider).cloned())
        }

        fn source_name(&self) -> &'static str {
            "mock"
        }
    }
}
