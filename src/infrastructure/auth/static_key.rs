//! Static key schemes: `Authorization: Bearer <key>` and `<header>: <key>`

use std::fmt;
use std::time::Duration;

use crate::domain::{GatewayError, RequestSigner, SignedRequest, UnsignedRequest};

pub struct BearerSigner {
    provider: String,
    token: String,
}

impl BearerSigner {
    pub fn new(provider: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            token: token.into(),
        }
    }
}

impl RequestSigner for BearerSigner {
    fn sign(&self, request: &UnsignedRequest, _timestamp: Duration) -> Result<SignedRequest, GatewayError> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::auth(&self.provider, "API key is empty"));
        }

        Ok(SignedRequest::unsigned(request)
            .with_header("Authorization", format!("Bearer {}", self.token)))
    }

    fn scheme(&self) -> &'static str {
        "bearer"
    }
}

impl fmt::Debug for BearerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerSigner")
            .field("provider", &self.provider)
            .field("token", &"[hidden]")
            .finish()
    }
}

pub struct ApiKeyHeaderSigner {
    provider: String,
    header: String,
    key: String,
}

impl ApiKeyHeaderSigner {
    pub fn new(provider: impl Into<String>, header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            header: header.into(),
            key: key.into(),
        }
    }
}

impl RequestSigner for ApiKeyHeaderSigner {
    fn sign(&self, request: &UnsignedRequest, _timestamp: Duration) -> Result<SignedRequest, GatewayError> {
        if self.key.trim().is_empty() {
            return Err(GatewayError::auth(&self.provider, "API key is empty"));
        }

        Ok(SignedRequest::unsigned(request).with_header(self.header.clone(), self.key.clone()))
    }

    fn scheme(&self) -> &'static str {
        "api_key_header"
    }
}

impl fmt::Debug for ApiKeyHeaderSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyHeaderSigner")
            .field("provider", &self.provider)
            .field("header", &self.header)
            .field("key", &"[hidden]")
            .finish()
    }
}
