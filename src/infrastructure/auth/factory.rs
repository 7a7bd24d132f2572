//! Builds the signer matching an identity's auth scheme

use std::time::Duration;

use super::{ApiKeyHeaderSigner, BearerSigner, HmacSigner, JwtSigner};
use crate::domain::{
    ApiIdentity, AuthScheme, Credential, GatewayError, RequestSigner, SignedRequest, UnsignedRequest,
};

/// Closed set of supported signers
#[derive(Debug)]
pub enum SchemeSigner {
    Hmac(HmacSigner),
    Jwt(JwtSigner),
    Bearer(BearerSigner),
    ApiKeyHeader(ApiKeyHeaderSigner),
}

impl SchemeSigner {
    fn inner(&self) -> &dyn RequestSigner {
        match self {
            Self::Hmac(signer) => signer,
            Self::Jwt(signer) => signer,
            Self::Bearer(signer) => signer,
            Self::ApiKeyHeader(signer) => signer,
        }
    }
}

impl RequestSigner for SchemeSigner {
    fn sign(&self, request: &UnsignedRequest, timestamp: Duration) -> Result<SignedRequest, GatewayError> {
        self.inner().sign(request, timestamp)
    }

    fn scheme(&self) -> &'static str {
        self.inner().scheme()
    }
}

/// Returns `Ok(None)` for identities without authentication
///
/// A credential missing a part its scheme needs is a configuration error.
/// Undecodable secrets are accepted here and fail at signing time.
pub fn build_signer(
    identity: &ApiIdentity,
    credential: &Credential,
) -> Result<Option<SchemeSigner>, GatewayError> {
    let provider = identity.name();
    let missing = |part: &str| {
        GatewayError::config(format!(
            "Credential for provider '{}' is missing its {}",
            provider, part
        ))
    };

    let signer = match identity.auth() {
        AuthScheme::None => return Ok(None),
        AuthScheme::HmacSha512 => {
            let secret = credential.secret().ok_or_else(|| missing("secret"))?;
            SchemeSigner::Hmac(HmacSigner::new(provider, credential.api_key(), secret))
        }
        AuthScheme::JwtEs256 { issuer, service } => {
            let pem = credential.secret().ok_or_else(|| missing("private key"))?;
            let key_name = credential.key_name().ok_or_else(|| missing("key name"))?;
            SchemeSigner::Jwt(
                JwtSigner::new(provider, credential.api_key(), key_name, pem)
                    .with_audience(issuer.clone(), service.clone()),
            )
        }
        AuthScheme::Bearer => SchemeSigner::Bearer(BearerSigner::new(provider, credential.api_key())),
        AuthScheme::ApiKeyHeader { header } => SchemeSigner::ApiKeyHeader(ApiKeyHeaderSigner::new(
            provider,
            header.clone(),
            credential.api_key(),
        )),
    };

    Ok(Some(signer))
}
