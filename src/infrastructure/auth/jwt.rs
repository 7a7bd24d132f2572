//! ES256 JWT bearer tokens (Coinbase Advanced Trade keys)

use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey};
use p256::SecretKey;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::{GatewayError, RequestSigner, SignedRequest, UnsignedRequest};

/// Token lifetime
pub const JWT_LIFETIME: Duration = Duration::from_secs(120);

pub const DEFAULT_ISSUER: &str = "coinbase-cloud";
pub const DEFAULT_SERVICE: &str = "retail_rest_api_proxy";

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Key name
    pub sub: String,
    pub iss: String,
    pub nbf: u64,
    pub exp: u64,
    pub aud: Vec<String>,
    /// `"METHOD host/path"` the token is scoped to
    pub uri: String,
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    kid: &'a str,
    nonce: String,
}

pub struct JwtSigner {
    provider: String,
    key_id: String,
    key_name: String,
    issuer: String,
    service: String,
    /// `None` when the configured PEM could not be parsed
    key: Option<EncodingKey>,
}

impl JwtSigner {
    pub fn new(
        provider: impl Into<String>,
        key_id: impl Into<String>,
        key_name: impl Into<String>,
        private_key_pem: &str,
    ) -> Self {
        let provider = provider.into();
        let key = match parse_private_key(private_key_pem) {
            Ok(key) => Some(key),
            Err(reason) => {
                tracing::warn!(provider = %provider, reason, "JWT private key rejected; signing will fail");
                None
            }
        };

        Self {
            provider,
            key_id: key_id.into(),
            key_name: key_name.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            key,
        }
    }

    pub fn with_audience(mut self, issuer: impl Into<String>, service: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self.service = service.into();
        self
    }

    /// Builds a token scoped to one request line
    pub fn token_for(&self, uri: &str, timestamp: Duration) -> Result<String, GatewayError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| GatewayError::auth(&self.provider, "private key could not be parsed"))?;

        let now = timestamp.as_secs();
        let claims = JwtClaims {
            sub: self.key_name.clone(),
            iss: self.issuer.clone(),
            nbf: now,
            exp: now + JWT_LIFETIME.as_secs(),
            aud: vec![self.service.clone()],
            uri: uri.to_string(),
        };
        let header = JwtHeader {
            alg: "ES256",
            typ: "JWT",
            kid: &self.key_id,
            nonce: random_nonce(),
        };

        let encode_part = |value: serde_json::Result<Vec<u8>>| {
            value
                .map(|bytes| URL_SAFE_NO_PAD.encode(bytes))
                .map_err(|_| GatewayError::auth(&self.provider, "failed to encode JWT"))
        };
        let message = format!(
            "{}.{}",
            encode_part(serde_json::to_vec(&header))?,
            encode_part(serde_json::to_vec(&claims))?
        );

        let signature = jsonwebtoken::crypto::sign(message.as_bytes(), key, Algorithm::ES256)
            .map_err(|_| GatewayError::auth(&self.provider, "failed to sign JWT"))?;

        Ok(format!("{}.{}", message, signature))
    }
}

/// Accepts SEC1 (`EC PRIVATE KEY`) or PKCS#8 PEM; escaped `\n` sequences are
/// unescaped first.
fn parse_private_key(pem: &str) -> Result<EncodingKey, &'static str> {
    let pem = pem.replace("\\n", "\n");
    let pem = pem.trim();
    if pem.is_empty() {
        return Err("empty private key");
    }

    let secret = SecretKey::from_sec1_pem(pem)
        .or_else(|_| SecretKey::from_pkcs8_pem(pem))
        .map_err(|_| "not a P-256 private key in SEC1 or PKCS#8 PEM form")?;

    let der = secret
        .to_pkcs8_der()
        .map_err(|_| "private key could not be re-encoded")?;

    Ok(EncodingKey::from_ec_der(der.as_bytes()))
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl RequestSigner for JwtSigner {
    fn sign(&self, request: &UnsignedRequest, timestamp: Duration) -> Result<SignedRequest, GatewayError> {
        let uri = format!("{} {}{}", request.method, request.host, request.path);
        let token = self.token_for(&uri, timestamp)?;

        Ok(SignedRequest::unsigned(request).with_header("Authorization", format!("Bearer {}", token)))
    }

    fn scheme(&self) -> &'static str {
        "jwt_es256"
    }
}

impl fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigner")
            .field("provider", &self.provider)
            .field("key_id", &"[hidden]")
            .field("key_name", &"[hidden]")
            .field("issuer", &self.issuer)
            .field("service", &self.service)
            .field("encoding_key", &self.key.as_ref().map(|_| "[hidden]"))
            .finish()
    }
}
