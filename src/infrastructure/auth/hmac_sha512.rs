//! HMAC-SHA512 nonce signing (Kraken private endpoints)
//!
//! `API-Sign = base64(HMAC-SHA512(secret, path || SHA256(nonce || body)))`
//! where the secret is base64-decoded and the body is the form-encoded
//! parameters starting with `nonce=`.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::domain::{GatewayError, HttpMethod, RequestBody, RequestSigner, SignedRequest, UnsignedRequest};

type HmacSha512 = Hmac<Sha512>;

pub const API_KEY_HEADER: &str = "API-Key";
pub const API_SIGN_HEADER: &str = "API-Sign";

pub struct HmacSigner {
    provider: String,
    api_key: String,
    /// `None` when the configured secret is not valid base64
    secret: Option<Vec<u8>>,
    last_nonce: Mutex<u64>,
}

impl HmacSigner {
    pub fn new(provider: impl Into<String>, api_key: impl Into<String>, secret_b64: &str) -> Self {
        let provider = provider.into();
        let secret = match BASE64.decode(secret_b64.trim()) {
            Ok(secret) if !secret.is_empty() => Some(secret),
            _ => {
                tracing::warn!(provider = %provider, "HMAC secret is not valid base64; signing will fail");
                None
            }
        };

        Self {
            provider,
            api_key: api_key.into(),
            secret,
            last_nonce: Mutex::new(0),
        }
    }

    fn signature(&self, secret: &[u8], path: &str, nonce: u64, body: &str) -> Result<String, GatewayError> {
        let mut sha256 = Sha256::new();
        sha256.update(nonce.to_string().as_bytes());
        sha256.update(body.as_bytes());
        let digest = sha256.finalize();

        let mut mac = HmacSha512::new_from_slice(secret)
            .map_err(|_| GatewayError::auth(&self.provider, "HMAC key rejected"))?;
        mac.update(path.as_bytes());
        mac.update(&digest);

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// Strictly greater than `last`, microseconds since the epoch otherwise
pub fn next_nonce(last: u64, timestamp: Duration) -> u64 {
    let micros = u64::try_from(timestamp.as_micros()).unwrap_or(u64::MAX);
    micros.max(last.saturating_add(1))
}

fn form_body(nonce: u64, request: &UnsignedRequest) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("nonce", &nonce.to_string());
    for (key, value) in request.params.iter().filter(|(key, _)| key.as_str() != "nonce") {
        form.append_pair(key, value);
    }
    form.finish()
}

impl RequestSigner for HmacSigner {
    fn sign(&self, request: &UnsignedRequest, timestamp: Duration) -> Result<SignedRequest, GatewayError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| GatewayError::auth(&self.provider, "API secret could not be decoded"))?;

        if request.method != HttpMethod::Post {
            return Err(GatewayError::auth(
                &self.provider,
                "HMAC-signed requests must use POST",
            ));
        }

        // Held until the signature exists so nonces reach the wire in issue order.
        let mut last = self
            .last_nonce
            .lock()
            .map_err(|_| GatewayError::auth(&self.provider, "nonce state unavailable"))?;

        let nonce = next_nonce(*last, timestamp);
        let body = form_body(nonce, request);
        let signature = self.signature(secret, &request.path, nonce, &body)?;
        *last = nonce;
        drop(last);

        Ok(SignedRequest {
            method: request.method,
            path: request.path.clone(),
            query: Vec::new(),
            headers: vec![
                (API_KEY_HEADER.to_string(), self.api_key.clone()),
                (API_SIGN_HEADER.to_string(), signature),
            ],
            body: Some(RequestBody::Form(body)),
        })
    }

    fn scheme(&self) -> &'static str {
        "hmac_sha512"
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("provider", &self.provider)
            .field("api_key", &"[hidden]")
            .field("secret", &"[hidden]")
            .finish()
    }
}
