//! Request signing contract

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::time::Duration;

use serde_json::Value;

use super::{GatewayError, HttpMethod};

/// Request as composed by the gateway, before authentication
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedRequest {
    pub method: HttpMethod,
    /// Authority of the provider, `host[:port]`
    pub host: String,
    /// Full URL path including the provider base path
    pub path: String,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`
    Form(String),
    Json(Value),
}

/// Request ready for the transport
///
/// Ephemeral. `Debug` hides header values since they may hold signatures or tokens.
#[derive(Clone, PartialEq)]
pub struct SignedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl SignedRequest {
    /// Default encoding without authentication: GET params go to the query
    /// string, POST params become a JSON object body.
    pub fn unsigned(request: &UnsignedRequest) -> Self {
        let (query, body) = match request.method {
            HttpMethod::Get => (
                request
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None,
            ),
            HttpMethod::Post => {
                let object = request
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect::<serde_json::Map<_, _>>();
                (Vec::new(), Some(RequestBody::Json(Value::Object(object))))
            }
        };

        Self {
            method: request.method,
            path: request.path.clone(),
            query,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("SignedRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &header_names)
            .field("body", &self.body.as_ref().map(|_| "[hidden]"))
            .finish()
    }
}

/// Authenticates requests for the identity it was built for
pub trait RequestSigner: Send + Sync + Debug {
    /// `timestamp` is wall-clock time since the Unix epoch
    fn sign(&self, request: &UnsignedRequest, timestamp: Duration) -> Result<SignedRequest, GatewayError>;

    /// Scheme name for logs and listings
    fn scheme(&self) -> &'static str;
}
