//! Outbound HTTP transport
//!
//! Enforces the request timeout and the response size limit. Status handling
//! is left to the caller; only successful bodies are read.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use thiserror::Error;
use url::Url;

#[cfg(test)]
use mockall::automock;

use crate::domain::{GatewayError, HttpMethod, RequestBody, SignedRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Status, throttling hint and (for 2xx only) the body
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTP transport operations (for mocking)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, url: Url, request: SignedRequest) -> Result<HttpResponse, TransportError>;
}

/// Configuration for the reqwest transport
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub max_response_bytes: u64,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            user_agent: concat!("crypto-api-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_response_bytes(mut self, limit: u64) -> Self {
        self.max_response_bytes = limit;
        self
    }
}

/// Real HTTP transport using reqwest; TLS verification stays at its default
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_bytes: u64,
}

impl ReqwestTransport {
    pub fn new(config: &HttpClientConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
        })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout;
    }

    let is_connect = error.is_connect();
    let is_body = error.is_body() || error.is_decode();

    // `without_url` consumes the error, so classify first
    let message = error.without_url().to_string();
    if is_connect {
        TransportError::Connect(message)
    } else if is_body {
        TransportError::Body(message)
    } else {
        TransportError::Request(message)
    }
}

/// Only the delay-seconds form of `Retry-After` is honoured
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Appends `chunk` unless the total would pass `limit`
fn append_bounded(buffer: &mut BytesMut, chunk: &[u8], limit: u64) -> Result<(), TransportError> {
    let size = (buffer.len() + chunk.len()) as u64;
    if size > limit {
        return Err(TransportError::TooLarge { size, limit });
    }
    buffer.extend_from_slice(chunk);
    Ok(())
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, url: Url, request: SignedRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        }
        .header(ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            Some(RequestBody::Form(body)) => builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body),
            Some(RequestBody::Json(value)) => builder.json(&value),
            None => builder,
        };

        let mut response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());

        if !response.status().is_success() {
            return Ok(HttpResponse {
                status,
                retry_after,
                body: Bytes::new(),
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_response_bytes {
                return Err(TransportError::TooLarge {
                    size: declared,
                    limit: self.max_response_bytes,
                });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            append_bounded(&mut body, &chunk, self.max_response_bytes)?;
        }

        Ok(HttpResponse {
            status,
            retry_after,
            body: body.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(config: HttpClientConfig) -> ReqwestTransport {
        ReqwestTransport::new(&config).unwrap()
    }

    fn get(path: &str) -> SignedRequest {
        SignedRequest {
            method: HttpMethod::Get,
            path: path.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn url(server: &MockServer, path: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), path)).unwrap()
    }

    #[test]
    fn test_append_bounded_stops_at_limit() {
        let mut buffer = BytesMut::new();
        append_bounded(&mut buffer, &[0u8; 6], 10).unwrap();

        let result = append_bounded(&mut buffer, &[0u8; 5], 10);
        assert_eq!(result, Err(TransportError::TooLarge { size: 11, limit: 10 }));
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "17".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(17)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn test_get_with_query_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .and(query_param("ids", "bitcoin"))
            .and(header("accept", "application/json"))
            .and(header("x-cg-demo-api-key", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"bitcoin":{"usd":1}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = get("/api/v3/simple/price");
        request.query.push(("ids".to_string(), "bitcoin".to_string()));
        request.headers.push(("x-cg-demo-api-key".to_string(), "demo".to_string()));

        let response = transport(HttpClientConfig::default())
            .send(url(&server, "/api/v3/simple/price"), request)
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(&response.body[..], br#"{"bitcoin":{"usd":1}}"#);
    }

    #[tokio::test]
    async fn test_post_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/0/private/Balance"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("nonce=42"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let request = SignedRequest {
            method: HttpMethod::Post,
            path: "/0/private/Balance".to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(RequestBody::Form("nonce=42".to_string())),
        };

        let response = transport(HttpClientConfig::default())
            .send(url(&server, "/0/private/Balance"), request)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_error_status_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let response = transport(HttpClientConfig::default())
            .send(url(&server, "/limited"), get("/limited"))
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(response.retry_after, Some(Duration::from_secs(3)));
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_declared_size_above_limit_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let result = transport(HttpClientConfig::default().with_max_response_bytes(1024))
            .send(url(&server, "/big"), get("/big"))
            .await;

        assert_eq!(
            result,
            Err(TransportError::TooLarge {
                size: 2048,
                limit: 1024
            })
        );
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let result = transport(HttpClientConfig::default().with_timeout(Duration::from_millis(50)))
            .send(url(&server, "/slow"), get("/slow"))
            .await;

        assert_eq!(result, Err(TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = Url::parse(&format!("http://127.0.0.1:{}/closed?api_key=hunter2", port)).unwrap();
        let result = transport(HttpClientConfig::default())
            .send(target, get("/closed"))
            .await;

        match result {
            Err(TransportError::Connect(message)) => {
                assert!(!message.contains("hunter2"), "url leaked: {}", message);
                assert!(!message.contains("127.0.0.1"), "url leaked: {}", message);
            }
            other => panic!("expected connect error, got {:?}", other),
        }
    }
}
