use std::time::Duration;

use thiserror::Error;

/// Gateway errors
///
/// Messages carry the provider name, the endpoint and a generic description.
/// Credential material never reaches this type.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Authentication error: {provider} - {message}")]
    Auth { provider: String, message: String },

    #[error("Rate limit exceeded: {provider} - {message}")]
    RateLimitExceeded { provider: String, message: String },

    #[error("Provider throttled: {provider} {endpoint}")]
    ProviderThrottled {
        provider: String,
        endpoint: String,
        retry_after: Option<Duration>,
    },

    #[error("Request timed out: {provider} {endpoint}")]
    Timeout { provider: String, endpoint: String },

    #[error("Decode error: {provider} {endpoint} - {message}")]
    Decode {
        provider: String,
        endpoint: String,
        message: String,
    },

    #[error("Transport error: {provider} {endpoint} - {message}")]
    Transport {
        provider: String,
        endpoint: String,
        message: String,
    },

    #[error("Invalid endpoint: {message}")]
    InvalidEndpoint { message: String },

    #[error("HTTP {status}: {provider} {endpoint}")]
    HttpStatus {
        provider: String,
        endpoint: String,
        status: u16,
    },

    #[error("Provider error: {provider} {endpoint} - {message}")]
    Provider {
        provider: String,
        endpoint: String,
        message: String,
    },
}

impl GatewayError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limit_exceeded(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimitExceeded {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn throttled(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::ProviderThrottled {
            provider: provider.into(),
            endpoint: endpoint.into(),
            retry_after,
        }
    }

    pub fn timeout(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn decode(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Decode {
            provider: provider.into(),
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn transport(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            provider: provider.into(),
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
        }
    }

    pub fn http_status(provider: impl Into<String>, endpoint: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            provider: provider.into(),
            endpoint: endpoint.into(),
            status,
        }
    }

    pub fn provider(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Whether the same call may succeed if retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. }
                | Self::ProviderThrottled { .. }
                | Self::Timeout { .. }
                | Self::Transport { .. }
        )
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Auth { .. } => "auth",
            Self::RateLimitExceeded { .. } => "rate_limited",
            Self::ProviderThrottled { .. } => "throttled",
            Self::Timeout { .. } => "timeout",
            Self::Decode { .. } => "decode",
            Self::Transport { .. } => "transport",
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::HttpStatus { .. } => "http_status",
            Self::Provider { .. } => "provider",
        }
    }
}
