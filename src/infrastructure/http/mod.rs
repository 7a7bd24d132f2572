//! HTTP transport

mod client;

pub use client::{
    DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_TIMEOUT, HttpClientConfig, HttpResponse, HttpTransport,
    ReqwestTransport, TransportError,
};

#[cfg(test)]
pub use client::MockHttpTransport;
