//! Gateway metrics recorded through the `metrics` facade
//!
//! No exporter is installed by the library; the embedding process decides
//! where these go.

use std::time::Duration;

use metrics::{counter, histogram};

/// Parameters for a completed gateway call
pub struct GatewayCallMetricParams<'a> {
    pub provider: &'a str,
    pub endpoint: &'a str,
    pub outcome: &'a str,
    pub duration: Duration,
}

pub fn record_gateway_call(params: GatewayCallMetricParams<'_>) {
    let labels = [
        ("provider", params.provider.to_string()),
        ("endpoint", sanitize_endpoint_label(params.endpoint)),
        ("outcome", params.outcome.to_string()),
    ];

    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(params.duration.as_secs_f64());
}

pub fn record_cache_lookup(provider: &str, hit: bool) {
    if hit {
        counter!("gateway_cache_hits_total", "provider" => provider.to_string()).increment(1);
    } else {
        counter!("gateway_cache_misses_total", "provider" => provider.to_string()).increment(1);
    }
}

pub fn record_throttle(provider: &str) {
    counter!("gateway_throttled_total", "provider" => provider.to_string()).increment(1);
}

/// Replaces numeric path segments and truncates to bound label cardinality
fn sanitize_endpoint_label(endpoint: &str) -> String {
    let label = endpoint
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    label.chars().take(50).collect()
}
