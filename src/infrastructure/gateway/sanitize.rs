//! Endpoint path validation

use crate::domain::GatewayError;

/// Returns the endpoint with a leading `/`, or `InvalidEndpoint`
///
/// Endpoints are relative paths only: no traversal, no query or fragment, no
/// scheme or authority, no whitespace or control characters.
pub fn sanitize_endpoint(endpoint: &str) -> Result<String, GatewayError> {
    if endpoint.is_empty() {
        return Err(GatewayError::invalid_endpoint("endpoint is empty"));
    }

    let lowered = endpoint.to_ascii_lowercase();
    if endpoint.contains('\\') || lowered.contains("%5c") || lowered.contains("%2f") {
        return Err(GatewayError::invalid_endpoint("encoded or alternate path separators are not allowed"));
    }

    if lowered.split('/').any(is_dot_segment) {
        return Err(GatewayError::invalid_endpoint("path traversal detected"));
    }

    if endpoint.contains("://") || endpoint.starts_with("//") {
        return Err(GatewayError::invalid_endpoint("absolute URLs are not allowed"));
    }

    if endpoint.contains('?') || endpoint.contains('#') {
        return Err(GatewayError::invalid_endpoint(
            "query strings and fragments must be passed as params",
        ));
    }

    if endpoint.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(GatewayError::invalid_endpoint(
            "endpoint contains whitespace or control characters",
        ));
    }

    if endpoint.starts_with('/') {
        Ok(endpoint.to_string())
    } else {
        Ok(format!("/{}", endpoint))
    }
}

/// URL parsers resolve `%2e` as `.`, so `.%2e` climbs like `..`
fn is_dot_segment(segment: &str) -> bool {
    matches!(
        segment,
        "." | ".." | "%2e" | ".%2e" | "%2e." | "%2e%2e"
    ) || segment.contains("..")
}
