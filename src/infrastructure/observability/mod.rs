//! Observability infrastructure - Metrics

mod recorder;

pub use recorder::{
    GatewayCallMetricParams, record_cache_lookup, record_gateway_call, record_throttle,
};
