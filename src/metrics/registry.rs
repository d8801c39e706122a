// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_gauge_with_registry,
    register_histogram_vec_with_registry, CounterVec, Encoder, Gauge, HistogramVec, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // EDGE METRICS
    // ============================================================================

    /// Requests routed to a session, by inner path and status
    pub static ref ROUTED_REQUESTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("routed_requests_total", "Requests routed to a session gateway"),
        &["method", "route", "status_code"],
        REGISTRY
    ).unwrap();

    /// Live session handles held by the edge
    pub static ref ACTIVE_SESSIONS: Gauge = register_gauge_with_registry!(
        Opts::new("active_sessions", "Session gateways currently held in memory"),
        REGISTRY
    ).unwrap();

    // ============================================================================
    // GENERATION METRICS
    // ============================================================================

    /// Finished generations by outcome
    pub static ref GENERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("generations_total", "Finished generation requests"),
        &["outcome"], // outcome: generated, cached, validation, rate_limited, upstream, ...
        REGISTRY
    ).unwrap();

    /// Upstream model calls
    pub static ref UPSTREAM_CALLS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("upstream_calls_total", "Individual upstream model attempts"),
        &["model", "result"],
        REGISTRY
    ).unwrap();

    /// Upstream model call duration
    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("upstream_duration_seconds", "Upstream model attempt duration")
            .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        &["model"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Result cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total result cache operations"),
        &["operation"], // operation: hit, miss, write
        REGISTRY
    ).unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
        GENERATIONS.with_label_values(&["cached"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("cache_operations_total"));
        assert!(metrics.contains("generations_total"));
        assert!(metrics.contains("active_sessions"));
    }
}
