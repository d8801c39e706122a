// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    ACTIVE_SESSIONS,
    CACHE_OPERATIONS,
    GENERATIONS,
    ROUTED_REQUESTS,
    UPSTREAM_CALLS,
    UPSTREAM_DURATION,
};

/// Helper to record a request the edge routed into a session
pub fn record_routed(method: &str, route: &str, status_code: u16) {
    ROUTED_REQUESTS
        .with_label_values(&[method, route, &status_code.to_string()])
        .inc();
}

pub fn set_active_sessions(count: usize) {
    ACTIVE_SESSIONS.set(count as f64);
}

/// Helper to record how a generation ended
pub fn record_generation(outcome: &str) {
    GENERATIONS.with_label_values(&[outcome]).inc();
}

/// Helper to record a single upstream attempt
pub fn record_upstream_call(model: &str, success: bool, duration_secs: f64) {
    let result = if success { "success" } else { "failure" };
    UPSTREAM_CALLS.with_label_values(&[model, result]).inc();
    UPSTREAM_DURATION
        .with_label_values(&[model])
        .observe(duration_secs);
}

/// Helper to record result cache operations (hit, miss, write)
pub fn record_cache_operation(operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}
