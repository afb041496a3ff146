/// Prometheus metrics for the auth service
///
/// Counts authentication outcomes, lockouts, session revocations, HTTP
/// traffic and background job runs. Exposed as text at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Auth operations by name and outcome (success or error kind)
    pub static ref AUTH_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "auth_events_total",
        "Total number of authentication operations",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Accounts moved into the locked state
    pub static ref ACCOUNT_LOCKOUTS_TOTAL: IntCounter = register_int_counter!(
        "account_lockouts_total",
        "Total number of brute-force lockouts"
    )
    .unwrap();

    /// Sessions deactivated by logout or logout-all
    pub static ref SESSIONS_REVOKED_TOTAL: IntCounter = register_int_counter!(
        "sessions_revoked_total",
        "Total number of revoked sessions"
    )
    .unwrap();

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    /// Background job executions by job and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record the outcome of an auth operation
pub fn record_auth_event(operation: &str, outcome: &str) {
    AUTH_EVENTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

pub fn record_background_job(job_type: &str, status: &str) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_auth_event() {
        record_auth_event("login", "success");
        record_auth_event("login", "UNAUTHENTICATED");
        let metrics = render_metrics();
        assert!(metrics.contains("auth_events_total"));
        assert!(metrics.contains("operation=\"login\""));
    }

    #[test]
    fn test_record_http_request() {
        record_http_request("POST", "/auth/login", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("session_cleanup", "success");
        assert!(render_metrics().contains("background_jobs_total"));
    }
}
