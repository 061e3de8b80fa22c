use crate::jobs::JobStatus;
use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all snippet runner metrics
const PREFIX: &str = "snippet_runner";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Job Metrics
    pub static ref JOBS_SUBMITTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_jobs_submitted_total"),
        "Total number of accepted job submissions"
    ).expect("Failed to create jobs_submitted_total metric");

    pub static ref EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_executions_total"), "Finished executions by final status"),
        &["status"]
    ).expect("Failed to create executions_total metric");

    pub static ref EXECUTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_execution_duration_seconds"),
            "Wall-clock duration of script executions in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0])
    ).expect("Failed to create execution_duration_seconds metric");

    pub static ref EXECUTIONS_IN_FLIGHT: Gauge = Gauge::new(
        format!("{PREFIX}_executions_in_flight"),
        "Number of scripts currently executing"
    ).expect("Failed to create executions_in_flight metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_SUBMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EXECUTION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(EXECUTIONS_IN_FLIGHT.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_job_submitted() {
    JOBS_SUBMITTED_TOTAL.inc();
}

/// Record a run reaching its final status
pub fn record_execution_finished(status: JobStatus, duration: Duration) {
    EXECUTIONS_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();

    EXECUTION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_executions_in_flight(count: usize) {
    EXECUTIONS_IN_FLIGHT.set(count as f64);
}

/// Collapses job ids out of request paths so the label set stays bounded.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
