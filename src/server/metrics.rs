use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use super::websocket::BroadcastReport;

/// Metric name prefix for all relay metrics
const PREFIX: &str = "position_relay";

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

    // WebSocket Metrics
    pub static ref WS_CONNECTIONS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_ws_connections_active"),
        "Number of currently open WebSocket connections"
    ).expect("Failed to create ws_connections_active metric");

    pub static ref WS_CONNECTIONS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_ws_connections_total"),
        "Total WebSocket connections accepted"
    ).expect("Failed to create ws_connections_total metric");

    pub static ref WS_MESSAGES_RECEIVED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_messages_received_total"), "Inbound WebSocket messages by outcome"),
        &["outcome"]
    ).expect("Failed to create ws_messages_received_total metric");

    pub static ref WS_BROADCAST_DELIVERIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_broadcast_deliveries_total"), "Per-peer broadcast results"),
        &["result"]
    ).expect("Failed to create ws_broadcast_deliveries_total metric");

    pub static ref WS_SESSION_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_session_errors_total"), "Sessions ended by an error"),
        &["kind"]
    ).expect("Failed to create ws_session_errors_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WS_CONNECTIONS_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(WS_CONNECTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_MESSAGES_RECEIVED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_BROADCAST_DELIVERIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_SESSION_ERRORS_TOTAL.clone()));

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

pub fn record_connection_opened() {
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
}

pub fn record_connection_closed() {
    WS_CONNECTIONS_ACTIVE.dec();
}

/// Record an inbound message: "broadcast", "malformed" or "ignored"
pub fn record_message_received(outcome: &str) {
    WS_MESSAGES_RECEIVED_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

pub fn record_broadcast(report: &BroadcastReport) {
    WS_BROADCAST_DELIVERIES_TOTAL
        .with_label_values(&["delivered"])
        .inc_by(report.delivered as f64);
    WS_BROADCAST_DELIVERIES_TOTAL
        .with_label_values(&["closed"])
        .inc_by(report.closed.len() as f64);
    WS_BROADCAST_DELIVERIES_TOTAL
        .with_label_values(&["full"])
        .inc_by(report.full.len() as f64);
}

pub fn record_session_error(kind: &str) {
    WS_SESSION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
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
