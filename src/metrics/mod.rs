// src/metrics/mod.rs
// Ambient Prometheus metrics, installed once at startup and scraped off the
// handle's render() output.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn install() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");
    let _ = PROMETHEUS_HANDLE.set(handle);
}

/// GET /metrics handler.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized".to_string()),
    }
}

pub fn record_rpc_request(method: &str) {
    metrics::counter!("chatter_search_rpc_requests_total", "method" => method.to_string()).increment(1);
}

pub fn record_rpc_error(code: i32) {
    metrics::counter!("chatter_search_rpc_errors_total", "code" => code.to_string()).increment(1);
}

pub fn record_rate_governor_wait(provider: &str, seconds: f64) {
    metrics::histogram!("chatter_search_rate_governor_wait_seconds", "provider" => provider.to_string())
        .record(seconds);
}

pub fn record_ingestion_run(channel_id: &str, messages_processed: u64) {
    metrics::counter!("chatter_search_ingested_messages_total", "channel" => channel_id.to_string())
        .increment(messages_processed);
}

pub fn record_search_latency(seconds: f64) {
    metrics::histogram!("chatter_search_search_latency_seconds").record(seconds);
}
