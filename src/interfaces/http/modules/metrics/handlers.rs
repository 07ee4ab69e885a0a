//! Prometheus scrape endpoint
//!
//! Renders the global `metrics-exporter-prometheus` recorder. The body is
//! empty when no recorder was installed, as in tests.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone, Default)]
pub struct MetricsState {
    pub handle: Option<PrometheusHandle>,
}

/// `GET /metrics` (unauthenticated, rate limited)
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    let body = state
        .handle
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
