//! Prometheus metrics handler
//!
//! Exposes `GET /metrics` returning Prometheus text format. Port occupancy
//! gauges are refreshed from the registry right before rendering.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::application::engine::SharedAllocationEngine;
use crate::domain::PortState;

/// Shared state for the metrics endpoint
#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
    pub engine: SharedAllocationEngine,
}

fn refresh_port_gauges(engine: &SharedAllocationEngine) {
    let ports = engine.registry().list_ports();
    for state in PortState::ALL {
        let count = ports.iter().filter(|p| p.state == state).count();
        metrics::gauge!("ports_by_state", "state" => state.as_str()).set(count as f64);
    }
    metrics::gauge!("sessions_open").set(engine.ledger().active_sessions().len() as f64);
}

/// `GET /metrics`, Prometheus scrape endpoint (no actor headers required)
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    refresh_port_gauges(&state.engine);
    let body = state.handle.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
