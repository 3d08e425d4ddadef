// ---------------------------------------------------------------------------
// System routes: health check
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use ecuscan_core::pipeline::HealthStatus;
use serde::Serialize;

use crate::health::ComponentHealth;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Worst status among the components.
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub engine: String,
    pub components: Vec<ComponentHealth>,
    /// Scan counts keyed by status.
    pub scans: BTreeMap<String, usize>,
    pub event_subscribers: usize,
}

/// Returns 503 when any component is unhealthy.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (store, scans) = match state.store.count_by_status() {
        Ok(counts) => (HealthStatus::Healthy, counts),
        Err(e) => (HealthStatus::Unhealthy(e.to_string()), BTreeMap::new()),
    };
    let report = state.report_with_store(store);
    let code = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status: report.status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: state.started_at.elapsed().as_secs(),
            engine: state.engine().to_owned(),
            components: report.components,
            scans,
            event_subscribers: state.ws_connection_count.load(Ordering::Relaxed),
        }),
    )
}
