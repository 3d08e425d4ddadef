// ---------------------------------------------------------------------------
// Route registration
// ---------------------------------------------------------------------------

mod events;
mod scans;
mod system;
mod vulnerabilities;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::auth_middleware;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    // Health and the WebSocket feed sit outside header auth. The feed checks
    // its own query token.
    let open_routes = Router::new()
        .route("/api/system/health", get(system::health_check))
        .route("/api/events", get(events::change_events_ws));

    let api_routes = Router::new()
        .route("/api/scans", post(scans::create_scan).get(scans::list_scans))
        .route(
            "/api/scans/{id}",
            get(scans::get_scan).delete(scans::delete_scan),
        )
        .route("/api/scans/{id}/analyze", post(scans::start_analysis))
        .route(
            "/api/scans/{id}/vulnerabilities",
            get(scans::list_vulnerabilities),
        )
        .route("/api/scans/{id}/compliance", get(scans::list_compliance))
        .route("/api/scans/{id}/sbom", get(scans::list_sbom))
        .route("/api/scans/{id}/logs", get(scans::list_logs))
        .route("/api/scans/{id}/report", get(scans::get_report))
        .route(
            "/api/vulnerabilities/{id}",
            patch(vulnerabilities::update_status),
        );

    let api_routes = if state.api_key_hash.is_some() {
        api_routes.layer(from_fn_with_state(state.clone(), auth_middleware))
    } else {
        api_routes
    };

    let mut router = open_routes.merge(api_routes);
    if let Some(cors) = cors_layer(&state.cors_origins) {
        router = router.layer(cors);
    }

    router
        .layer(RequestBodyLimitLayer::new(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// No layer when the allow-list is empty. Unparseable origins are skipped.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .max_age(Duration::from_secs(3600)),
    )
}
