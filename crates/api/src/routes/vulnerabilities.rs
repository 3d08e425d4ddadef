// ---------------------------------------------------------------------------
// Vulnerability triage
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use ecuscan_core::types::{Vulnerability, VulnerabilityStatus};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// PATCH /api/vulnerabilities/{id}
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Vulnerability>, ApiError> {
    let status = VulnerabilityStatus::from_str_loose(&update.status).ok_or_else(|| {
        ApiError::BadRequest(format!("unknown vulnerability status: {}", update.status))
    })?;
    Ok(Json(state.store.update_vulnerability_status(&id, status)?))
}
