// ---------------------------------------------------------------------------
// Scan routes: CRUD, analysis start, result listings, reports
// ---------------------------------------------------------------------------

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use ecuscan_analysis::{AnalysisSource, RepositoryRef};
use ecuscan_core::types::{
    AnalysisLog, ComplianceResult, NewScan, SbomComponent, Scan, Vulnerability,
};
use ecuscan_report::ReportFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /api/scans, GET /api/scans
// ---------------------------------------------------------------------------

pub async fn create_scan(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewScan>,
) -> Result<(StatusCode, Json<Scan>), ApiError> {
    let scan = state.store.create_scan(&new)?;
    Ok((StatusCode::CREATED, Json(scan)))
}

pub async fn list_scans(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Scan>>, ApiError> {
    Ok(Json(state.store.list_scans()?))
}

// ---------------------------------------------------------------------------
// GET /api/scans/{id}, DELETE /api/scans/{id}
// ---------------------------------------------------------------------------

pub async fn get_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Scan>, ApiError> {
    Ok(Json(state.store.get_scan(&id)?))
}

pub async fn delete_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_scan(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /api/scans/{id}/analyze
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub source: SourceRequest,
}

/// Wire form of an analysis source. Binary content arrives base64-encoded.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRequest {
    Binary {
        #[serde(default)]
        file_name: Option<String>,
        content_base64: String,
    },
    Repository(RepositoryRef),
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub scan_id: String,
    pub accepted: bool,
}

pub async fn start_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    let scan = state.store.get_scan(&id)?;

    let source = match request.source {
        SourceRequest::Binary {
            file_name,
            content_base64,
        } => AnalysisSource::binary_from_base64(
            file_name.unwrap_or_else(|| scan.file_name.clone()),
            &content_base64,
        )?,
        SourceRequest::Repository(repo) => AnalysisSource::Repository(repo),
    };
    let kind = source.kind();

    // The pipeline task owns the outcome; failures land on the scan record.
    let _handle = state.executor.spawn(&scan.id, source)?;
    info!(scan_id = %scan.id, source = kind, "analysis accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            scan_id: scan.id,
            accepted: true,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Result listings
// ---------------------------------------------------------------------------

pub async fn list_vulnerabilities(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Vulnerability>>, ApiError> {
    state.store.get_scan(&id)?;
    Ok(Json(state.store.list_vulnerabilities(&id)?))
}

pub async fn list_compliance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ComplianceResult>>, ApiError> {
    state.store.get_scan(&id)?;
    Ok(Json(state.store.list_compliance_results(&id)?))
}

pub async fn list_sbom(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SbomComponent>>, ApiError> {
    state.store.get_scan(&id)?;
    Ok(Json(state.store.list_sbom_components(&id)?))
}

pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AnalysisLog>>, ApiError> {
    state.store.get_scan(&id)?;
    Ok(Json(state.store.list_logs(&id)?))
}

// ---------------------------------------------------------------------------
// GET /api/scans/{id}/report?format=json|markdown
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let format = match query.format.as_deref() {
        Some(raw) => ReportFormat::from_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("unsupported report format: {raw}")))?,
        None => ReportFormat::Json,
    };

    let document = ecuscan_report::generate(&state.store, &id, format)?;
    let disposition = format!("inline; filename=\"{}\"", document.file_name(&id));

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.content,
    )
        .into_response())
}
