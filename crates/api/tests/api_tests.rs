//! Integration tests for the HTTP API
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ecuscan_analysis::{PipelineExecutor, SimulatedAnalyzer};
use ecuscan_api::{AppState, build_router};
use ecuscan_core::config::ServerConfig;
use ecuscan_core::pipeline::{HealthStatus, ScanStatus};
use ecuscan_core::types::{NewVulnerability, Severity};
use ecuscan_store::{ChangeFeed, ScanStore};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_state(api_key: &str) -> Arc<AppState> {
    let store = Arc::new(ScanStore::open_in_memory(ChangeFeed::default()).expect("open store"));
    let executor = PipelineExecutor::new(store, Arc::new(SimulatedAnalyzer::new()))
        .with_stage_delay(Duration::ZERO);
    let server = ServerConfig {
        api_key: api_key.to_owned(),
        ..Default::default()
    };
    Arc::new(AppState::new(executor, &server))
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = build_router(state.clone())
        .oneshot(request)
        .await
        .expect("router response");
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    (status, body.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json body")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn create_scan(state: &Arc<AppState>) -> String {
    let (status, body) = send(
        state,
        post_json(
            "/api/scans",
            json!({
                "ecu_name": "Gateway ECU",
                "ecu_type": "Gateway",
                "version": "2.4.1",
                "file_name": "gateway.bin",
                "file_size": 4096,
                "compliance_frameworks": ["misra", "iso21434"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json_body(&body)["id"]
        .as_str()
        .expect("scan id")
        .to_owned()
}

async fn wait_for_terminal(state: &Arc<AppState>, scan_id: &str) -> ScanStatus {
    for _ in 0..200 {
        let scan = state.store.get_scan(scan_id).expect("scan");
        if scan.status.is_terminal() {
            return scan.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan {scan_id} did not finish");
}

/// Given a fresh server, When health is requested, Then it reports healthy with counts
#[tokio::test]
async fn test_health_check() {
    let state = test_state("");
    create_scan(&state).await;

    let (status, body) = send(
        &state,
        Request::get("/api/system/health")
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let health = json_body(&body);
    assert_eq!(health["status"]["state"], "healthy");
    assert_eq!(health["engine"], "simulated");
    assert_eq!(health["scans"]["queued"], 1);
    assert!(health["version"].is_string());
}

/// Given a failed background component, When health is requested, Then 503 names it
#[tokio::test]
async fn test_health_reports_registered_components() {
    let state = test_state("");
    state.components.register(
        "sweeper",
        Box::new(|| HealthStatus::Unhealthy("sweeper task exited".to_owned())),
    );

    let (status, body) = send(
        &state,
        Request::get("/api/system/health")
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health = json_body(&body);
    assert_eq!(health["status"]["state"], "unhealthy");
    assert_eq!(health["status"]["reason"], "sweeper: sweeper task exited");
    assert_eq!(health["components"][0]["name"], "store");
    assert_eq!(health["components"][0]["status"]["state"], "healthy");
    assert_eq!(health["components"][1]["name"], "sweeper");
}

/// Given a created scan, When read and listed, Then it is queued at 0%
#[tokio::test]
async fn test_create_get_list_scan() {
    let state = test_state("");
    let id = create_scan(&state).await;

    let (status, body) = send(
        &state,
        Request::get(format!("/api/scans/{id}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let scan = json_body(&body);
    assert_eq!(scan["status"], "queued");
    assert_eq!(scan["progress"], 0);
    assert!(scan["risk_score"].is_null());

    let (status, body) = send(
        &state,
        Request::get("/api/scans").body(Body::empty()).expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body).as_array().map(Vec::len), Some(1));
}

/// Given a scan without an ECU name, When created, Then the request is rejected
#[tokio::test]
async fn test_create_scan_validation() {
    let state = test_state("");
    let (status, body) = send(
        &state,
        post_json("/api/scans", json!({ "ecu_name": " ", "file_name": "x.bin" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "bad_request");
}

/// Given no scan, When an unknown id is read, Then 404 is returned
#[tokio::test]
async fn test_unknown_scan_is_404() {
    let state = test_state("");
    let (status, body) = send(
        &state,
        Request::get("/api/scans/does-not-exist")
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "not_found");
}

/// Given a queued scan, When a binary is submitted, Then it is accepted and runs to completion
#[tokio::test]
async fn test_analyze_binary_runs_pipeline() {
    let state = test_state("");
    let id = create_scan(&state).await;
    let content = STANDARD.encode([0x7f, b'E', b'L', b'F', 0x01, 0x02]);

    let (status, body) = send(
        &state,
        post_json(
            &format!("/api/scans/{id}/analyze"),
            json!({ "source": { "type": "binary", "content_base64": content } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let ack = json_body(&body);
    assert_eq!(ack["scan_id"], id.as_str());
    assert_eq!(ack["accepted"], true);

    assert_eq!(wait_for_terminal(&state, &id).await, ScanStatus::Complete);

    let (status, body) = send(
        &state,
        Request::get(format!("/api/scans/{id}/vulnerabilities"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body).as_array().map(Vec::len), Some(5));

    let (_, body) = send(
        &state,
        Request::get(format!("/api/scans/{id}/logs"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    let logs = json_body(&body);
    let last = logs
        .as_array()
        .and_then(|l| l.last())
        .expect("at least one log");
    assert!(
        last["message"]
            .as_str()
            .expect("message")
            .starts_with("Analysis complete - Found 5 total findings")
    );

    let (_, body) = send(
        &state,
        Request::get(format!("/api/scans/{id}/sbom"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(json_body(&body).as_array().map(Vec::len), Some(5));

    let (_, body) = send(
        &state,
        Request::get(format!("/api/scans/{id}/compliance"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert!(!json_body(&body).as_array().expect("array").is_empty());
}

/// Given an already started scan, When analysis is requested again, Then 409 is returned
#[tokio::test]
async fn test_analyze_twice_conflicts() {
    let state = test_state("");
    let id = create_scan(&state).await;
    let request = || {
        post_json(
            &format!("/api/scans/{id}/analyze"),
            json!({ "source": { "type": "repository", "url": "https://github.com/acme/ecu-fw" } }),
        )
    };

    let (first, _) = send(&state, request()).await;
    let (second, body) = send(&state, request()).await;

    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["error"], "conflict");
    wait_for_terminal(&state, &id).await;
}

/// Given invalid base64, When analysis is requested, Then 400 is returned and the scan stays queued
#[tokio::test]
async fn test_analyze_bad_base64() {
    let state = test_state("");
    let id = create_scan(&state).await;

    let (status, _) = send(
        &state,
        post_json(
            &format!("/api/scans/{id}/analyze"),
            json!({ "source": { "type": "binary", "content_base64": "not base64!!" } }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let scan = state.store.get_scan(&id).expect("scan");
    assert_eq!(scan.status, ScanStatus::Queued);
}

/// Given a vulnerability, When its status is patched, Then the new status is returned
#[tokio::test]
async fn test_patch_vulnerability_status() {
    let state = test_state("");
    let id = create_scan(&state).await;
    let vuln = state
        .store
        .insert_vulnerability(&id, &NewVulnerability::new("Hardcoded key", Severity::High))
        .expect("insert");

    let patch = |status: &str| {
        Request::patch(format!("/api/vulnerabilities/{}", vuln.id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "status": status }).to_string()))
            .expect("request")
    };

    let (status, body) = send(&state, patch("false-positive")).await;
    assert_eq!(status, StatusCode::OK);
    let updated = json_body(&body);
    assert_eq!(updated["status"], "false_positive");
    assert_eq!(updated["severity"], "high");

    let (status, _) = send(&state, patch("ignored")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Given a scan, When a markdown report is requested, Then markdown is returned with its content type
#[tokio::test]
async fn test_report_formats() {
    let state = test_state("");
    let id = create_scan(&state).await;

    let resp = build_router(state.clone())
        .oneshot(
            Request::get(format!("/api/scans/{id}/report?format=markdown"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "text/markdown; charset=utf-8"
    );
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let md = String::from_utf8(body.to_vec()).expect("utf8");
    assert!(md.starts_with("# ECU Security Report: Gateway ECU"));

    let (status, body) = send(
        &state,
        Request::get(format!("/api/scans/{id}/report"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["scan"]["id"], id.as_str());

    let (status, _) = send(
        &state,
        Request::get(format!("/api/scans/{id}/report?format=pdf"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Given a scan, When deleted, Then 204 is returned and later reads are 404
#[tokio::test]
async fn test_delete_scan() {
    let state = test_state("");
    let id = create_scan(&state).await;

    let (status, _) = send(
        &state,
        Request::delete(format!("/api/scans/{id}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &state,
        Request::get(format!("/api/scans/{id}/logs"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Given an API key, When requests carry no, wrong or right tokens, Then auth is enforced
#[tokio::test]
async fn test_bearer_auth() {
    let state = test_state("s3cret");
    let list = |auth: Option<&str>| {
        let mut builder = Request::get("/api/scans");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).expect("request")
    };

    let (status, body) = send(&state, list(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"], "missing_token");

    let (status, body) = send(&state, list(Some("Bearer wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"], "invalid_token");

    let (status, body) = send(&state, list(Some("Basic s3cret"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"], "invalid_scheme");

    let (status, _) = send(&state, list(Some("Bearer s3cret"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &state,
        Request::get("/api/system/health")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn events(query: &str) -> Request<Body> {
    Request::get(format!("/api/events{query}"))
        .body(Body::empty())
        .expect("request")
}

/// Given an API key, When the change feed is requested without a valid token, Then 401
#[tokio::test]
async fn test_events_require_query_token() {
    let state = test_state("s3cret");

    let (status, body) = send(&state, events("")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"], "unauthorized");

    let (status, _) = send(&state, events("?token=wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The right token passes auth; a plain GET is then refused as a non-upgrade.
    let (status, _) = send(&state, events("?token=s3cret")).await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
    assert!(status.is_client_error(), "got {status}");
    assert_eq!(
        state
            .ws_connection_count
            .load(std::sync::atomic::Ordering::Relaxed),
        0,
        "refused upgrade should release its slot"
    );
}

/// Given an unknown table filter, When the change feed is requested, Then 400
#[tokio::test]
async fn test_events_reject_unknown_table() {
    let state = test_state("");

    let (status, body) = send(&state, events("?table=users")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "bad_request");
}

/// Given every WebSocket slot taken, When another subscriber arrives, Then 503
#[tokio::test]
async fn test_events_connection_cap() {
    use std::sync::atomic::Ordering;

    let state = test_state("");
    state
        .ws_connection_count
        .store(ecuscan_api::MAX_WS_CONNECTIONS, Ordering::Relaxed);

    let (status, body) = send(&state, events("")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(&body)["error"], "service_unavailable");
    assert_eq!(
        state.ws_connection_count.load(Ordering::Relaxed),
        ecuscan_api::MAX_WS_CONNECTIONS
    );
}
