//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> build -> run -> shutdown.

use std::time::Duration;

use ecuscan_analysis::AnalysisSource;
use ecuscan_core::EcuscanConfig;
use ecuscan_core::pipeline::{HealthStatus, ScanStatus};
use ecuscan_core::types::NewScan;
use ecuscan_daemon::orchestrator::Orchestrator;
use tempfile::TempDir;
use tokio::time::sleep;

/// In-memory store, ephemeral port, metrics off.
fn test_config() -> EcuscanConfig {
    let mut config = EcuscanConfig::default();
    config.storage.in_memory = true;
    config.server.listen_addr = "127.0.0.1:0".to_owned();
    config.analysis.stage_delay_ms = 0;
    config
}

#[tokio::test]
async fn test_build_with_in_memory_store() {
    // Given: A minimal config
    let config = test_config();

    // When: Building the orchestrator
    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("orchestrator should build");

    // Then: Only the store is reported until background tasks start
    let health = orchestrator.health();
    let names: Vec<_> = health.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["store"]);
    assert!(health.status.is_healthy());
    assert_eq!(orchestrator.app_state().engine(), "simulated");
}

#[tokio::test]
async fn test_background_tasks_reach_api_health() {
    // Given: A built orchestrator
    let mut orchestrator = Orchestrator::build_from_config(test_config())
        .await
        .expect("orchestrator should build");
    let state = orchestrator.app_state().clone();

    // When: Running, the sweeper and API server are registered and healthy
    let observed = state.clone();
    orchestrator
        .run_until(async move {
            sleep(Duration::from_millis(50)).await;
            let health = observed.health_report();
            let names: Vec<_> = health.components.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["store", "sweeper", "api"]);
            assert!(health.status.is_healthy(), "got: {:?}", health.status);
        })
        .await
        .expect("run should succeed");

    // Then: After shutdown the stopped tasks are reported unhealthy
    let health = state.health_report();
    match health.status {
        HealthStatus::Unhealthy(reason) => {
            assert!(reason.contains("sweeper: sweeper task exited"), "got: {reason}");
        }
        other => panic!("expected Unhealthy status, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_build_with_file_store() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config();
    config.storage.in_memory = false;
    config.storage.db_path = temp_dir
        .path()
        .join("db")
        .join("ecuscan.db")
        .to_string_lossy()
        .into_owned();

    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("orchestrator should build");

    assert!(temp_dir.path().join("db").join("ecuscan.db").exists());
    assert!(orchestrator.store().list_scans().expect("list").is_empty());
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let mut config = test_config();
    config.analysis.engine = "ghidra".to_owned();

    let result = Orchestrator::build_from_config(config).await;

    let err = result.err().expect("unknown engine should fail");
    assert!(err.to_string().contains("validation"), "got: {err}");
}

#[tokio::test]
async fn test_run_writes_and_removes_pid_file() {
    // Given: A config with a PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("ecuscan.pid");
    let mut config = test_config();
    config.general.pid_file = pid_path.to_string_lossy().into_owned();
    let mut orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("orchestrator should build");

    // When: Running until a short shutdown trigger
    let observed = pid_path.clone();
    orchestrator
        .run_until(async move {
            sleep(Duration::from_millis(50)).await;
            // Then: The PID file exists while running
            assert!(observed.exists(), "PID file should exist while running");
        })
        .await
        .expect("run should succeed");

    // Then: The PID file is removed on shutdown
    assert!(!pid_path.exists(), "PID file should be removed after shutdown");
}

#[tokio::test]
async fn test_run_fails_when_pid_file_exists() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("ecuscan.pid");
    std::fs::write(&pid_path, "4242").expect("should write PID file");
    let mut config = test_config();
    config.general.pid_file = pid_path.to_string_lossy().into_owned();
    let mut orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("orchestrator should build");

    let err = orchestrator
        .run_until(async {})
        .await
        .expect_err("second instance should fail");

    assert!(err.to_string().contains("4242"), "got: {err}");
    assert!(pid_path.exists(), "existing PID file must be kept");
}

#[tokio::test]
async fn test_shutdown_fails_in_flight_scans() {
    // Given: A scan stuck between pipeline stages
    let mut config = test_config();
    config.analysis.stage_delay_ms = 60_000;
    let mut orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("orchestrator should build");
    let store = orchestrator.store().clone();
    let scan = store
        .create_scan(&NewScan {
            ecu_name: "BCM".to_owned(),
            file_name: "bcm.bin".to_owned(),
            ..Default::default()
        })
        .expect("create scan");
    let handle = orchestrator
        .app_state()
        .executor
        .spawn(
            &scan.id,
            AnalysisSource::Binary {
                file_name: "bcm.bin".to_owned(),
                content: vec![0u8; 16],
            },
        )
        .expect("spawn pipeline");

    // When: The daemon shuts down
    orchestrator
        .run_until(sleep(Duration::from_millis(20)))
        .await
        .expect("run should succeed");

    // Then: The pipeline is cancelled and the scan is failed
    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("pipeline should stop")
        .expect("pipeline task should not panic");
    assert!(outcome.is_err());
    let scan = store.get_scan(&scan.id).expect("scan");
    assert_eq!(scan.status, ScanStatus::Failed);
}
