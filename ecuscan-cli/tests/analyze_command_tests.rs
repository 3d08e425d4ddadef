//! Integration tests for `ecuscan analyze`, `scans` and `report`.
//!
//! Each test writes its own ecuscan.toml pointing the database into a
//! temporary directory, so runs never touch /var/lib/ecuscan.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use ecuscan_cli::cli::AnalyzeArgs;
use ecuscan_cli::commands::{analyze, load_config, open_store, report, scans};
use ecuscan_core::EcuscanConfig;
use ecuscan_core::pipeline::ScanStatus;
use ecuscan_core::types::Severity;

fn write_config(dir: &Path, engine: &str) -> PathBuf {
    let path = dir.join("ecuscan.toml");
    let db = dir.join("scans.db");
    let body = format!(
        "[general]\ndata_dir = \"{}\"\n\n[storage]\ndb_path = \"{}\"\n\n[analysis]\nengine = \"{}\"\n",
        dir.display(),
        db.display(),
        engine
    );
    fs::write(&path, body).expect("should write config");
    path
}

fn analyze_args(file: PathBuf) -> AnalyzeArgs {
    AnalyzeArgs {
        file,
        ecu_name: Some("Central Gateway".to_owned()),
        ecu_type: "Gateway".to_owned(),
        version: "2.4.1".to_owned(),
        architecture: "ARM".to_owned(),
        frameworks: vec!["misra".to_owned(), "iso21434".to_owned()],
        fail_on: "high".to_owned(),
        ephemeral: false,
    }
}

async fn config_for(dir: &Path, engine: &str) -> EcuscanConfig {
    let path = write_config(dir, engine);
    load_config(&path).await.expect("config should load")
}

#[tokio::test]
async fn test_analyze_simulated_binary() {
    // Given: a firmware blob and the simulated engine
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(temp_dir.path(), "simulated").await;
    let firmware = temp_dir.path().join("gateway_v2.bin");
    fs::write(&firmware, [0x7f, b'E', b'L', b'F', 0, 1, 2, 3]).expect("should write firmware");

    // When
    let report = analyze::run(&analyze_args(firmware), &config)
        .await
        .expect("analysis should succeed");

    // Then
    assert_eq!(report.status, ScanStatus::Complete);
    assert_eq!(report.ecu_name, "Central Gateway");
    assert_eq!(report.file_name, "gateway_v2.bin");
    assert_eq!(report.file_size, 8);
    assert_eq!(report.file_hash.as_deref().map(str::len), Some(64));
    assert_eq!(report.engine, "simulated");
    assert_eq!(report.total_findings, 5);
    assert_eq!(report.severity_counts.total(), 5);
    assert_eq!(report.sbom_components, 5);
    assert!(report.risk_score.is_some());
    assert!(!report.compliance.is_empty(), "selected frameworks should be summarized");

    // Findings come back most severe first
    let severities: Vec<Severity> = report.findings.iter().map(|f| f.severity).collect();
    let mut sorted = severities.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(severities, sorted);
}

#[tokio::test]
async fn test_analyze_threshold_trips_exit_code_4() {
    // Given
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(temp_dir.path(), "simulated").await;
    let firmware = temp_dir.path().join("bcm.bin");
    fs::write(&firmware, b"firmware").expect("should write firmware");

    // When
    let report = analyze::run(&analyze_args(firmware), &config)
        .await
        .expect("analysis should succeed");

    // Then: simulated findings include critical ones
    let err = analyze::check_threshold(&report, Some(Severity::Critical))
        .expect_err("critical findings should trip");
    assert_eq!(err.exit_code(), 4);
    assert!(analyze::check_threshold(&report, None).is_ok());
}

#[tokio::test]
async fn test_analyze_sast_source_file() {
    // Given: a C source with an unbounded copy
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(temp_dir.path(), "sast").await;
    let source = temp_dir.path().join("can_handler.c");
    fs::write(
        &source,
        "void handle(char *input) {\n    char buf[8];\n    strcpy(buf, input);\n}\n",
    )
    .expect("should write source");

    // When
    let report = analyze::run(&analyze_args(source), &config)
        .await
        .expect("analysis should succeed");

    // Then
    assert_eq!(report.engine, "sast");
    assert_eq!(report.status, ScanStatus::Complete);
    assert!(report.total_findings >= 1, "strcpy should be flagged");
    assert!(
        report
            .findings
            .iter()
            .any(|f| f.line == Some(3)),
        "finding should point at line 3"
    );
}

#[tokio::test]
async fn test_analyze_missing_file_is_io_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(temp_dir.path(), "simulated").await;

    let err = analyze::run(&analyze_args(temp_dir.path().join("absent.bin")), &config)
        .await
        .expect_err("missing file should fail");

    assert_eq!(err.exit_code(), 10);
}

#[tokio::test]
async fn test_analyze_invalid_ecu_type() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(temp_dir.path(), "simulated").await;
    let firmware = temp_dir.path().join("fw.bin");
    fs::write(&firmware, b"fw").expect("should write firmware");

    let mut args = analyze_args(firmware);
    args.ecu_type = "Toaster".to_owned();
    let err = analyze::run(&args, &config)
        .await
        .expect_err("invalid ECU type should fail");

    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("Toaster"));
}

#[tokio::test]
async fn test_analyzed_scan_persists_for_scans_and_report() {
    // Given: one analyzed scan in the file database
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(temp_dir.path(), "simulated").await;
    let firmware = temp_dir.path().join("tcu.bin");
    fs::write(&firmware, b"tcu firmware").expect("should write firmware");
    let analyzed = analyze::run(&analyze_args(firmware), &config)
        .await
        .expect("analysis should succeed");

    // When: the database is reopened
    let store = open_store(&config, false).expect("store should reopen");

    // Then: scans list / show see it
    let listed = scans::list(&store, Some("complete")).expect("list");
    assert_eq!(listed.total, 1);
    assert_eq!(listed.scans[0].id, analyzed.scan_id);
    assert_eq!(listed.scans[0].ecu_type, "Gateway");

    let detail = scans::show(&store, &analyzed.scan_id).expect("show");
    assert_eq!(detail.vulnerabilities.len(), 5);
    assert!(
        detail
            .logs
            .last()
            .expect("logs should exist")
            .message
            .starts_with("Analysis complete - Found 5 total findings")
    );

    // And: report renders in both formats
    let markdown = report::build(&store, &analyzed.scan_id, "markdown").expect("markdown");
    assert!(markdown.content.contains("Central Gateway"));
    let json = report::build(&store, &analyzed.scan_id, "json").expect("json");
    let value: serde_json::Value = serde_json::from_str(&json.content).expect("valid JSON");
    assert!(value.is_object());
}

#[tokio::test]
async fn test_analyze_ephemeral_leaves_database_empty() {
    // Given
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(temp_dir.path(), "simulated").await;
    let firmware = temp_dir.path().join("adas.bin");
    fs::write(&firmware, b"adas").expect("should write firmware");

    // When
    let mut args = analyze_args(firmware);
    args.ephemeral = true;
    analyze::run(&args, &config)
        .await
        .expect("analysis should succeed");

    // Then
    let store = open_store(&config, false).expect("store should open");
    assert_eq!(scans::list(&store, None).expect("list").total, 0);
}
