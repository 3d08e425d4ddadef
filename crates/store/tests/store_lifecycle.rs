//! Integration tests for the scan store
//!
//! Tests the scan lifecycle end to end: create -> stage advances -> results -> complete/fail,
//! plus cascade delete and change-event publication.

use chrono::Utc;
use ecuscan_core::event::{ChangeKind, ChangeTable};
use ecuscan_core::pipeline::ScanStatus;
use ecuscan_core::types::{
    Architecture, ComplianceStatus, EcuType, LogLevel, NewComplianceResult, NewSbomComponent,
    NewScan, NewVulnerability, Severity, VulnerabilityStatus,
};
use ecuscan_store::{ChangeFeed, ScanCompletion, ScanStore, StoreError};

fn new_scan(name: &str) -> NewScan {
    NewScan {
        ecu_name: name.to_owned(),
        ecu_type: EcuType::Gateway,
        version: "1.0.0".to_owned(),
        architecture: Architecture::TriCore,
        file_name: "gw.hex".to_owned(),
        file_size: 4096,
        ..Default::default()
    }
}

fn compliance(rule: &str, status: ComplianceStatus) -> NewComplianceResult {
    NewComplianceResult {
        framework: "ISO 21434:2021".to_owned(),
        rule_id: rule.to_owned(),
        rule_description: None,
        status,
        details: None,
    }
}

fn run_to_enriching(store: &ScanStore, scan_id: &str) {
    for status in [
        ScanStatus::Parsing,
        ScanStatus::Decompiling,
        ScanStatus::Analyzing,
        ScanStatus::Enriching,
    ] {
        let progress = status.stage_progress().expect("in-flight stage has progress");
        store
            .advance(scan_id, status, progress)
            .expect("forward advance must succeed");
    }
}

/// Given a queued scan, When the full pipeline runs, Then it completes at 100% with a risk score
#[test]
fn test_full_lifecycle_completes_with_risk_score() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let scan = store.create_scan(&new_scan("GW-1")).expect("create scan");

    run_to_enriching(&store, &scan.id);
    store
        .insert_vulnerability(
            &scan.id,
            &NewVulnerability::new("Hardcoded key", Severity::Critical),
        )
        .expect("insert vulnerability");

    let done = store
        .complete(&scan.id, &ScanCompletion::new(45))
        .expect("complete scan");

    assert_eq!(done.status, ScanStatus::Complete);
    assert_eq!(done.progress, 100);
    assert_eq!(done.risk_score, Some(45));
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
}

/// Given a running scan, When stages advance, Then the log trail follows the stage order
#[test]
fn test_log_trail_follows_stage_order() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let scan = store.create_scan(&new_scan("GW-2")).expect("create scan");

    run_to_enriching(&store, &scan.id);
    store
        .complete(
            &scan.id,
            &ScanCompletion::new(0).with_message("Analysis complete - Found 0 total findings"),
        )
        .expect("complete scan");

    let stages: Vec<String> = store
        .list_logs(&scan.id)
        .expect("list logs")
        .into_iter()
        .map(|log| log.stage)
        .collect();
    assert_eq!(
        stages,
        vec!["parsing", "decompiling", "analyzing", "enriching", "complete"]
    );

    let logs = store.list_logs(&scan.id).expect("list logs");
    assert_eq!(logs[2].message, "Stage analyzing started - Progress: 50%");
    assert_eq!(
        logs[4].message,
        "Analysis complete - Found 0 total findings"
    );
}

/// Given a failed scan, When any result write is attempted, Then it is rejected
#[test]
fn test_no_result_writes_after_failure() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let scan = store.create_scan(&new_scan("GW-3")).expect("create scan");
    store
        .advance(&scan.id, ScanStatus::Analyzing, 50)
        .expect("advance");
    store.fail(&scan.id, "engine crashed").expect("fail scan");

    let vuln = store.insert_vulnerability(&scan.id, &NewVulnerability::new("late", Severity::Low));
    assert!(matches!(vuln, Err(StoreError::ScanTerminal { .. })));

    let comp = store.insert_compliance_result(&scan.id, &compliance("R1", ComplianceStatus::Pass));
    assert!(matches!(comp, Err(StoreError::ScanTerminal { .. })));

    let sbom = store.insert_sbom_component(
        &scan.id,
        &NewSbomComponent {
            component_name: "openssl".to_owned(),
            ..Default::default()
        },
    );
    assert!(matches!(sbom, Err(StoreError::ScanTerminal { .. })));

    // status and progress are frozen
    let frozen = store.get_scan(&scan.id).expect("get scan");
    assert_eq!(frozen.status, ScanStatus::Failed);
    assert_eq!(frozen.progress, 50);
    assert!(store.advance(&scan.id, ScanStatus::Enriching, 75).is_err());
    assert!(store.complete(&scan.id, &ScanCompletion::new(10)).is_err());
}

/// Given a completed scan, When a result write is attempted, Then it is rejected but logs are accepted
#[test]
fn test_completed_scan_accepts_logs_only() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let scan = store.create_scan(&new_scan("GW-4")).expect("create scan");
    store
        .complete(&scan.id, &ScanCompletion::new(20))
        .expect("complete straight from queued");

    assert!(
        store
            .insert_vulnerability(&scan.id, &NewVulnerability::new("late", Severity::High))
            .is_err()
    );
    store
        .append_log(&scan.id, "report", LogLevel::Info, "report exported")
        .expect("logs are append-only even after completion");
}

/// Given a scan with children, When it is deleted, Then all child records are gone
#[test]
fn test_delete_cascades_to_children() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let scan = store.create_scan(&new_scan("GW-5")).expect("create scan");
    store
        .insert_vulnerability(&scan.id, &NewVulnerability::new("v", Severity::Medium))
        .expect("insert vuln");
    store
        .insert_compliance_result(&scan.id, &compliance("R2", ComplianceStatus::Fail))
        .expect("insert compliance");
    store
        .insert_sbom_component(
            &scan.id,
            &NewSbomComponent {
                component_name: "zlib".to_owned(),
                version: Some("1.2.11".to_owned()),
                vulnerabilities: vec!["CVE-2022-37434".to_owned()],
                ..Default::default()
            },
        )
        .expect("insert sbom");
    store
        .append_log(&scan.id, "queued", LogLevel::Info, "hello")
        .expect("append log");

    store.delete_scan(&scan.id).expect("delete scan");

    assert!(matches!(
        store.get_scan(&scan.id),
        Err(StoreError::NotFound { entity: "scan", .. })
    ));
    assert!(store.list_vulnerabilities(&scan.id).expect("list").is_empty());
    assert!(store.list_compliance_results(&scan.id).expect("list").is_empty());
    assert!(store.list_sbom_components(&scan.id).expect("list").is_empty());
    assert!(store.list_logs(&scan.id).expect("list").is_empty());

    assert!(matches!(
        store.delete_scan(&scan.id),
        Err(StoreError::NotFound { .. })
    ));
}

/// Given a vulnerability, When its status changes, Then severity and CVSS are untouched
#[test]
fn test_vulnerability_status_update_keeps_severity() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let scan = store.create_scan(&new_scan("GW-6")).expect("create scan");
    let mut new = NewVulnerability::new("Stack overflow", Severity::High);
    new.cvss_score = Some(8.1);
    let vuln = store.insert_vulnerability(&scan.id, &new).expect("insert");
    assert_eq!(vuln.status, VulnerabilityStatus::New);

    let updated = store
        .update_vulnerability_status(&vuln.id, VulnerabilityStatus::FalsePositive)
        .expect("update status");
    assert_eq!(updated.status, VulnerabilityStatus::FalsePositive);
    assert_eq!(updated.detail.severity, Severity::High);
    assert_eq!(updated.detail.cvss_score, Some(8.1));
}

/// Given child inserts, When listed, Then SBOM is ordered by name and compliance by insert order
#[test]
fn test_child_listing_order() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let scan = store.create_scan(&new_scan("GW-7")).expect("create scan");
    for name in ["zlib", "freertos", "mbedtls"] {
        store
            .insert_sbom_component(
                &scan.id,
                &NewSbomComponent {
                    component_name: name.to_owned(),
                    ..Default::default()
                },
            )
            .expect("insert sbom");
    }
    for rule in ["R1", "R2", "R3"] {
        store
            .insert_compliance_result(&scan.id, &compliance(rule, ComplianceStatus::Warning))
            .expect("insert compliance");
    }

    let names: Vec<String> = store
        .list_sbom_components(&scan.id)
        .expect("list sbom")
        .into_iter()
        .map(|c| c.detail.component_name)
        .collect();
    assert_eq!(names, vec!["freertos", "mbedtls", "zlib"]);

    let rules: Vec<String> = store
        .list_compliance_results(&scan.id)
        .expect("list compliance")
        .into_iter()
        .map(|c| c.detail.rule_id)
        .collect();
    assert_eq!(rules, vec!["R1", "R2", "R3"]);
}

/// Given in-flight and queued scans, When querying stale scans with a future cutoff,
/// Then only in-flight scans are returned
#[test]
fn test_stale_scans_skip_queued_and_terminal() {
    let store = ScanStore::open_in_memory(ChangeFeed::default()).expect("open store");
    let queued = store.create_scan(&new_scan("Q")).expect("create");
    let running = store.create_scan(&new_scan("R")).expect("create");
    let failed = store.create_scan(&new_scan("F")).expect("create");
    store
        .advance(&running.id, ScanStatus::Decompiling, 30)
        .expect("advance");
    store.fail(&failed.id, "x").expect("fail");

    let cutoff = Utc::now() + chrono::Duration::seconds(60);
    let stale: Vec<String> = store
        .stale_scans(cutoff)
        .expect("stale scans")
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(stale, vec![running.id]);
    assert!(!stale.contains(&queued.id));
}

/// Given a subscriber, When a scan is created and advanced, Then events arrive in commit order
#[tokio::test]
async fn test_change_events_follow_commits() {
    let feed = ChangeFeed::new(16);
    let mut rx = feed.subscribe();
    let store = ScanStore::open_in_memory(feed).expect("open store");

    let scan = store.create_scan(&new_scan("EV")).expect("create");
    store
        .advance(&scan.id, ScanStatus::Parsing, 10)
        .expect("advance");

    let first = rx.recv().await.expect("insert event");
    assert_eq!(first.table, ChangeTable::Scans);
    assert_eq!(first.kind, ChangeKind::Insert);

    let second = rx.recv().await.expect("update event");
    assert_eq!(second.table, ChangeTable::Scans);
    assert_eq!(second.kind, ChangeKind::Update);

    let third = rx.recv().await.expect("log event");
    assert_eq!(third.table, ChangeTable::AnalysisLogs);
    assert_eq!(third.scan_id, scan.id);
}

/// Given a file-backed store, When reopened, Then previously written scans are visible
#[test]
fn test_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data").join("ecuscan.db");

    let id = {
        let store = ScanStore::open(&path, ChangeFeed::default()).expect("open");
        store.create_scan(&new_scan("PERSIST")).expect("create").id
    };

    let store = ScanStore::open(&path, ChangeFeed::default()).expect("reopen");
    let scan = store.get_scan(&id).expect("scan persisted");
    assert_eq!(scan.ecu_name, "PERSIST");
    assert_eq!(scan.architecture, Architecture::TriCore);
}
