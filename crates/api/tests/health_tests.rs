//! Health aggregation tests.

use ecuscan_api::health::{ComponentHealth, aggregate_status};
use ecuscan_core::pipeline::HealthStatus;

#[test]
fn test_aggregate_status_all_healthy() {
    // Given: All components are healthy
    let components = vec![
        ComponentHealth::new("store", HealthStatus::Healthy),
        ComponentHealth::new("api", HealthStatus::Healthy),
        ComponentHealth::new("sweeper", HealthStatus::Healthy),
    ];

    // When: Aggregating status
    let status = aggregate_status(&components);

    // Then: Overall status is Healthy
    assert!(status.is_healthy());
}

#[test]
fn test_aggregate_status_one_degraded() {
    // Given: The sweeper has not started
    let components = vec![
        ComponentHealth::new("store", HealthStatus::Healthy),
        ComponentHealth::new("sweeper", HealthStatus::Degraded("not running".to_owned())),
    ];

    // When: Aggregating status
    let status = aggregate_status(&components);

    // Then: Degraded, with the component name and reason
    match status {
        HealthStatus::Degraded(reason) => {
            assert_eq!(reason, "sweeper: not running");
        }
        other => panic!("expected Degraded status, got: {:?}", other),
    }
}

#[test]
fn test_aggregate_status_unhealthy_wins() {
    // Given: One degraded and one unhealthy component
    let components = vec![
        ComponentHealth::new("api", HealthStatus::Degraded("slow".to_owned())),
        ComponentHealth::new("store", HealthStatus::Unhealthy("database locked".to_owned())),
    ];

    // When: Aggregating status
    let status = aggregate_status(&components);

    // Then: Unhealthy, listing both reasons
    match status {
        HealthStatus::Unhealthy(reason) => {
            assert!(reason.contains("store: database locked"), "got: {reason}");
            assert!(reason.contains("api: slow"), "got: {reason}");
        }
        other => panic!("expected Unhealthy status, got: {:?}", other),
    }
}

#[test]
fn test_aggregate_status_degraded_after_unhealthy_is_ignored() {
    let components = vec![
        ComponentHealth::new("store", HealthStatus::Unhealthy("gone".to_owned())),
        ComponentHealth::new("api", HealthStatus::Degraded("slow".to_owned())),
    ];

    assert_eq!(
        aggregate_status(&components),
        HealthStatus::Unhealthy("store: gone".to_owned())
    );
}

#[test]
fn test_aggregate_status_empty() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn test_health_serializes_with_state_tag() {
    let component = ComponentHealth::new("store", HealthStatus::Degraded("slow".to_owned()));
    let json = serde_json::to_value(&component).expect("serialize");

    assert_eq!(json["name"], "store");
    assert_eq!(json["status"]["state"], "degraded");
    assert_eq!(json["status"]["reason"], "slow");
}
