//! 메트릭 이름 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭 이름을 한곳에서 정의합니다. 각 크레이트는 이 상수로
//! `metrics::counter!()`, `metrics::gauge!()`, `metrics::histogram!()`을 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ecuscan_`
//! - 영역: `scans_`, `pipeline_`, `store_`, `api_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(ecuscan_core::metrics::SCANS_COMPLETED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 ─────────────────────────────────────────────────────

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 파이프라인 단계 레이블 키
pub const LABEL_STAGE: &str = "stage";

/// 분석 엔진 레이블 키 (simulated, sast, ai)
pub const LABEL_ENGINE: &str = "engine";

/// 변경 테이블 레이블 키
pub const LABEL_TABLE: &str = "table";

// ─── 스캔 ──────────────────────────────────────────────────────────

/// 생성된 스캔 수 (counter)
pub const SCANS_CREATED_TOTAL: &str = "ecuscan_scans_created_total";

/// 분석이 시작된 스캔 수 (counter, label: engine)
pub const SCANS_STARTED_TOTAL: &str = "ecuscan_scans_started_total";

/// 완료된 스캔 수 (counter)
pub const SCANS_COMPLETED_TOTAL: &str = "ecuscan_scans_completed_total";

/// 실패한 스캔 수 (counter)
pub const SCANS_FAILED_TOTAL: &str = "ecuscan_scans_failed_total";

/// 진행 중 시간 초과로 실패 처리된 스캔 수 (counter)
pub const SCANS_TIMED_OUT_TOTAL: &str = "ecuscan_scans_timed_out_total";

/// 실행 중인 스캔 수 (gauge)
pub const SCANS_IN_FLIGHT: &str = "ecuscan_scans_in_flight";

// ─── 파이프라인 ────────────────────────────────────────────────────

/// 탐지된 취약점 수 (counter, label: severity)
pub const PIPELINE_FINDINGS_TOTAL: &str = "ecuscan_pipeline_findings_total";

/// 개별 레코드 삽입 실패 수 (counter, label: table)
pub const PIPELINE_INSERT_FAILURES_TOTAL: &str = "ecuscan_pipeline_insert_failures_total";

/// 스캔 전체 소요 시간 (histogram, 초, label: engine)
pub const PIPELINE_SCAN_DURATION_SECONDS: &str = "ecuscan_pipeline_scan_duration_seconds";

// ─── 스토어 ────────────────────────────────────────────────────────

/// 발행된 변경 이벤트 수 (counter, label: table)
pub const STORE_CHANGE_EVENTS_TOTAL: &str = "ecuscan_store_change_events_total";

// ─── API ───────────────────────────────────────────────────────────

/// 연결된 이벤트 스트림 구독자 수 (gauge)
pub const API_EVENT_SUBSCRIBERS: &str = "ecuscan_api_event_subscribers";

/// 지연으로 유실된 이벤트 수 (counter)
pub const API_EVENTS_LAGGED_TOTAL: &str = "ecuscan_api_events_lagged_total";

// ─── 데몬 ──────────────────────────────────────────────────────────

/// 데몬 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "ecuscan_daemon_uptime_seconds";

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "ecuscan_daemon_build_info";

/// 스캔 소요 시간 히스토그램 버킷 (초)
pub const SCAN_DURATION_BUCKETS: [f64; 9] = [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다. 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(SCANS_CREATED_TOTAL, "Total number of scans created");
    describe_counter!(SCANS_STARTED_TOTAL, "Total number of scan pipeline runs started");
    describe_counter!(
        SCANS_COMPLETED_TOTAL,
        "Total number of scans that reached the complete state"
    );
    describe_counter!(
        SCANS_FAILED_TOTAL,
        "Total number of scans that reached the failed state"
    );
    describe_counter!(
        SCANS_TIMED_OUT_TOTAL,
        "Total number of in-flight scans failed by the stale-scan sweeper"
    );
    describe_gauge!(SCANS_IN_FLIGHT, "Number of scans currently executing");

    describe_counter!(
        PIPELINE_FINDINGS_TOTAL,
        "Total number of vulnerabilities produced by analysis engines"
    );
    describe_counter!(
        PIPELINE_INSERT_FAILURES_TOTAL,
        "Total number of result records that failed to insert"
    );
    describe_histogram!(
        PIPELINE_SCAN_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock duration of a scan pipeline run"
    );

    describe_counter!(
        STORE_CHANGE_EVENTS_TOTAL,
        "Total number of change events published by the store"
    );

    describe_gauge!(
        API_EVENT_SUBSCRIBERS,
        "Number of connected change-event stream subscribers"
    );
    describe_counter!(
        API_EVENTS_LAGGED_TOTAL,
        "Total number of change events skipped by slow subscribers"
    );

    describe_gauge!(
        DAEMON_UPTIME_SECONDS,
        metrics::Unit::Seconds,
        "Daemon uptime in seconds"
    );
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
