//! ecuscan 공통 크레이트
//!
//! ECU 펌웨어 보안 스캔 관리 백엔드의 모든 크레이트가 공유하는 타입과 정책을 정의합니다.
//!
//! - [`types`]: 스캔, 취약점, 컴플라이언스, SBOM, 분석 로그 레코드
//! - [`pipeline`]: 스캔 상태 머신과 전이 검증
//! - [`risk`]: 위험도 점수 정책
//! - [`compliance`]: 프레임워크 별칭 매칭과 통과율
//! - [`event`]: 스토어 변경 이벤트
//! - [`config`]: `ecuscan.toml` 설정
//! - [`error`]: 도메인 에러
//! - [`metrics`]: 메트릭 이름

pub mod compliance;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod risk;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    AnalysisError, ConfigError, EcuscanError, PipelineError, ReportError, StorageError,
};

// 설정
pub use config::EcuscanConfig;

// 이벤트
pub use event::{ChangeEvent, ChangeKind, ChangeTable, Event, EventMetadata};

// 파이프라인
pub use pipeline::{BoxFuture, HealthStatus, ScanStatus, validate_transition};

// 정책
pub use compliance::{Framework, FrameworkSummary};
pub use risk::{RiskLevel, RiskPolicy, SeverityCounts};

// 도메인 타입
pub use types::{
    AnalysisLog, Architecture, ComplianceResult, ComplianceStatus, DetectionMethod, EcuType,
    Enrichment, LogLevel, NewComplianceResult, NewScan, NewSbomComponent, NewVulnerability,
    Priority, SbomComponent, SbomRiskLevel, Scan, Severity, Vulnerability, VulnerabilityStatus,
};
