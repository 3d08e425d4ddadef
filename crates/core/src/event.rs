//! 변경 이벤트: 스토어 커밋 알림의 기본 단위
//!
//! 스토어는 커밋된 모든 변경마다 [`ChangeEvent`]를 발행합니다.
//! API 이벤트 스트림과 CLI 진행률 표시가 이를 구독합니다.
//! [`EventMetadata`]는 발생 시각, 생성 모듈, 추적 ID를 담습니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- 모듈명 상수 ---

/// 스토어 모듈명
pub const MODULE_STORE: &str = "store";
/// 파이프라인 실행기 모듈명
pub const MODULE_EXECUTOR: &str = "executor";
/// 정체 스캔 정리기 모듈명
pub const MODULE_SWEEPER: &str = "sweeper";
/// HTTP API 모듈명
pub const MODULE_API: &str = "api";

/// 이벤트 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 추적 ID: 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id로 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새 UUID v4 trace_id로 메타데이터를 생성합니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self::new(source_module, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            self.timestamp.timestamp(),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::sync::broadcast` 채널 전송이 가능합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 필터링에 사용)
    fn event_type(&self) -> &str;
}

/// 변경된 테이블
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Scans,
    Vulnerabilities,
    ComplianceResults,
    SbomComponents,
    AnalysisLogs,
}

impl ChangeTable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scans => "scans",
            Self::Vulnerabilities => "vulnerabilities",
            Self::ComplianceResults => "compliance_results",
            Self::SbomComponents => "sbom_components",
            Self::AnalysisLogs => "analysis_logs",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "scans" | "scan" => Some(Self::Scans),
            "vulnerabilities" | "vulnerability" => Some(Self::Vulnerabilities),
            "compliance_results" | "compliance" => Some(Self::ComplianceResults),
            "sbom_components" | "sbom" => Some(Self::SbomComponents),
            "analysis_logs" | "logs" => Some(Self::AnalysisLogs),
            _ => None,
        }
    }
}

/// 변경 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// 커밋된 변경 알림
///
/// 레코드 본문은 담지 않습니다. 구독자는 `record_id`로 다시 읽습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: String,
    pub metadata: EventMetadata,
    pub table: ChangeTable,
    pub kind: ChangeKind,
    /// 관련 스캔 ID
    pub scan_id: String,
    /// 변경된 레코드 ID (`scans` 테이블이면 `scan_id`와 같음)
    pub record_id: String,
}

impl ChangeEvent {
    /// 새 추적을 시작하는 변경 이벤트를 생성합니다.
    pub fn new(
        table: ChangeTable,
        kind: ChangeKind,
        scan_id: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_STORE),
            table,
            kind,
            scan_id: scan_id.into(),
            record_id: record_id.into(),
        }
    }

    /// 스캔 ID와 테이블 필터에 해당하는지 확인합니다. `None`은 전체 허용입니다.
    pub fn matches(&self, scan_id: Option<&str>, table: Option<ChangeTable>) -> bool {
        scan_id.is_none_or(|id| id == self.scan_id) && table.is_none_or(|t| t == self.table)
    }
}

impl Event for ChangeEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        self.table.as_str()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChangeEvent[{}] {:?} {} scan={} record={}",
            &self.id[..8.min(self.id.len())],
            self.kind,
            self.table.as_str(),
            self.scan_id,
            self.record_id,
        )
    }
}
