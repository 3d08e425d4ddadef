//! 리포트 형식과 문서 타입

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ecuscan_core::compliance::FrameworkSummary;
use ecuscan_core::error::ReportError;
use ecuscan_core::risk::{RiskLevel, SeverityCounts};
use ecuscan_core::types::{
    ComplianceResult, SbomComponent, SbomRiskLevel, Scan, Vulnerability,
};
use serde::Serialize;

/// 리포트 출력 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    /// 대소문자를 구분하지 않고 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "markdown" | "md" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// HTTP Content-Type
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Markdown => "text/markdown; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| ReportError::UnsupportedFormat(s.to_owned()))
    }
}

/// SBOM 항목과 파생 위험 레벨
#[derive(Debug, Clone, Serialize)]
pub struct SbomEntry {
    #[serde(flatten)]
    pub component: SbomComponent,
    pub risk_level: SbomRiskLevel,
}

/// 스캔 하나의 리포트 모델
///
/// 렌더러는 이 구조만 읽습니다.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub generated_at: DateTime<Utc>,
    pub scan: Scan,
    /// 완료되지 않은 스캔은 `None`
    pub risk_level: Option<RiskLevel>,
    pub severity_counts: SeverityCounts,
    /// 심각도 내림차순
    pub vulnerabilities: Vec<Vulnerability>,
    pub compliance_summary: Vec<FrameworkSummary>,
    pub compliance_results: Vec<ComplianceResult>,
    pub sbom: Vec<SbomEntry>,
}

/// 렌더링된 리포트
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub format: ReportFormat,
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

impl ReportDocument {
    /// 다운로드 파일명 (`ecuscan-{scan_id}.{ext}`)
    pub fn file_name(&self, scan_id: &str) -> String {
        format!("ecuscan-{scan_id}.{}", self.format.extension())
    }
}

impl fmt::Display for ReportDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReportDocument(format={}, bytes={})",
            self.format,
            self.content.len()
        )
    }
}
