//! 도메인 타입: 스캔, 취약점, 컴플라이언스, SBOM, 분석 로그
//!
//! 스토어, 분석 엔진, API, 리포트가 공유하는 레코드 구조를 정의합니다.
//! `New*` 타입은 삽입 요청(식별자/타임스탬프 없음), 나머지는 저장된 레코드입니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::ScanStatus;

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성
    #[default]
    Info,
    /// 낮음
    Low,
    /// 중간
    Medium,
    /// 높음
    High,
    /// 치명적, 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 긴급도 내림차순 (critical 먼저)
    pub const BY_URGENCY: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// DB/API 표현
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ECU 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcuType {
    Engine,
    Transmission,
    #[serde(rename = "BCM")]
    Bcm,
    #[serde(rename = "TCU")]
    Tcu,
    #[serde(rename = "ADAS")]
    Adas,
    Infotainment,
    Gateway,
    #[default]
    Other,
}

impl EcuType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Engine => "Engine",
            Self::Transmission => "Transmission",
            Self::Bcm => "BCM",
            Self::Tcu => "TCU",
            Self::Adas => "ADAS",
            Self::Infotainment => "Infotainment",
            Self::Gateway => "Gateway",
            Self::Other => "Other",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "engine" => Some(Self::Engine),
            "transmission" => Some(Self::Transmission),
            "bcm" => Some(Self::Bcm),
            "tcu" => Some(Self::Tcu),
            "adas" => Some(Self::Adas),
            "infotainment" => Some(Self::Infotainment),
            "gateway" => Some(Self::Gateway),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for EcuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 펌웨어 대상 아키텍처
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "ARM")]
    Arm,
    PowerPC,
    TriCore,
    #[serde(rename = "x86")]
    X86,
    #[default]
    Unknown,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arm => "ARM",
            Self::PowerPC => "PowerPC",
            Self::TriCore => "TriCore",
            Self::X86 => "x86",
            Self::Unknown => "Unknown",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "arm" => Some(Self::Arm),
            "powerpc" | "ppc" => Some(Self::PowerPC),
            "tricore" => Some(Self::TriCore),
            "x86" | "x86_64" => Some(Self::X86),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 스캔 우선순위
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// 취약점 검토 상태
///
/// 허용 전이에 대한 서버 측 제약은 없습니다. 열거형 자체가 유일한 검증입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityStatus {
    #[default]
    New,
    Reopened,
    Fixed,
    FalsePositive,
    RiskAccepted,
}

impl VulnerabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reopened => "reopened",
            Self::Fixed => "fixed",
            Self::FalsePositive => "false_positive",
            Self::RiskAccepted => "risk_accepted",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "new" => Some(Self::New),
            "reopened" => Some(Self::Reopened),
            "fixed" => Some(Self::Fixed),
            "false_positive" => Some(Self::FalsePositive),
            "risk_accepted" => Some(Self::RiskAccepted),
            _ => None,
        }
    }
}

impl fmt::Display for VulnerabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 컴플라이언스 규칙 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    Pass,
    Fail,
    Warning,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warning => "warning",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pass" | "passed" => Some(Self::Pass),
            "fail" | "failed" => Some(Self::Fail),
            "warning" | "warn" => Some(Self::Warning),
            _ => None,
        }
    }
}

/// 분석 로그 레벨
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// 취약점 탐지 방법
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    #[default]
    StaticAnalysis,
    Sast,
    BinaryAnalysis,
    Ai,
    Secrets,
    Pii,
}

impl DetectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StaticAnalysis => "static_analysis",
            Self::Sast => "sast",
            Self::BinaryAnalysis => "binary_analysis",
            Self::Ai => "ai",
            Self::Secrets => "secrets",
            Self::Pii => "pii",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "static_analysis" | "static" => Some(Self::StaticAnalysis),
            "sast" => Some(Self::Sast),
            "binary_analysis" | "binary" => Some(Self::BinaryAnalysis),
            "ai" | "llm" | "ai_analysis" => Some(Self::Ai),
            "secrets" | "secret" => Some(Self::Secrets),
            "pii" => Some(Self::Pii),
            _ => None,
        }
    }
}

// --- 스캔 ---

/// 스캔 생성 요청
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewScan {
    /// ECU 이름
    pub ecu_name: String,
    /// ECU 종류
    pub ecu_type: EcuType,
    /// 펌웨어 버전
    pub version: String,
    /// 제조사
    pub manufacturer: Option<String>,
    /// 플랫폼 (예: AUTOSAR Classic)
    pub platform: Option<String>,
    /// 아키텍처
    pub architecture: Architecture,
    /// 업로드 파일명 (저장소 분석이면 저장소 이름)
    pub file_name: String,
    /// 파일 크기 (바이트)
    pub file_size: u64,
    /// 선언된 파일 해시 (SHA-256 hex)
    pub file_hash: Option<String>,
    /// 우선순위
    pub priority: Priority,
    /// 선택된 컴플라이언스 프레임워크
    pub compliance_frameworks: Vec<String>,
    /// 심층(AI 보강) 분석 여부
    pub deep_analysis: bool,
}

impl NewScan {
    /// 필수 필드를 확인합니다.
    pub fn validate(&self) -> Result<(), String> {
        if self.ecu_name.trim().is_empty() {
            return Err("ecu_name must not be empty".to_owned());
        }
        if self.file_name.trim().is_empty() {
            return Err("file_name must not be empty".to_owned());
        }
        if self.ecu_name.len() > 256 {
            return Err("ecu_name must not exceed 256 characters".to_owned());
        }
        Ok(())
    }
}

/// 저장된 스캔 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: String,
    pub ecu_name: String,
    pub ecu_type: EcuType,
    pub version: String,
    pub manufacturer: Option<String>,
    pub platform: Option<String>,
    pub architecture: Architecture,
    pub file_name: String,
    pub file_size: u64,
    pub file_hash: Option<String>,
    pub priority: Priority,
    pub compliance_frameworks: Vec<String>,
    pub deep_analysis: bool,
    pub status: ScanStatus,
    /// 0..=100
    pub progress: u8,
    /// 완료 전에는 `None`
    pub risk_score: Option<u8>,
    pub executive_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl fmt::Display for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scan[{}] {} ({}) status={} progress={}%",
            &self.id[..8.min(self.id.len())],
            self.ecu_name,
            self.ecu_type,
            self.status,
            self.progress,
        )
    }
}

// --- 취약점 ---

/// LLM 기반 취약점 보강 정보
///
/// 모든 필드는 선택 사항입니다. 게이트웨이가 일부만 채워도 유효합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enrichment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_explanation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attack_scenarios: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automotive_impact: Option<String>,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        alias = "step_by_step_remediation"
    )]
    pub remediation_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_fix_example: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub testing_recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_26262_asil: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_21434_cal: Option<String>,
}

impl Enrichment {
    /// 채워진 필드가 하나도 없는지 여부
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// 분석 엔진이 생성한 취약점 (삽입 요청)
///
/// 심각도와 CVSS는 생성 시 한 번만 설정됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewVulnerability {
    pub severity: Severity,
    pub cwe_id: Option<String>,
    pub cve_id: Option<String>,
    /// 0.0..=10.0
    pub cvss_score: Option<f64>,
    pub title: String,
    pub description: Option<String>,
    pub affected_component: Option<String>,
    pub affected_function: Option<String>,
    pub code_snippet: Option<String>,
    pub line_number: Option<u32>,
    pub detection_method: DetectionMethod,
    pub remediation: Option<String>,
    pub attack_vector: Option<String>,
    pub impact: Option<String>,
    pub enrichment: Option<Enrichment>,
}

impl NewVulnerability {
    /// 제목과 심각도만으로 생성합니다.
    pub fn new(title: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            severity,
            ..Default::default()
        }
    }

    /// 저장 전 값 범위를 확인합니다.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("vulnerability title must not be empty".to_owned());
        }
        if let Some(score) = self.cvss_score {
            if !(0.0..=10.0).contains(&score) {
                return Err(format!("cvss_score {score} is out of range 0.0..=10.0"));
            }
        }
        Ok(())
    }
}

/// 저장된 취약점 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub scan_id: String,
    #[serde(flatten)]
    pub detail: NewVulnerability,
    pub status: VulnerabilityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}) status={}",
            self.detail.severity,
            self.detail.title,
            self.detail.cwe_id.as_deref().unwrap_or("no CWE"),
            self.status,
        )
    }
}

// --- 컴플라이언스 ---

/// 컴플라이언스 판정 (삽입 요청)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComplianceResult {
    /// 프레임워크 이름 (자유 텍스트)
    pub framework: String,
    pub rule_id: String,
    pub rule_description: Option<String>,
    pub status: ComplianceStatus,
    pub details: Option<String>,
}

/// 저장된 컴플라이언스 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub id: String,
    pub scan_id: String,
    #[serde(flatten)]
    pub detail: NewComplianceResult,
    pub created_at: DateTime<Utc>,
}

// --- SBOM ---

/// SBOM 컴포넌트 (삽입 요청)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSbomComponent {
    pub component_name: String,
    pub version: Option<String>,
    pub license: Option<String>,
    pub source_file: Option<String>,
    /// 연관된 취약점 식별자
    #[serde(default)]
    pub vulnerabilities: Vec<String>,
}

impl NewSbomComponent {
    /// 연관 취약점 수에서 파생되는 위험 레벨
    pub fn risk_level(&self) -> SbomRiskLevel {
        SbomRiskLevel::from_vulnerability_count(self.vulnerabilities.len())
    }
}

/// 저장된 SBOM 컴포넌트 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SbomComponent {
    pub id: String,
    pub scan_id: String,
    #[serde(flatten)]
    pub detail: NewSbomComponent,
    pub created_at: DateTime<Utc>,
}

/// SBOM 컴포넌트 위험 레벨 (저장하지 않는 파생 값)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SbomRiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SbomRiskLevel {
    /// 0 → low, 1 → medium, 2 → high, 3 이상 → critical
    pub fn from_vulnerability_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 => Self::Medium,
            2 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// --- 분석 로그 ---

/// 저장된 분석 로그
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisLog {
    pub id: String,
    pub scan_id: String,
    pub stage: String,
    pub log_level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for AnalysisLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.created_at.to_rfc3339(),
            self.log_level.as_str(),
            self.stage,
            self.message
        )
    }
}
