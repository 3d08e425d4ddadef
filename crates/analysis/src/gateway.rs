//! LLM 게이트웨이 -- AI 분석 및 취약점 보강 연동 지점
//!
//! 실제 HTTP 호출은 [`LlmGateway`] 구현체가 담당하며, 이 모듈은 프롬프트 생성과
//! 응답 해석을 제공합니다.
//!
//! # 응답 해석 규칙
//!
//! - ```` ```json ```` 또는 ```` ``` ```` 코드 펜스는 제거합니다.
//! - 키는 snake_case와 camelCase를 모두 허용합니다.
//! - 알 수 없는 심각도는 medium, 누락된 `rule_id`는 `RULE-001`입니다.
//! - `risk_score`가 없으면 50이며, 0..=100으로 보정합니다.
//! - PII 발견은 CWE-359, 시크릿 발견은 CWE-798 취약점으로 변환합니다.

use std::sync::Arc;

use ecuscan_core::error::AnalysisError;
use ecuscan_core::pipeline::BoxFuture;
use ecuscan_core::risk::clamp_score;
use ecuscan_core::types::{
    ComplianceStatus, DetectionMethod, Enrichment, NewComplianceResult, NewSbomComponent,
    NewVulnerability, Scan, Severity,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::{AnalysisFindings, Analyzer};
use crate::source::{AnalysisSource, is_text_file};

/// 응답에 점수가 없을 때 사용하는 기본 위험도
pub const DEFAULT_GATEWAY_RISK: f64 = 50.0;

/// 누락된 컴플라이언스 규칙 ID 대체값
const DEFAULT_RULE_ID: &str = "RULE-001";

/// 프롬프트에 포함할 텍스트 최대 문자 수
const PROMPT_TEXT_CHARS: usize = 4000;

/// 프롬프트에 포함할 바이너리 헤더 바이트 수
const PROMPT_HEX_BYTES: usize = 500;

const SYSTEM_PROMPT: &str = "You are an automotive ECU security analyst. \
Detect embedded vulnerabilities (memory corruption, race conditions, unsafe flash operations), \
hardcoded credentials and keys, personal data stored in firmware, CAN/LIN/FlexRay bus weaknesses \
and vulnerable supply chain components. Check findings against MISRA C:2023, ISO/SAE 21434:2021, \
ISO 26262:2018, AUTOSAR R22-11 and UNECE WP.29 R155/R156. Respond ONLY with valid JSON.";

const RESPONSE_SHAPE: &str = r#"{
  "vulnerabilities": [{"cve_id": null, "cwe_id": "CWE-XXX", "severity": "critical|high|medium|low",
    "cvss_score": 0.0, "title": "", "description": "", "affected_component": "file.c",
    "affected_function": "fn()", "code_snippet": "", "line_number": 0,
    "detection_method": "llm", "remediation": "", "attack_vector": "", "impact": ""}],
  "compliance_results": [{"framework": "", "rule_id": "", "rule_description": "",
    "status": "pass|fail|warning", "details": ""}],
  "sbom_components": [{"component_name": "", "version": "", "license": "",
    "source_file": "", "vulnerabilities": ["CVE-XXXX-XXXX"]}],
  "pii_findings": [{"type": "", "value": "", "location": "file:line", "severity": "",
    "context": "", "remediation": ""}],
  "secret_findings": [{"type": "", "value": "masked", "location": "file:line", "severity": "",
    "context": "", "remediation": ""}],
  "executive_summary": "",
  "risk_score": 0
}"#;

/// 게이트웨이에 보내는 분석 프롬프트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPrompt {
    pub system: String,
    pub user: String,
}

impl AnalysisPrompt {
    /// 스캔 메타데이터와 파일 내용으로 분석 프롬프트를 만듭니다.
    pub fn build(scan: &Scan, file_name: &str, content: &[u8]) -> Self {
        let text = is_text_file(file_name);
        let body = if text {
            String::from_utf8_lossy(content)
                .chars()
                .take(PROMPT_TEXT_CHARS)
                .collect::<String>()
        } else {
            content
                .iter()
                .take(PROMPT_HEX_BYTES)
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let frameworks = if scan.compliance_frameworks.is_empty() {
            "MISRA C:2023, ISO 21434:2021, ISO 26262:2018".to_owned()
        } else {
            scan.compliance_frameworks.join(", ")
        };

        let user = format!(
            "Analyze this {arch} ECU {kind} for security vulnerabilities.\n\n\
             ECU: {name} ({ecu_type}), version {version}, manufacturer {manufacturer}\n\
             File: {file_name}\n\n\
             {label}\n{body}\n\n\
             Compliance frameworks to check: {frameworks}\n\n\
             Report exact line numbers and code snippets, personal data (emails, phone numbers, \
             IP addresses, device IDs) and secrets (keys, passwords, tokens, certificates).\n\
             Return JSON in this shape:\n{RESPONSE_SHAPE}",
            arch = scan.architecture,
            kind = if text { "source file" } else { "binary" },
            name = scan.ecu_name,
            ecu_type = scan.ecu_type,
            version = scan.version,
            manufacturer = scan.manufacturer.as_deref().unwrap_or("Unknown"),
            label = if text {
                "Source Code Content:"
            } else {
                "Binary Header (hex):"
            },
        );

        Self {
            system: SYSTEM_PROMPT.to_owned(),
            user,
        }
    }
}

/// 취약점 보강 프롬프트
pub fn enrichment_prompt(vuln: &NewVulnerability) -> String {
    format!(
        "For this automotive ECU vulnerability, provide detailed remediation guidance.\n\n\
         Vulnerability: {title}\nCVE: {cve}\nCWE: {cwe}\nSeverity: {severity}\n\
         Description: {description}\nAffected Component: {component}\n\n\
         Provide JSON with keys: detailed_explanation, attack_scenarios (list), \
         automotive_impact, step_by_step_remediation (list), code_fix_example, \
         testing_recommendations (list), iso_26262_asil, iso_21434_cal.",
        title = vuln.title,
        cve = vuln.cve_id.as_deref().unwrap_or("N/A"),
        cwe = vuln.cwe_id.as_deref().unwrap_or("N/A"),
        severity = vuln.severity,
        description = vuln.description.as_deref().unwrap_or(""),
        component = vuln.affected_component.as_deref().unwrap_or("unknown"),
    )
}

/// LLM 게이트웨이
///
/// 응답 원문(JSON 텍스트)을 반환합니다. 해석은 [`GatewayReport::parse`]와
/// [`parse_enrichment`]가 담당합니다.
pub trait LlmGateway: Send + Sync {
    fn name(&self) -> &str;

    /// 전체 분석 요청
    fn analyze<'a>(&'a self, prompt: &'a AnalysisPrompt)
    -> BoxFuture<'a, Result<String, AnalysisError>>;

    /// 단일 취약점 보강 요청
    fn enrich<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, AnalysisError>>;
}

/// 응답을 감싼 마크다운 코드 펜스를 제거합니다.
pub fn strip_code_fences(text: &str) -> String {
    let unfenced = if text.contains("```json") {
        text.replace("```json", "").replace("```", "")
    } else if text.contains("```") {
        text.replace("```", "")
    } else {
        text.to_owned()
    };
    unfenced.trim().to_owned()
}

// --- 응답 스키마 ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVulnerability {
    #[serde(alias = "cveId")]
    cve_id: Option<String>,
    #[serde(alias = "cweId")]
    cwe_id: Option<String>,
    severity: Option<String>,
    #[serde(alias = "cvssScore")]
    cvss_score: Option<Value>,
    title: Option<String>,
    description: Option<String>,
    #[serde(alias = "affectedComponent")]
    affected_component: Option<String>,
    #[serde(alias = "affectedFunction")]
    affected_function: Option<String>,
    #[serde(alias = "codeSnippet")]
    code_snippet: Option<String>,
    #[serde(alias = "lineNumber")]
    line_number: Option<Value>,
    #[serde(alias = "detectionMethod")]
    detection_method: Option<String>,
    remediation: Option<String>,
    #[serde(alias = "attackVector")]
    attack_vector: Option<String>,
    impact: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCompliance {
    framework: Option<String>,
    #[serde(alias = "ruleId")]
    rule_id: Option<String>,
    #[serde(alias = "ruleDescription")]
    rule_description: Option<String>,
    status: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawComponent {
    #[serde(alias = "componentName", alias = "name")]
    component_name: Option<String>,
    version: Option<String>,
    license: Option<String>,
    #[serde(alias = "sourceFile")]
    source_file: Option<String>,
    vulnerabilities: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFinding {
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<String>,
    location: Option<String>,
    severity: Option<String>,
    context: Option<String>,
    remediation: Option<String>,
}

/// 게이트웨이 분석 응답
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GatewayReport {
    vulnerabilities: Vec<RawVulnerability>,
    #[serde(alias = "complianceResults")]
    compliance_results: Vec<RawCompliance>,
    #[serde(alias = "sbomComponents")]
    sbom_components: Vec<RawComponent>,
    #[serde(alias = "piiFindings")]
    pii_findings: Vec<RawFinding>,
    #[serde(alias = "secretFindings")]
    secret_findings: Vec<RawFinding>,
    #[serde(alias = "executiveSummary")]
    executive_summary: Option<String>,
    #[serde(alias = "riskScore")]
    risk_score: Option<Value>,
}

impl GatewayReport {
    /// 응답 텍스트를 해석합니다.
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        let json = strip_code_fences(text);
        serde_json::from_str(&json)
            .map_err(|e| AnalysisError::MalformedResponse(format!("gateway report: {e}")))
    }

    /// 파이프라인 결과로 변환합니다. `file_name`은 위치가 없는 발견의 기본 컴포넌트입니다.
    pub fn into_findings(self, file_name: &str) -> AnalysisFindings {
        let mut vulnerabilities: Vec<NewVulnerability> = self
            .vulnerabilities
            .into_iter()
            .filter_map(convert_vulnerability)
            .collect();
        let pii_count = self.pii_findings.len();
        let secret_count = self.secret_findings.len();
        vulnerabilities.extend(
            self.pii_findings
                .into_iter()
                .map(|f| convert_pii(f, file_name)),
        );
        vulnerabilities.extend(
            self.secret_findings
                .into_iter()
                .map(|f| convert_secret(f, file_name)),
        );

        let compliance_results: Vec<_> = self
            .compliance_results
            .into_iter()
            .filter_map(convert_compliance)
            .collect();
        let sbom_components: Vec<_> = self
            .sbom_components
            .into_iter()
            .filter_map(convert_component)
            .collect();

        let raw_risk = self
            .risk_score
            .as_ref()
            .and_then(number_of)
            .unwrap_or(DEFAULT_GATEWAY_RISK);

        let notes = vec![format!(
            "AI analysis returned {} findings ({pii_count} PII, {secret_count} secrets), \
             {} compliance results, {} SBOM components",
            vulnerabilities.len(),
            compliance_results.len(),
            sbom_components.len()
        )];

        AnalysisFindings {
            vulnerabilities,
            compliance_results,
            sbom_components,
            executive_summary: self.executive_summary.filter(|s| !s.trim().is_empty()),
            risk_score: Some(clamp_score(raw_risk)),
            notes,
        }
    }
}

/// 숫자 또는 숫자 문자열
fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn line_of(value: &Value) -> Option<u32> {
    number_of(value)
        .filter(|n| *n >= 1.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

fn severity_or(raw: Option<&str>, fallback: Severity) -> Severity {
    raw.and_then(Severity::from_str_loose).unwrap_or(fallback)
}

/// `"file:line"` 위치 분리. 줄 번호가 없으면 전체를 파일명으로 사용합니다.
fn split_location(location: Option<&str>, file_name: &str) -> (String, Option<u32>) {
    let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) else {
        return (file_name.to_owned(), None);
    };
    match location.rsplit_once(':') {
        Some((file, line)) => {
            let line = line.trim().parse::<u32>().ok().filter(|n| *n > 0);
            let file = if file.trim().is_empty() { file_name } else { file };
            (file.to_owned(), line)
        }
        None => (location.to_owned(), None),
    }
}

fn convert_vulnerability(raw: RawVulnerability) -> Option<NewVulnerability> {
    let title = raw.title.filter(|t| !t.trim().is_empty())?;
    Some(NewVulnerability {
        severity: severity_or(raw.severity.as_deref(), Severity::Medium),
        cwe_id: raw.cwe_id,
        cve_id: raw.cve_id.filter(|c| !c.eq_ignore_ascii_case("null")),
        cvss_score: raw
            .cvss_score
            .as_ref()
            .and_then(number_of)
            .map(|s| s.clamp(0.0, 10.0)),
        title,
        description: raw.description,
        affected_component: raw.affected_component,
        affected_function: raw.affected_function,
        code_snippet: raw.code_snippet,
        line_number: raw.line_number.as_ref().and_then(line_of),
        detection_method: raw
            .detection_method
            .as_deref()
            .and_then(DetectionMethod::from_str_loose)
            .unwrap_or(DetectionMethod::Ai),
        remediation: raw.remediation,
        attack_vector: raw.attack_vector,
        impact: raw.impact,
        enrichment: None,
    })
}

fn convert_pii(raw: RawFinding, file_name: &str) -> NewVulnerability {
    let kind = raw.kind.unwrap_or_else(|| "other".to_owned());
    let (component, line) = split_location(raw.location.as_deref(), file_name);
    NewVulnerability {
        severity: severity_or(raw.severity.as_deref(), Severity::Medium),
        cwe_id: Some("CWE-359".to_owned()),
        title: format!("PII Exposure: {kind}"),
        description: Some(format!(
            "Personal Identifiable Information ({kind}) detected in source code. Value: {}",
            raw.value.unwrap_or_default()
        )),
        affected_component: Some(component),
        code_snippet: raw.context,
        line_number: line,
        detection_method: DetectionMethod::Pii,
        remediation: Some(raw.remediation.unwrap_or_else(|| {
            "Remove or encrypt PII. Use secure storage mechanisms.".to_owned()
        })),
        attack_vector: Some("Data extraction through reverse engineering or memory dump".to_owned()),
        impact: Some("Privacy violation, GDPR/regulatory compliance issues".to_owned()),
        ..Default::default()
    }
}

fn convert_secret(raw: RawFinding, file_name: &str) -> NewVulnerability {
    let kind = raw.kind.unwrap_or_else(|| "credential".to_owned());
    let (component, line) = split_location(raw.location.as_deref(), file_name);
    NewVulnerability {
        severity: severity_or(raw.severity.as_deref(), Severity::Critical),
        cwe_id: Some("CWE-798".to_owned()),
        title: format!("Hardcoded Secret: {kind}"),
        description: Some(format!(
            "Hardcoded {kind} detected. Masked value: {}",
            raw.value.unwrap_or_default()
        )),
        affected_component: Some(component),
        code_snippet: raw.context,
        line_number: line,
        detection_method: DetectionMethod::Secrets,
        remediation: Some(raw.remediation.unwrap_or_else(|| {
            "Use secure key management (HSM/TPM), environment variables, or encrypted configuration."
                .to_owned()
        })),
        attack_vector: Some(
            "Credential extraction via firmware analysis, enabling unauthorized access".to_owned(),
        ),
        impact: Some("Full system compromise, unauthorized access, lateral movement".to_owned()),
        ..Default::default()
    }
}

fn convert_compliance(raw: RawCompliance) -> Option<NewComplianceResult> {
    let framework = raw.framework.filter(|f| !f.trim().is_empty())?;
    Some(NewComplianceResult {
        framework,
        rule_id: raw
            .rule_id
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RULE_ID.to_owned()),
        rule_description: raw.rule_description,
        status: raw
            .status
            .as_deref()
            .and_then(ComplianceStatus::from_str_loose)
            .unwrap_or(ComplianceStatus::Warning),
        details: raw.details,
    })
}

fn convert_component(raw: RawComponent) -> Option<NewSbomComponent> {
    let component_name = raw.component_name.filter(|n| !n.trim().is_empty())?;
    Some(NewSbomComponent {
        component_name,
        version: raw.version,
        license: raw.license,
        source_file: raw.source_file,
        vulnerabilities: raw.vulnerabilities,
    })
}

/// 보강 응답 해석. 해석할 수 없거나 비어 있으면 `None`.
pub fn parse_enrichment(text: &str) -> Option<Enrichment> {
    let json = strip_code_fences(text);
    match serde_json::from_str::<Enrichment>(&json) {
        Ok(enrichment) if !enrichment.is_empty() => Some(enrichment),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "enrichment response is not valid JSON");
            None
        }
    }
}

/// critical/high 취약점에 보강 정보를 붙입니다.
///
/// 실패는 경고 로그만 남기며 `false`를 반환합니다.
pub async fn enrich_vulnerability(gateway: &dyn LlmGateway, vuln: &mut NewVulnerability) -> bool {
    if vuln.severity < Severity::High {
        return false;
    }
    let prompt = enrichment_prompt(vuln);
    match gateway.enrich(&prompt).await {
        Ok(text) => match parse_enrichment(&text) {
            Some(enrichment) => {
                vuln.enrichment = Some(enrichment);
                true
            }
            None => {
                warn!(
                    gateway = gateway.name(),
                    title = %vuln.title,
                    "enrichment response could not be used"
                );
                false
            }
        },
        Err(e) => {
            warn!(
                gateway = gateway.name(),
                title = %vuln.title,
                error = %e,
                "enrichment request failed"
            );
            false
        }
    }
}

/// 게이트웨이를 분석 엔진으로 사용하는 어댑터
pub struct GatewayAnalyzer {
    gateway: Arc<dyn LlmGateway>,
}

impl GatewayAnalyzer {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }
}

impl Analyzer for GatewayAnalyzer {
    fn name(&self) -> &str {
        self.gateway.name()
    }

    fn analyze<'a>(
        &'a self,
        scan: &'a Scan,
        source: &'a AnalysisSource,
    ) -> BoxFuture<'a, Result<AnalysisFindings, AnalysisError>> {
        Box::pin(async move {
            let AnalysisSource::Binary { file_name, content } = source else {
                return Err(AnalysisError::UnsupportedSource(format!(
                    "{} gateway accepts uploaded files only",
                    self.gateway.name()
                )));
            };
            let prompt = AnalysisPrompt::build(scan, file_name, content);
            let text = self.gateway.analyze(&prompt).await?;
            Ok(GatewayReport::parse(&text)?.into_findings(file_name))
        })
    }
}
