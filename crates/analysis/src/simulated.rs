//! 시뮬레이션 엔진 -- 고정된 결과로 파이프라인을 끝까지 구동합니다.
//!
//! 실제 분석 엔진 없이 대시보드와 API를 시연하거나 테스트할 때 사용합니다.
//! 바이너리 소스는 정책 점수를, 저장소 소스는 고정 점수 65를 사용합니다.

use ecuscan_core::compliance::selection_matches;
use ecuscan_core::error::AnalysisError;
use ecuscan_core::pipeline::BoxFuture;
use ecuscan_core::types::{
    ComplianceStatus, DetectionMethod, NewComplianceResult, NewSbomComponent, NewVulnerability,
    Scan, Severity,
};

use crate::engine::{AnalysisFindings, Analyzer};
use crate::source::{AnalysisSource, RepositoryRef};

/// 저장소 분석 고정 점수
pub const REPOSITORY_RISK_SCORE: u8 = 65;

struct CannedVulnerability {
    title: &'static str,
    description: &'static str,
    severity: Severity,
    cwe_id: &'static str,
    cvss_score: f64,
    component: &'static str,
    line_number: Option<u32>,
    remediation: &'static str,
}

impl CannedVulnerability {
    fn to_new(&self) -> NewVulnerability {
        NewVulnerability {
            severity: self.severity,
            cwe_id: Some(self.cwe_id.to_owned()),
            cvss_score: Some(self.cvss_score),
            title: self.title.to_owned(),
            description: Some(self.description.to_owned()),
            affected_component: Some(self.component.to_owned()),
            line_number: self.line_number,
            detection_method: DetectionMethod::StaticAnalysis,
            remediation: Some(self.remediation.to_owned()),
            ..Default::default()
        }
    }
}

const BINARY_FINDINGS: [CannedVulnerability; 5] = [
    CannedVulnerability {
        title: "Buffer Overflow in CAN Message Handler",
        description: "Stack-based buffer overflow in the CAN message processing routine. \
                      A crafted CAN frame can trigger arbitrary code execution.",
        severity: Severity::Critical,
        cwe_id: "CWE-119",
        cvss_score: 9.8,
        component: "can_handler.c",
        line_number: Some(142),
        remediation: "Use bounded string functions and validate message length before processing.",
    },
    CannedVulnerability {
        title: "Hardcoded API Key Detected",
        description: "A hardcoded API key is embedded in the firmware and grants access to \
                      external services.",
        severity: Severity::High,
        cwe_id: "CWE-798",
        cvss_score: 7.5,
        component: "config.h",
        line_number: Some(23),
        remediation: "Move API keys to secure storage or encrypted configuration.",
    },
    CannedVulnerability {
        title: "Integer Overflow in Sensor Data Processing",
        description: "Sensor value arithmetic can overflow and produce incorrect calculations.",
        severity: Severity::Medium,
        cwe_id: "CWE-190",
        cvss_score: 5.3,
        component: "sensor_proc.c",
        line_number: Some(87),
        remediation: "Add bounds checking before arithmetic operations.",
    },
    CannedVulnerability {
        title: "Debug Interface Enabled in Production",
        description: "The JTAG debug interface is enabled, exposing the ECU to physical access attacks.",
        severity: Severity::High,
        cwe_id: "CWE-489",
        cvss_score: 6.8,
        component: "boot_config.bin",
        line_number: None,
        remediation: "Disable debug interfaces in production firmware builds.",
    },
    CannedVulnerability {
        title: "Weak Random Number Generator",
        description: "The PRNG used for cryptographic operations is not cryptographically secure.",
        severity: Severity::Medium,
        cwe_id: "CWE-338",
        cvss_score: 5.9,
        component: "crypto_utils.c",
        line_number: Some(56),
        remediation: "Replace with a CSPRNG such as a hardware RNG.",
    },
];

const REPOSITORY_FINDINGS: [CannedVulnerability; 3] = [
    CannedVulnerability {
        title: "Potential Command Injection",
        description: "User input is passed to system() without sanitization.",
        severity: Severity::Critical,
        cwe_id: "CWE-78",
        cvss_score: 9.1,
        component: "src/controls.c",
        line_number: Some(234),
        remediation: "Sanitize all user inputs before passing them to system commands.",
    },
    CannedVulnerability {
        title: "Insecure CAN Message Handling",
        description: "CAN messages are processed without authentication or validation.",
        severity: Severity::High,
        cwe_id: "CWE-306",
        cvss_score: 7.8,
        component: "src/can_interface.c",
        line_number: Some(89),
        remediation: "Implement message authentication codes (MAC) for CAN messages.",
    },
    CannedVulnerability {
        title: "Memory Leak in Socket Handler",
        description: "Socket connections are not closed, leading to resource exhaustion.",
        severity: Severity::Medium,
        cwe_id: "CWE-401",
        cvss_score: 5.3,
        component: "src/icsim.c",
        line_number: Some(156),
        remediation: "Free all allocated resources when a connection closes.",
    },
];

/// (framework, rule_id, description, status, details)
const COMPLIANCE_ROWS: [(&str, &str, &str, ComplianceStatus, &str); 3] = [
    (
        "ISO 21434",
        "CAL-1",
        "Risk Assessment - Cybersecurity Engineering",
        ComplianceStatus::Pass,
        "Threat analysis documentation found and valid.",
    ),
    (
        "MISRA C",
        "Rule-11.5",
        "No cast from pointer to void to pointer to object",
        ComplianceStatus::Fail,
        "Found 3 violations in sensor_proc.c",
    ),
    (
        "ISO 21434",
        "SEC-2",
        "Secure Coding Standards",
        ComplianceStatus::Warning,
        "Some coding standards violations detected.",
    ),
];

/// (name, version, license)
const BINARY_COMPONENTS: [(&str, &str, &str); 5] = [
    ("FreeRTOS", "10.5.1", "MIT"),
    ("lwIP", "2.1.3", "BSD-3-Clause"),
    ("mbed TLS", "3.4.0", "Apache-2.0"),
    ("CAN driver", "2.0.0", "Proprietary"),
    ("STM32 HAL", "1.8.0", "BSD-3-Clause"),
];

const REPOSITORY_COMPONENTS: [(&str, &str, &str); 3] = [
    ("SDL2", "2.0.20", "Zlib"),
    ("can-utils", "2021.08.0", "GPL-2.0"),
    ("vcan", "kernel", "GPL-2.0"),
];

fn components(rows: &[(&str, &str, &str)]) -> Vec<NewSbomComponent> {
    rows.iter()
        .map(|(name, version, license)| NewSbomComponent {
            component_name: (*name).to_owned(),
            version: Some((*version).to_owned()),
            license: Some((*license).to_owned()),
            ..Default::default()
        })
        .collect()
}

/// 고정 결과 엔진
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedAnalyzer;

impl SimulatedAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn binary_findings(scan: &Scan, file_name: &str) -> AnalysisFindings {
        let vulnerabilities: Vec<_> = BINARY_FINDINGS.iter().map(CannedVulnerability::to_new).collect();
        let compliance_results: Vec<_> = COMPLIANCE_ROWS
            .iter()
            .filter(|(framework, ..)| selection_matches(&scan.compliance_frameworks, framework))
            .map(
                |(framework, rule_id, description, status, details)| NewComplianceResult {
                    framework: (*framework).to_owned(),
                    rule_id: (*rule_id).to_owned(),
                    rule_description: Some((*description).to_owned()),
                    status: *status,
                    details: Some((*details).to_owned()),
                },
            )
            .collect();
        let sbom_components = components(&BINARY_COMPONENTS);

        let mut notes = vec![
            format!(
                "Binary file {file_name} parsed successfully. Detected {} architecture.",
                scan.architecture
            ),
            "Static analysis complete. Found potential vulnerabilities.".to_owned(),
            format!("Identified {} security findings.", vulnerabilities.len()),
        ];
        if !scan.compliance_frameworks.is_empty() {
            notes.push(format!(
                "Compliance check complete for {}.",
                scan.compliance_frameworks.join(", ")
            ));
        }
        notes.push(format!(
            "SBOM generated with {} components.",
            sbom_components.len()
        ));

        let summary = summarize(&scan.ecu_name, &vulnerabilities);
        AnalysisFindings {
            vulnerabilities,
            compliance_results,
            sbom_components,
            executive_summary: Some(summary),
            risk_score: None,
            notes,
        }
    }

    fn repository_findings(scan: &Scan, repo: &RepositoryRef) -> AnalysisFindings {
        let vulnerabilities: Vec<_> = REPOSITORY_FINDINGS
            .iter()
            .map(CannedVulnerability::to_new)
            .collect();
        let notes = vec![
            format!(
                "Repository {} ({}) cloned from {}.",
                repo.slug(),
                repo.branch,
                repo.provider.as_str()
            ),
            "Static analysis of source code complete.".to_owned(),
            "Secret detection scan complete.".to_owned(),
            format!("Identified {} security findings.", vulnerabilities.len()),
            "SBOM generated from source dependencies.".to_owned(),
        ];
        let summary = summarize(&scan.ecu_name, &vulnerabilities);
        AnalysisFindings {
            vulnerabilities,
            compliance_results: Vec::new(),
            sbom_components: components(&REPOSITORY_COMPONENTS),
            executive_summary: Some(summary),
            risk_score: Some(REPOSITORY_RISK_SCORE),
            notes,
        }
    }
}

fn summarize(ecu_name: &str, vulnerabilities: &[NewVulnerability]) -> String {
    let critical = vulnerabilities
        .iter()
        .filter(|v| v.severity == Severity::Critical)
        .count();
    let high = vulnerabilities
        .iter()
        .filter(|v| v.severity == Severity::High)
        .count();
    format!(
        "Simulated assessment of {ecu_name}: {} findings, {critical} critical and {high} high severity.",
        vulnerabilities.len()
    )
}

impl Analyzer for SimulatedAnalyzer {
    fn name(&self) -> &str {
        "simulated"
    }

    fn analyze<'a>(
        &'a self,
        scan: &'a Scan,
        source: &'a AnalysisSource,
    ) -> BoxFuture<'a, Result<AnalysisFindings, AnalysisError>> {
        Box::pin(async move {
            Ok(match source {
                AnalysisSource::Binary { file_name, .. } => Self::binary_findings(scan, file_name),
                AnalysisSource::Repository(repo) => Self::repository_findings(scan, repo),
            })
        })
    }
}
