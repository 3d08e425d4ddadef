//! 리포트 수집과 렌더링
//!
//! [`collect`]가 스토어에서 리포트 모델을 만들고, [`render`]가 형식별 문자열로 변환합니다.
//! 같은 스토어 상태에 대해 결과는 생성 시각을 제외하고 항상 같습니다.

use std::fmt::Write as _;

use chrono::Utc;
use ecuscan_core::compliance::summarize;
use ecuscan_core::risk::{RiskLevel, SeverityCounts};
use ecuscan_store::ScanStore;
use tracing::debug;

use crate::error::ReportingError;
use crate::types::{ReportDocument, ReportFormat, SbomEntry, ScanReport};

/// 스토어에서 리포트 모델을 수집합니다.
pub fn collect(store: &ScanStore, scan_id: &str) -> Result<ScanReport, ReportingError> {
    let scan = store.get_scan(scan_id)?;

    let mut vulnerabilities = store.list_vulnerabilities(scan_id)?;
    // 안정 정렬: 같은 심각도 안에서는 저장 순서(최신 먼저)를 유지
    vulnerabilities.sort_by(|a, b| b.detail.severity.cmp(&a.detail.severity));
    let severity_counts =
        SeverityCounts::from_severities(vulnerabilities.iter().map(|v| v.detail.severity));

    let compliance_results = store.list_compliance_results(scan_id)?;
    let compliance_summary = summarize(compliance_results.iter().map(|c| &c.detail));

    let sbom = store
        .list_sbom_components(scan_id)?
        .into_iter()
        .map(|component| SbomEntry {
            risk_level: component.detail.risk_level(),
            component,
        })
        .collect();

    Ok(ScanReport {
        generated_at: Utc::now(),
        risk_level: scan.risk_score.map(RiskLevel::from_score),
        scan,
        severity_counts,
        vulnerabilities,
        compliance_summary,
        compliance_results,
        sbom,
    })
}

/// 리포트 모델을 지정 형식으로 렌더링합니다.
pub fn render(report: &ScanReport, format: ReportFormat) -> Result<ReportDocument, ReportingError> {
    let content = match format {
        ReportFormat::Json => serde_json::to_string_pretty(report)?,
        ReportFormat::Markdown => render_markdown(report),
    };
    Ok(ReportDocument {
        format,
        content,
        generated_at: report.generated_at,
    })
}

/// 스캔 리포트를 생성합니다.
pub fn generate(
    store: &ScanStore,
    scan_id: &str,
    format: ReportFormat,
) -> Result<ReportDocument, ReportingError> {
    let report = collect(store, scan_id)?;
    let document = render(&report, format)?;
    debug!(
        scan_id,
        format = %format,
        bytes = document.content.len(),
        "report generated"
    );
    Ok(document)
}

/// 표 셀 안의 `|`와 줄바꿈을 정리합니다.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn opt(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

// `String`에 대한 `write!`는 실패하지 않으므로 결과를 무시합니다.
fn render_markdown(report: &ScanReport) -> String {
    let scan = &report.scan;
    let mut out = String::new();

    let _ = writeln!(out, "# ECU Security Report: {}", scan.ecu_name);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Scan");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Field | Value |");
    let _ = writeln!(out, "|-------|-------|");
    let _ = writeln!(out, "| Scan ID | {} |", scan.id);
    let _ = writeln!(out, "| ECU | {} ({}) |", cell(&scan.ecu_name), scan.ecu_type);
    let _ = writeln!(out, "| Version | {} |", cell(&scan.version));
    let _ = writeln!(
        out,
        "| Manufacturer | {} |",
        cell(opt(scan.manufacturer.as_deref()))
    );
    let _ = writeln!(out, "| Architecture | {} |", scan.architecture);
    let _ = writeln!(
        out,
        "| File | {} ({} bytes) |",
        cell(&scan.file_name),
        scan.file_size
    );
    let _ = writeln!(out, "| Status | {} ({}%) |", scan.status, scan.progress);
    match (scan.risk_score, report.risk_level) {
        (Some(score), Some(level)) => {
            let _ = writeln!(out, "| Risk Score | {score}/100 ({level}) |");
        }
        _ => {
            let _ = writeln!(out, "| Risk Score | pending |");
        }
    }
    let _ = writeln!(out);

    if let Some(summary) = scan.executive_summary.as_deref() {
        let _ = writeln!(out, "## Executive Summary");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", summary.trim());
        let _ = writeln!(out);
    }

    let counts = &report.severity_counts;
    let _ = writeln!(out, "## Findings ({})", counts.total());
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Critical: {} | High: {} | Medium: {} | Low: {} | Info: {}",
        counts.critical, counts.high, counts.medium, counts.low, counts.info
    );
    let _ = writeln!(out);
    if !report.vulnerabilities.is_empty() {
        let _ = writeln!(out, "| Severity | Title | CWE | CVSS | Location | Status |");
        let _ = writeln!(out, "|----------|-------|-----|------|----------|--------|");
        for vuln in &report.vulnerabilities {
            let d = &vuln.detail;
            let location = match (d.affected_component.as_deref(), d.line_number) {
                (Some(file), Some(line)) => format!("{file}:{line}"),
                (Some(file), None) => file.to_owned(),
                (None, _) => "-".to_owned(),
            };
            let cvss = d
                .cvss_score
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "-".to_owned());
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                d.severity,
                cell(&d.title),
                opt(d.cwe_id.as_deref()),
                cvss,
                cell(&location),
                vuln.status
            );
        }
        let _ = writeln!(out);

        for vuln in report
            .vulnerabilities
            .iter()
            .filter(|v| v.detail.remediation.is_some())
        {
            let _ = writeln!(out, "### {}", vuln.detail.title);
            let _ = writeln!(out);
            if let Some(description) = vuln.detail.description.as_deref() {
                let _ = writeln!(out, "{}", description.trim());
                let _ = writeln!(out);
            }
            let _ = writeln!(
                out,
                "**Remediation:** {}",
                opt(vuln.detail.remediation.as_deref())
            );
            if let Some(enrichment) = vuln.detail.enrichment.as_ref() {
                for (i, step) in enrichment.remediation_steps.iter().enumerate() {
                    let _ = writeln!(out, "{}. {}", i + 1, step);
                }
            }
            let _ = writeln!(out);
        }
    }

    let _ = writeln!(out, "## Compliance");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Framework | Pass | Fail | Warning | Pass Rate |");
    let _ = writeln!(out, "|-----------|------|------|---------|-----------|");
    for summary in &report.compliance_summary {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {}% |",
            summary.name, summary.pass, summary.fail, summary.warning, summary.pass_rate
        );
    }
    let _ = writeln!(out);
    if !report.compliance_results.is_empty() {
        let _ = writeln!(out, "| Framework | Rule | Status | Details |");
        let _ = writeln!(out, "|-----------|------|--------|---------|");
        for result in &report.compliance_results {
            let d = &result.detail;
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                cell(&d.framework),
                cell(&d.rule_id),
                d.status.as_str(),
                cell(opt(d.details.as_deref()))
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## SBOM ({} components)", report.sbom.len());
    let _ = writeln!(out);
    if !report.sbom.is_empty() {
        let _ = writeln!(out, "| Component | Version | License | Known CVEs | Risk |");
        let _ = writeln!(out, "|-----------|---------|---------|------------|------|");
        for entry in &report.sbom {
            let d = &entry.component.detail;
            let cves = if d.vulnerabilities.is_empty() {
                "-".to_owned()
            } else {
                d.vulnerabilities.join(", ")
            };
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                cell(&d.component_name),
                cell(opt(d.version.as_deref())),
                cell(opt(d.license.as_deref())),
                cves,
                entry.risk_level.as_str()
            );
        }
    }

    out
}
