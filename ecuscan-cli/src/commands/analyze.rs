//! `ecuscan analyze` command handler
//!
//! Creates a scan in the configured database, drives it through the
//! analysis pipeline in-process and prints a summary. Stage pauses are
//! skipped; the CLI never waits on simulated progress.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use ecuscan_analysis::source::sha256_hex;
use ecuscan_analysis::{
    AnalysisSource, PipelineExecutor, analyzer_from_config, gateway_from_config,
};
use ecuscan_core::EcuscanConfig;
use ecuscan_core::compliance::{FrameworkSummary, summarize};
use ecuscan_core::pipeline::ScanStatus;
use ecuscan_core::risk::{RiskLevel, SeverityCounts};
use ecuscan_core::types::{Architecture, EcuType, NewScan, Severity};

use crate::cli::AnalyzeArgs;
use crate::commands::{load_config, open_store};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, truncate};

/// Execute the `analyze` command.
pub async fn execute(
    args: AnalyzeArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let threshold = parse_threshold(&args.fail_on)?;

    let report = run(&args, &config).await?;
    writer.render(&report)?;

    check_threshold(&report, threshold)
}

/// Create and analyze a scan, returning the rendered summary payload.
pub async fn run(args: &AnalyzeArgs, config: &EcuscanConfig) -> Result<AnalyzeReport, CliError> {
    let content = tokio::fs::read(&args.file).await?;
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::Command(format!("not a file: {}", args.file.display())))?;

    let new_scan = build_new_scan(args, &file_name, &content)?;
    let store = open_store(config, args.ephemeral)?;
    let scan = store.create_scan(&new_scan)?;

    let analyzer = analyzer_from_config(&config.analysis)?;
    let mut executor = PipelineExecutor::new(store.clone(), analyzer)
        .with_policy(config.analysis.risk_policy())
        .with_stage_delay(Duration::ZERO);
    if let Some(gateway) = gateway_from_config(&config.analysis)? {
        executor = executor.with_gateway(gateway);
    }

    info!(
        scan_id = %scan.id,
        file = %file_name,
        engine = executor.engine_name(),
        "analyzing firmware"
    );

    let scan = executor
        .run(
            &scan.id,
            AnalysisSource::Binary {
                file_name: file_name.clone(),
                content,
            },
        )
        .await?;

    let mut vulnerabilities = store.list_vulnerabilities(&scan.id)?;
    vulnerabilities.sort_by(|a, b| b.detail.severity.cmp(&a.detail.severity));
    let compliance = store.list_compliance_results(&scan.id)?;
    let sbom_components = store.list_sbom_components(&scan.id)?.len();

    let severity_counts =
        SeverityCounts::from_severities(vulnerabilities.iter().map(|v| v.detail.severity));
    let frameworks = summarize(compliance.iter().map(|c| &c.detail))
        .into_iter()
        .filter(|summary| summary.total > 0)
        .collect();

    Ok(AnalyzeReport {
        scan_id: scan.id,
        ecu_name: scan.ecu_name,
        file_name: scan.file_name,
        file_size: scan.file_size,
        file_hash: scan.file_hash,
        engine: executor.engine_name().to_owned(),
        status: scan.status,
        risk_score: scan.risk_score,
        risk_level: scan
            .risk_score
            .map(|score| RiskLevel::from_score(score).as_str().to_owned()),
        executive_summary: scan.executive_summary,
        severity_counts,
        total_findings: vulnerabilities.len(),
        compliance: frameworks,
        sbom_components,
        findings: vulnerabilities
            .into_iter()
            .map(|v| FindingEntry {
                severity: v.detail.severity,
                title: v.detail.title,
                cwe_id: v.detail.cwe_id,
                component: v.detail.affected_component,
                line: v.detail.line_number,
            })
            .collect(),
    })
}

fn build_new_scan(args: &AnalyzeArgs, file_name: &str, content: &[u8]) -> Result<NewScan, CliError> {
    let ecu_type = EcuType::from_str_loose(&args.ecu_type).ok_or_else(|| {
        CliError::Command(format!(
            "invalid ECU type: {} (expected: Engine, Transmission, BCM, TCU, ADAS, Infotainment, Gateway, Other)",
            args.ecu_type
        ))
    })?;
    let architecture = Architecture::from_str_loose(&args.architecture).ok_or_else(|| {
        CliError::Command(format!(
            "invalid architecture: {} (expected: ARM, PowerPC, TriCore, x86, unknown)",
            args.architecture
        ))
    })?;

    let ecu_name = match &args.ecu_name {
        Some(name) => name.clone(),
        None => args
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_owned()),
    };

    Ok(NewScan {
        ecu_name,
        ecu_type,
        version: args.version.clone(),
        architecture,
        file_name: file_name.to_owned(),
        file_size: content.len() as u64,
        file_hash: Some(sha256_hex(content)),
        compliance_frameworks: args.frameworks.clone(),
        ..Default::default()
    })
}

/// Parse `--fail-on`. `none` disables the check.
pub fn parse_threshold(s: &str) -> Result<Option<Severity>, CliError> {
    if s.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Severity::from_str_loose(s).map(Some).ok_or_else(|| {
        CliError::Command(format!(
            "invalid severity: {} (expected: info, low, medium, high, critical, none)",
            s
        ))
    })
}

/// Fail with exit code 4 when any finding is at or above `threshold`.
pub fn check_threshold(report: &AnalyzeReport, threshold: Option<Severity>) -> Result<(), CliError> {
    let Some(threshold) = threshold else {
        return Ok(());
    };
    let count = report
        .findings
        .iter()
        .filter(|f| f.severity >= threshold)
        .count();
    if count > 0 {
        return Err(CliError::Findings(format!(
            "{} finding(s) at or above {}",
            count, threshold
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct AnalyzeReport {
    pub scan_id: String,
    pub ecu_name: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_hash: Option<String>,
    pub engine: String,
    pub status: ScanStatus,
    pub risk_score: Option<u8>,
    pub risk_level: Option<String>,
    pub executive_summary: Option<String>,
    pub severity_counts: SeverityCounts,
    pub total_findings: usize,
    pub compliance: Vec<FrameworkSummary>,
    pub sbom_components: usize,
    pub findings: Vec<FindingEntry>,
}

#[derive(Debug, Serialize)]
pub struct FindingEntry {
    pub severity: Severity,
    pub title: String,
    pub cwe_id: Option<String>,
    pub component: Option<String>,
    pub line: Option<u32>,
}

impl Render for AnalyzeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Scan: {} ({})", self.scan_id.bold(), self.ecu_name)?;
        writeln!(w, "File: {} ({} bytes)", self.file_name, self.file_size)?;
        if let Some(ref hash) = self.file_hash {
            writeln!(w, "SHA-256: {}", hash)?;
        }
        writeln!(w, "Engine: {}", self.engine)?;
        writeln!(w, "Status: {}", self.status)?;

        match (self.risk_score, &self.risk_level) {
            (Some(score), Some(level)) => {
                let risk = format!("{} ({})", score, level);
                if score >= 70 {
                    writeln!(w, "Risk score: {}", risk.red().bold())?;
                } else if score >= 40 {
                    writeln!(w, "Risk score: {}", risk.yellow())?;
                } else {
                    writeln!(w, "Risk score: {}", risk.green())?;
                }
            }
            _ => writeln!(w, "Risk score: N/A")?,
        }
        writeln!(w)?;

        let counts = format!(
            "{} total (C:{} H:{} M:{} L:{} I:{})",
            self.total_findings,
            self.severity_counts.critical,
            self.severity_counts.high,
            self.severity_counts.medium,
            self.severity_counts.low,
            self.severity_counts.info
        );
        if self.total_findings > 0 {
            writeln!(w, "Findings: {}", counts.red().bold())?;
        } else {
            writeln!(w, "Findings: {}", counts.green().bold())?;
        }
        writeln!(w, "SBOM components: {}", self.sbom_components)?;

        if !self.compliance.is_empty() {
            writeln!(w)?;
            writeln!(w, "Compliance:")?;
            for summary in &self.compliance {
                writeln!(
                    w,
                    "  {:<22} {:>3}% (pass {} / fail {} / warning {})",
                    summary.name, summary.pass_rate, summary.pass, summary.fail, summary.warning
                )?;
            }
        }

        writeln!(w)?;
        if self.findings.is_empty() {
            writeln!(w, "{}", "No vulnerabilities found.".green())?;
        } else {
            writeln!(
                w,
                "{:<10} {:<10} {:<44} Location",
                "Severity", "CWE", "Title"
            )?;
            writeln!(w, "{}", "-".repeat(80))?;
            for f in &self.findings {
                let label = f.severity.to_string();
                let severity = match f.severity {
                    Severity::Critical => label.red().bold(),
                    Severity::High => label.red(),
                    Severity::Medium => label.yellow(),
                    Severity::Low => label.normal(),
                    Severity::Info => label.dimmed(),
                };
                let location = match (&f.component, f.line) {
                    (Some(component), Some(line)) => format!("{}:{}", component, line),
                    (Some(component), None) => component.clone(),
                    _ => "-".to_owned(),
                };
                writeln!(
                    w,
                    "{:<10} {:<10} {:<44} {}",
                    severity,
                    f.cwe_id.as_deref().unwrap_or("-"),
                    truncate(&f.title, 44),
                    location
                )?;
            }
        }

        if let Some(ref summary) = self.executive_summary {
            writeln!(w)?;
            writeln!(w, "{}", summary)?;
        }

        Ok(())
    }
}
