//! `ecuscan scans` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use ecuscan_core::compliance::{FrameworkSummary, summarize};
use ecuscan_core::pipeline::ScanStatus;
use ecuscan_core::risk::SeverityCounts;
use ecuscan_core::types::{AnalysisLog, Scan, Vulnerability};
use ecuscan_store::ScanStore;

use crate::cli::{ScansAction, ScansArgs};
use crate::commands::{load_config, open_store};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, truncate};

/// Execute the `scans` command.
pub async fn execute(
    args: ScansArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let store = open_store(&config, false)?;

    match args.action {
        ScansAction::List { status } => {
            let report = list(&store, status.as_deref())?;
            writer.render(&report)
        }
        ScansAction::Show { id } => {
            let report = show(&store, &id)?;
            writer.render(&report)
        }
    }
}

/// List scans, optionally filtered by status.
pub fn list(store: &ScanStore, status: Option<&str>) -> Result<ScanListReport, CliError> {
    let wanted = status
        .map(|s| {
            ScanStatus::from_str_loose(s).ok_or_else(|| {
                CliError::Command(format!(
                    "invalid status: {} (expected: queued, parsing, decompiling, analyzing, enriching, complete, failed)",
                    s
                ))
            })
        })
        .transpose()?;

    let scans: Vec<ScanRow> = store
        .list_scans()?
        .into_iter()
        .filter(|scan| wanted.is_none_or(|w| scan.status == w))
        .map(ScanRow::from)
        .collect();

    Ok(ScanListReport {
        total: scans.len(),
        scans,
    })
}

/// Load a scan with its findings, compliance summary and log.
pub fn show(store: &ScanStore, scan_id: &str) -> Result<ScanDetailReport, CliError> {
    let scan = store.get_scan(scan_id)?;

    let mut vulnerabilities = store.list_vulnerabilities(scan_id)?;
    vulnerabilities.sort_by(|a, b| b.detail.severity.cmp(&a.detail.severity));
    let compliance = store.list_compliance_results(scan_id)?;
    let sbom_components = store.list_sbom_components(scan_id)?.len();
    let logs = store.list_logs(scan_id)?;

    Ok(ScanDetailReport {
        severity_counts: SeverityCounts::from_severities(
            vulnerabilities.iter().map(|v| v.detail.severity),
        ),
        compliance: summarize(compliance.iter().map(|c| &c.detail))
            .into_iter()
            .filter(|summary| summary.total > 0)
            .collect(),
        scan,
        vulnerabilities,
        sbom_components,
        logs,
    })
}

#[derive(Debug, Serialize)]
pub struct ScanListReport {
    pub total: usize,
    pub scans: Vec<ScanRow>,
}

#[derive(Debug, Serialize)]
pub struct ScanRow {
    pub id: String,
    pub ecu_name: String,
    pub ecu_type: String,
    pub status: ScanStatus,
    pub progress: u8,
    pub risk_score: Option<u8>,
    pub created_at: String,
}

impl From<Scan> for ScanRow {
    fn from(scan: Scan) -> Self {
        Self {
            id: scan.id,
            ecu_name: scan.ecu_name,
            ecu_type: scan.ecu_type.to_string(),
            status: scan.status,
            progress: scan.progress,
            risk_score: scan.risk_score,
            created_at: scan.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl Render for ScanListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.scans.is_empty() {
            writeln!(w, "No scans found.")?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<36}  {:<20} {:<12} {:<11} {:>5}  Created",
            "ID", "ECU", "Type", "Status", "Risk"
        )?;
        writeln!(w, "{}", "-".repeat(110))?;

        for scan in &self.scans {
            let status = scan.status.to_string();
            let status = match scan.status {
                ScanStatus::Complete => status.green(),
                ScanStatus::Failed => status.red(),
                ScanStatus::Queued => status.normal(),
                _ => status.yellow(),
            };
            let risk = scan
                .risk_score
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_owned());
            writeln!(
                w,
                "{:<36}  {:<20} {:<12} {:<11} {:>5}  {}",
                scan.id,
                truncate(&scan.ecu_name, 20),
                scan.ecu_type,
                status,
                risk,
                scan.created_at
            )?;
        }

        writeln!(w)?;
        writeln!(w, "{} scan(s)", self.total)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ScanDetailReport {
    pub scan: Scan,
    pub severity_counts: SeverityCounts,
    pub compliance: Vec<FrameworkSummary>,
    pub sbom_components: usize,
    pub vulnerabilities: Vec<Vulnerability>,
    pub logs: Vec<AnalysisLog>,
}

impl Render for ScanDetailReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let scan = &self.scan;
        writeln!(w, "Scan: {}", scan.id.bold())?;
        writeln!(
            w,
            "  ECU: {} ({}, {}) v{}",
            scan.ecu_name, scan.ecu_type, scan.architecture, scan.version
        )?;
        writeln!(w, "  File: {} ({} bytes)", scan.file_name, scan.file_size)?;
        writeln!(w, "  Status: {} ({}%)", scan.status, scan.progress)?;
        match scan.risk_score {
            Some(score) => writeln!(w, "  Risk score: {}", score)?,
            None => writeln!(w, "  Risk score: N/A")?,
        }
        if !scan.compliance_frameworks.is_empty() {
            writeln!(w, "  Frameworks: {}", scan.compliance_frameworks.join(", "))?;
        }
        writeln!(w, "  SBOM components: {}", self.sbom_components)?;

        writeln!(w)?;
        writeln!(
            w,
            "Vulnerabilities: {} (C:{} H:{} M:{} L:{} I:{})",
            self.vulnerabilities.len(),
            self.severity_counts.critical,
            self.severity_counts.high,
            self.severity_counts.medium,
            self.severity_counts.low,
            self.severity_counts.info
        )?;
        for v in &self.vulnerabilities {
            writeln!(w, "  {}", v)?;
        }

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

        if !self.logs.is_empty() {
            writeln!(w)?;
            writeln!(w, "Log:")?;
            for log in &self.logs {
                writeln!(
                    w,
                    "  {} [{}] {}: {}",
                    log.created_at.format("%H:%M:%S"),
                    log.log_level.as_str(),
                    log.stage,
                    log.message
                )?;
            }
        }

        Ok(())
    }
}
