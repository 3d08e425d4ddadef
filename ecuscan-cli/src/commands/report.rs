//! `ecuscan report` command handler

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use ecuscan_report::{ReportDocument, ReportFormat, generate};
use ecuscan_store::ScanStore;

use crate::cli::{OutputFormat, ReportArgs};
use crate::commands::{load_config, open_store};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `report` command.
///
/// Without `--out` the document body goes straight to stdout. With
/// `--out` it is written to the file and a short receipt is rendered.
pub async fn execute(
    args: ReportArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let store = open_store(&config, false)?;

    let document = build(&store, &args.id, &args.format)?;

    match args.out {
        Some(path) => {
            tokio::fs::write(&path, document.content.as_bytes()).await?;
            info!(path = %path.display(), scan_id = %args.id, "report written");
            writer.render(&ReportReceipt {
                scan_id: args.id.clone(),
                format: document.format.to_string(),
                path: path.display().to_string(),
                bytes: document.content.len(),
            })
        }
        None if writer.format() == OutputFormat::Json && document.format != ReportFormat::Json => {
            writer.render(&InlineReport {
                scan_id: args.id.clone(),
                file_name: document.file_name(&args.id),
                content: document.content,
            })
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(document.content.as_bytes())?;
            if !document.content.ends_with('\n') {
                writeln!(handle)?;
            }
            Ok(())
        }
    }
}

/// Parse the format and render the scan's report.
pub fn build(store: &ScanStore, scan_id: &str, format: &str) -> Result<ReportDocument, CliError> {
    let format = ReportFormat::from_str(format)
        .map_err(|e| CliError::Command(format!("{} (expected: json, markdown)", e)))?;
    Ok(generate(store, scan_id, format)?)
}

/// Confirmation printed after writing a report to disk.
#[derive(Debug, Serialize)]
pub struct ReportReceipt {
    pub scan_id: String,
    pub format: String,
    pub path: String,
    pub bytes: usize,
}

impl Render for ReportReceipt {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "Wrote {} report for scan {} to {} ({} bytes)",
            self.format, self.scan_id, self.path, self.bytes
        )
    }
}

/// Non-JSON report wrapped for `--output json`.
#[derive(Debug, Serialize)]
pub struct InlineReport {
    pub scan_id: String,
    pub file_name: String,
    pub content: String,
}

impl Render for InlineReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write!(w, "{}", self.content)
    }
}
