//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "ecuscan.toml";

/// ecuscan -- ECU firmware vulnerability and compliance scanner.
///
/// Use `ecuscan <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ecuscan", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ecuscan.toml configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a scan for a firmware image and analyze it locally.
    Analyze(AnalyzeArgs),

    /// Inspect stored scans.
    Scans(ScansArgs),

    /// Render the report of a stored scan.
    Report(ReportArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- analyze ----

/// Analyze a firmware image or source file.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Firmware image or source file to analyze.
    pub file: PathBuf,

    /// ECU name (default: file stem).
    #[arg(long)]
    pub ecu_name: Option<String>,

    /// ECU type (Engine, Transmission, BCM, TCU, ADAS, Infotainment, Gateway, Other).
    #[arg(long, default_value = "Other")]
    pub ecu_type: String,

    /// Firmware version.
    #[arg(long, default_value = "unknown")]
    pub version: String,

    /// Target architecture (ARM, PowerPC, TriCore, x86).
    #[arg(long, default_value = "unknown")]
    pub architecture: String,

    /// Compliance frameworks to evaluate (comma separated).
    #[arg(long, value_delimiter = ',', default_value = "misra,iso21434")]
    pub frameworks: Vec<String>,

    /// Exit with code 4 when a finding at or above this severity exists
    /// (info, low, medium, high, critical, none).
    #[arg(long, default_value = "high")]
    pub fail_on: String,

    /// Keep results in memory only, even when a database path is configured.
    #[arg(long)]
    pub ephemeral: bool,
}

// ---- scans ----

/// Inspect stored scans.
#[derive(Args, Debug)]
pub struct ScansArgs {
    #[command(subcommand)]
    pub action: ScansAction,
}

#[derive(Subcommand, Debug)]
pub enum ScansAction {
    /// List scans, newest first.
    List {
        /// Filter by status (queued, parsing, analyzing, complete, failed, ...).
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one scan with its findings.
    Show {
        /// Scan identifier.
        id: String,
    },
}

// ---- report ----

/// Render a scan report.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Scan identifier.
    pub id: String,

    /// Report format (json, markdown).
    #[arg(long, default_value = "markdown")]
    pub format: String,

    /// Write the report to a file instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

// ---- config ----

/// Manage ecuscan configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, server, storage, analysis, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
