//! CLI-specific error types and exit code mapping

use ecuscan_analysis::ExecutorError;
use ecuscan_core::error::EcuscanError;
use ecuscan_report::ReportingError;
use ecuscan_store::StoreError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The analysis finished but reported findings at or above the threshold.
    #[error("findings threshold exceeded: {0}")]
    Findings(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from ecuscan-core.
    #[error("{0}")]
    Core(#[from] EcuscanError),

    /// Scan database error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Analysis pipeline error.
    #[error("analysis error: {0}")]
    Analysis(#[from] ExecutorError),

    /// Report rendering error.
    #[error("report error: {0}")]
    Report(#[from] ReportingError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                |
    /// |------|----------------------------------------|
    /// | 0    | Success                                |
    /// | 1    | General / command error                |
    /// | 2    | Configuration error                    |
    /// | 4    | Findings at or above `--fail-on`       |
    /// | 10   | IO error                               |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(EcuscanError::Config(_)) => 2,
            Self::Findings(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_)
            | Self::Command(_)
            | Self::Core(_)
            | Self::Store(_)
            | Self::Analysis(_)
            | Self::Report(_) => 1,
        }
    }
}
