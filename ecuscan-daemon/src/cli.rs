//! CLI argument definitions for ecuscan-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use ecuscan_core::EcuscanConfig;
use ecuscan_core::error::{ConfigError, EcuscanError};

/// Default configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ecuscan/ecuscan.toml";

/// ecuscan ECU firmware scan daemon.
///
/// Serves the scan API, runs analysis pipelines and fails stale scans.
#[derive(Parser, Debug)]
#[command(name = "ecuscan-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to ecuscan.toml configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Resolve the effective configuration: defaults, file, env, then flags.
    ///
    /// A missing file at the default path falls back to built-in defaults so
    /// the daemon can start without any setup. A missing file at an explicit
    /// path is an error.
    pub async fn load_config(&self) -> Result<EcuscanConfig> {
        let mut config = match EcuscanConfig::from_file(&self.config).await {
            Ok(config) => config,
            Err(EcuscanError::Config(ConfigError::FileNotFound { .. }))
                if self.config.as_os_str() == DEFAULT_CONFIG_PATH =>
            {
                EcuscanConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("failed to load config: {}", e)),
        };
        config.apply_env_overrides();

        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(ref format) = self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(ref pid_file) = self.pid_file {
            config.general.pid_file = pid_file.clone();
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        Ok(config)
    }
}
