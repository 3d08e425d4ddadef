//! Command handlers -- one module per subcommand

pub mod analyze;
pub mod config;
pub mod report;
pub mod scans;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use ecuscan_core::EcuscanConfig;
use ecuscan_core::error::{ConfigError, EcuscanError};
use ecuscan_store::{ChangeFeed, ScanStore};

use crate::cli::DEFAULT_CONFIG_PATH;
use crate::error::CliError;

/// Load the effective configuration for a command.
///
/// A missing file at the default path yields built-in defaults; any other
/// load or validation failure is a configuration error.
pub async fn load_config(config_path: &Path) -> Result<EcuscanConfig, CliError> {
    let mut config = match EcuscanConfig::from_file(config_path).await {
        Ok(config) => config,
        Err(EcuscanError::Config(ConfigError::FileNotFound { .. }))
            if config_path.as_os_str() == DEFAULT_CONFIG_PATH =>
        {
            debug!("no ecuscan.toml in working directory, using defaults");
            EcuscanConfig::default()
        }
        Err(e) => return Err(CliError::Config(e.to_string())),
    };
    config.apply_env_overrides();
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}

/// Open the scan database described by `[storage]`.
pub fn open_store(config: &EcuscanConfig, ephemeral: bool) -> Result<Arc<ScanStore>, CliError> {
    let feed = ChangeFeed::default();
    let store = if ephemeral || config.storage.in_memory {
        ScanStore::open_in_memory(feed)?
    } else {
        let path = config.storage.resolved_path(&config.general.data_dir);
        debug!(path = %path.display(), "opening scan database");
        ScanStore::open(&path, feed)?
    };
    Ok(Arc::new(store))
}
