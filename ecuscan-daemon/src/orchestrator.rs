//! Daemon assembly and lifecycle management.
//!
//! The [`Orchestrator`] wires the scan store, change feed, analysis executor
//! and HTTP API together, then runs them until a shutdown signal arrives.
//!
//! # Startup Order
//!
//! 1. Metrics recorder (when enabled)
//! 2. Change feed and scan store
//! 3. Analysis engine and pipeline executor
//! 4. PID file, API listener, stale-scan sweeper
//!
//! # Shutdown Order
//!
//! 1. Stop accepting HTTP requests (graceful drain)
//! 2. Cancel in-flight pipelines and the sweeper
//! 3. Remove the PID file

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use ecuscan_analysis::{
    PipelineExecutor, analyzer_from_config, gateway_from_config, spawn_sweeper,
};
use ecuscan_api::{AppState, HealthReport};
use ecuscan_core::EcuscanConfig;
use ecuscan_core::pipeline::HealthStatus;
use ecuscan_store::{ChangeFeed, ScanStore};

use crate::metrics_server;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: EcuscanConfig,
    store: Arc<ScanStore>,
    state: Arc<AppState>,
    /// Signals the HTTP server and background tasks to stop.
    shutdown_tx: broadcast::Sender<()>,
    /// Cancels in-flight pipelines and the sweeper.
    cancel: CancellationToken,
    start_time: Instant,
    api_task: Option<JoinHandle<std::io::Result<()>>>,
    sweeper_task: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Load `ecuscan.toml` (with environment overrides) and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = EcuscanConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: EcuscanConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let feed = ChangeFeed::new(config.server.event_channel_capacity);
        let store = if config.storage.in_memory {
            tracing::warn!("using in-memory scan store; data is lost on shutdown");
            ScanStore::open_in_memory(feed)
        } else {
            let path = config.storage.resolved_path(&config.general.data_dir);
            tracing::info!(path = %path.display(), "opening scan store");
            ScanStore::open(&path, feed)
        }
        .map_err(|e| anyhow::anyhow!("failed to open scan store: {}", e))?;
        let store = Arc::new(store);

        let analyzer = analyzer_from_config(&config.analysis)
            .map_err(|e| anyhow::anyhow!("failed to build analysis engine: {}", e))?;
        let cancel = CancellationToken::new();
        let mut executor = PipelineExecutor::new(Arc::clone(&store), analyzer)
            .with_policy(config.analysis.risk_policy())
            .with_stage_delay(config.analysis.stage_delay())
            .with_cancellation(cancel.clone());
        if let Some(gateway) = gateway_from_config(&config.analysis)
            .map_err(|e| anyhow::anyhow!("failed to build AI gateway: {}", e))?
        {
            tracing::info!(model = %config.analysis.gateway_model, "AI gateway enabled");
            executor = executor.with_gateway(gateway);
        }
        tracing::info!(engine = executor.engine_name(), "analysis executor initialized");

        let state = Arc::new(AppState::new(executor, &config.server));
        if state.api_key_hash.is_none() {
            tracing::warn!("server.api_key is empty; API authentication is disabled");
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        Ok(Self {
            config,
            store,
            state,
            shutdown_tx,
            cancel,
            start_time: Instant::now(),
            api_task: None,
            sweeper_task: None,
        })
    }

    /// Run until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        let signal = shutdown_signal()?;
        self.run_until(async move {
            let name = signal.await;
            tracing::info!(signal = name, "shutdown signal received");
        })
        .await
    }

    /// Run until `shutdown` resolves or the API server exits on its own.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        let listener = match TcpListener::bind(&self.config.server.listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                if !pid_file.is_empty() {
                    remove_pid_file(Path::new(&pid_file));
                }
                return Err(anyhow::anyhow!(
                    "failed to bind {}: {}",
                    self.config.server.listen_addr,
                    e
                ));
            }
        };

        let sweeper_task = spawn_sweeper(
            Arc::clone(&self.store),
            self.config.analysis.stale_timeout(),
            self.config.analysis.sweep_interval(),
            self.cancel.child_token(),
        );
        register_task(&self.state, "sweeper", sweeper_task.abort_handle());
        self.sweeper_task = Some(sweeper_task);

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        let mut server_shutdown = self.shutdown_tx.subscribe();
        let api_task = tokio::spawn(ecuscan_api::serve(
            listener,
            Arc::clone(&self.state),
            async move {
                let _ = server_shutdown.recv().await;
            },
        ));
        register_task(&self.state, "api", api_task.abort_handle());
        self.api_task = Some(api_task);

        tracing::info!(
            listen_addr = %self.config.server.listen_addr,
            "ecuscan-daemon running"
        );

        let server_exited = tokio::select! {
            _ = shutdown => false,
            _ = self.wait_api_exit() => true,
        };
        if server_exited {
            tracing::error!("API server exited unexpectedly");
        }

        self.shutdown().await;
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }
        Ok(())
    }

    /// Resolves when the API task finishes. Pending forever if not started.
    async fn wait_api_exit(&mut self) {
        match self.api_task.as_mut() {
            Some(task) => {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                    Err(e) => tracing::error!(error = %e, "API server task panicked"),
                }
                self.api_task = None;
            }
            None => std::future::pending::<()>().await,
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = self.api_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "API server failed during shutdown"),
                Err(e) => tracing::error!(error = %e, "API server task panicked"),
            }
        }

        self.cancel.cancel();
        if let Some(task) = self.sweeper_task.take() {
            let _ = task.await;
        }
        tracing::info!("ecuscan-daemon shut down");
    }

    /// Current aggregated health, as reported by `/api/system/health`.
    pub fn health(&self) -> HealthReport {
        self.state.health_report()
    }

    pub fn config(&self) -> &EcuscanConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ScanStore> {
        &self.store
    }

    pub fn app_state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// Report a background task through the API health endpoint.
fn register_task(state: &AppState, name: &'static str, handle: AbortHandle) {
    state.components.register(
        name,
        Box::new(move || {
            if handle.is_finished() {
                HealthStatus::Unhealthy(format!("{name} task exited"))
            } else {
                HealthStatus::Healthy
            }
        }),
    );
}

/// Install SIGTERM/SIGINT handlers and return a future naming the first signal.
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Write the current process PID to a file.
///
/// The file is created with `create_new` so a second daemon fails instead of
/// overwriting it. Parent directories are created with mode 0700 and the file
/// with mode 0600.
pub(crate) fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Logs a warning if the file cannot be removed.
pub(crate) fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

fn record_daemon_metrics() {
    use ecuscan_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    use ecuscan_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_write_pid_file_creates_parent_directory() {
        // Given: A path with non-existent parent directory
        let temp_dir = TempDir::new().expect("should create temp dir");
        let pid_file = temp_dir.path().join("run").join("ecuscan.pid");

        // When: Writing PID file
        write_pid_file(&pid_file).expect("should write PID file");

        // Then: File contains the current PID
        let content = fs::read_to_string(&pid_file).expect("should read PID file");
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_pid_file_sets_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("should create temp dir");
        let pid_file = temp_dir.path().join("ecuscan.pid");
        write_pid_file(&pid_file).expect("should write PID file");

        let mode = fs::metadata(&pid_file).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_write_pid_file_fails_if_already_exists() {
        // Given: An existing PID file
        let temp_dir = TempDir::new().expect("should create temp dir");
        let pid_file = temp_dir.path().join("ecuscan.pid");
        fs::write(&pid_file, "12345").expect("should write initial PID file");

        // When: Attempting to write PID file again
        let err = write_pid_file(&pid_file).expect_err("should refuse existing PID file");

        // Then: The error names the running PID
        let msg = err.to_string();
        assert!(msg.contains("already exists"), "got: {msg}");
        assert!(msg.contains("12345"), "got: {msg}");
        assert_eq!(fs::read_to_string(&pid_file).expect("read"), "12345");
    }

    #[test]
    fn test_remove_pid_file_handles_nonexistent_gracefully() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        remove_pid_file(&temp_dir.path().join("missing.pid"));
    }

    #[tokio::test]
    async fn test_registered_task_reports_exit() {
        // Given: A registered task that has already finished
        let store = Arc::new(ScanStore::open_in_memory(ChangeFeed::default()).expect("store"));
        let executor = PipelineExecutor::new(
            store,
            Arc::new(ecuscan_analysis::SimulatedAnalyzer::new()),
        );
        let state = AppState::new(executor, &ecuscan_core::config::ServerConfig::default());
        let task = tokio::spawn(async {});
        register_task(&state, "worker", task.abort_handle());
        task.await.expect("task should finish");

        // When
        let health = state.health_report();

        // Then
        assert_eq!(
            health.components[1].status,
            HealthStatus::Unhealthy("worker task exited".to_owned())
        );
        assert!(health.status.is_unhealthy());
    }

    #[tokio::test]
    async fn test_uptime_updater_stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = spawn_uptime_updater(Instant::now(), shutdown_rx);

        let _ = shutdown_tx.send(());

        let result = tokio::time::timeout(tokio::time::Duration::from_millis(500), task).await;
        assert!(result.is_ok(), "uptime updater should stop within timeout");
    }
}
