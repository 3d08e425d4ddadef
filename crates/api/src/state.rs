//! Shared application state.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Instant;

use ecuscan_analysis::PipelineExecutor;
use ecuscan_core::config::ServerConfig;
use ecuscan_core::pipeline::HealthStatus;
use ecuscan_store::{ChangeFeed, ScanStore};
use sha2::{Digest, Sha256};

use crate::health::{ComponentHealth, ComponentRegistry, HealthReport};

/// Maximum number of concurrent change-feed WebSocket connections.
pub const MAX_WS_CONNECTIONS: usize = 100;

/// State handed to every handler.
///
/// The store is synchronous and serializes access internally; handlers call it
/// directly without holding an async lock.
pub struct AppState {
    pub store: Arc<ScanStore>,
    pub executor: PipelineExecutor,
    pub feed: ChangeFeed,
    pub started_at: Instant,
    /// SHA-256 of the API key. The plaintext key is not kept.
    pub api_key_hash: Option<[u8; 32]>,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
    /// Open WebSocket connections.
    pub ws_connection_count: AtomicUsize,
    /// Background components reported by `/api/system/health`.
    pub components: ComponentRegistry,
}

pub(crate) fn hash_api_key(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

impl AppState {
    pub fn new(executor: PipelineExecutor, server: &ServerConfig) -> Self {
        let store = Arc::clone(executor.store());
        let feed = store.feed().clone();
        let api_key = server.api_key.trim();
        Self {
            store,
            executor,
            feed,
            started_at: Instant::now(),
            api_key_hash: (!api_key.is_empty()).then(|| hash_api_key(api_key)),
            cors_origins: server.cors_origins.clone(),
            max_body_bytes: server.max_body_bytes,
            ws_connection_count: AtomicUsize::new(0),
            components: ComponentRegistry::default(),
        }
    }

    /// Database health followed by every registered component.
    pub fn health_report(&self) -> HealthReport {
        let store = match self.store.ping() {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        self.report_with_store(store)
    }

    pub(crate) fn report_with_store(&self, store: HealthStatus) -> HealthReport {
        let mut components = vec![ComponentHealth::new("store", store)];
        components.extend(self.components.snapshot());
        HealthReport::from_components(components)
    }

    pub fn engine(&self) -> &str {
        self.executor.engine_name()
    }
}
