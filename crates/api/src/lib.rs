// ---------------------------------------------------------------------------
// ecuscan HTTP/WebSocket API
// ---------------------------------------------------------------------------
//
// Exposes scan management, analysis start, result listings, reports and the
// change feed over axum.

pub mod auth;
pub mod error;
pub mod health;
mod routes;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

pub use error::{ApiError, ApiErrorBody};
pub use health::{ComponentHealth, HealthReport};
pub use state::{AppState, MAX_WS_CONNECTIONS};

/// Build the axum Router (useful for testing).
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    routes::build_router(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let app = build_router(state);
    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("API server shut down");
    Ok(())
}
