// ---------------------------------------------------------------------------
// WebSocket change feed
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use ecuscan_core::event::{ChangeEvent, ChangeTable};
use ecuscan_core::metrics as m;
use tokio::sync::broadcast;
use tracing::debug;

use crate::auth::token_matches;
use crate::error::ApiError;
use crate::state::{AppState, MAX_WS_CONNECTIONS};

/// Decrements the connection counter and subscriber gauge on drop.
struct WsConnectionGuard {
    state: Arc<AppState>,
}

impl Drop for WsConnectionGuard {
    fn drop(&mut self) {
        self.state.ws_connection_count.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!(m::API_EVENT_SUBSCRIBERS).decrement(1.0);
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct EventQuery {
    pub scan_id: Option<String>,
    pub table: Option<String>,
    /// Browsers cannot set an Authorization header on the upgrade request.
    pub token: Option<String>,
}

/// Subscription filter. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EventFilter {
    pub scan_id: Option<String>,
    pub table: Option<ChangeTable>,
}

impl EventFilter {
    pub(crate) fn from_query(query: &EventQuery) -> Result<Self, ApiError> {
        let table = match query.table.as_deref() {
            Some(raw) => Some(
                ChangeTable::from_str_loose(raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown table: {raw}")))?,
            ),
            None => None,
        };
        Ok(Self {
            scan_id: query.scan_id.clone().filter(|s| !s.is_empty()),
            table,
        })
    }

    pub(crate) fn accepts(&self, event: &ChangeEvent) -> bool {
        event.matches(self.scan_id.as_deref(), self.table)
    }
}

/// GET /api/events
///
/// Token and filter are checked before the upgrade request itself, so a
/// plain GET still gets 401 or 400 back.
pub async fn change_events_ws(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    if let Some(ref expected_hash) = state.api_key_hash {
        let provided = query.token.as_deref().unwrap_or("");
        if !token_matches(expected_hash, provided) {
            return Err(ApiError::Unauthorized(
                "valid token query parameter required for WebSocket".into(),
            ));
        }
    }

    let filter = EventFilter::from_query(&query)?;

    let prev = state.ws_connection_count.fetch_add(1, Ordering::Relaxed);
    if prev >= MAX_WS_CONNECTIONS {
        state.ws_connection_count.fetch_sub(1, Ordering::Relaxed);
        return Err(ApiError::ServiceUnavailable(
            "too many WebSocket connections; try again later".into(),
        ));
    }
    metrics::gauge!(m::API_EVENT_SUBSCRIBERS).increment(1.0);
    let guard = WsConnectionGuard {
        state: state.clone(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        // guard drops here and releases the slot
        Err(rejection) => return Ok(rejection.into_response()),
    };
    let event_rx = state.feed.subscribe();
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, event_rx, filter, guard)))
}

async fn handle_ws(
    mut socket: WebSocket,
    mut event_rx: broadcast::Receiver<Arc<ChangeEvent>>,
    filter: EventFilter,
    _guard: WsConnectionGuard,
) {
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                // Client frames are ignored apart from close.
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
            received = event_rx.recv() => {
                match received {
                    Ok(event) => {
                        if !filter.accepts(&event) {
                            continue;
                        }
                        let json = match serde_json::to_string(event.as_ref()) {
                            Ok(json) => json,
                            Err(e) => {
                                debug!(error = %e, "failed to encode change event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        metrics::counter!(m::API_EVENTS_LAGGED_TOTAL).increment(n);
                        let warning = serde_json::json!({
                            "type": "warning",
                            "message": format!("missed {n} events due to slow consumption")
                        });
                        let msg = Message::Text(warning.to_string().into());
                        if socket.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    debug!("change feed subscriber disconnected");
}
