//! HTTP-Router – WebSocket-Upgrade, Health und Metriken auf einem Port
//!
//! - `GET /` und `GET /ws` – WebSocket-Upgrade
//! - `GET /health` – Verbindungsanzahl
//! - `GET /metrics` – Prometheus (abschaltbar)

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use colorcast_observability::{health_router, metrics_router, timing_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::connection::ClientConnection;
use crate::server_state::RelayState;

/// Baut den vollstaendigen Router des Relays
pub fn router(state: Arc<RelayState>) -> Router {
    let mut app = Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(Arc::clone(&state))
        .merge(health_router(state.registry.clone()));

    if state.config.metriken_endpunkt {
        app = app.merge(metrics_router(state.metriken.clone()));
    }

    app.layer(axum::middleware::from_fn_with_state(
        state.metriken.clone(),
        timing_middleware,
    ))
    .layer(CorsLayer::permissive())
}

/// WebSocket-Upgrade, startet den Verbindungs-Task
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(remote = %remote, fehler = %e, "WebSocket-Upgrade fehlgeschlagen");
    })
    .on_upgrade(move |socket| ClientConnection::neu(state, remote).verarbeiten(socket))
}
