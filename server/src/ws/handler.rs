//! WebSocket upgrade endpoint.

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;
use std::net::SocketAddr;

use crate::state::AppState;
use crate::ws::transport::WsTransport;

/// GET /ws
/// Upgrades the connection and hands the socket to the connection registry.
/// Rejection at capacity is handled inside the registry: the client gets a
/// notice frame and the socket is closed.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let transport = WsTransport::new(socket, addr.to_string());
        match state.registry.register(Box::new(transport)).await {
            Ok(conn_id) => {
                tracing::info!(conn_id = %conn_id, remote = %addr, "websocket connection accepted");
            }
            Err(e) => {
                tracing::warn!(remote = %addr, error = %e, "websocket connection rejected");
            }
        }
    })
}
