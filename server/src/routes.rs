use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::services::ServeDir;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Per-IP limit on connection attempts; the per-user message rate limit
    // lives in the chat layer. Uses PeerIpKeyExtractor which reads from
    // ConnectInfo<SocketAddr>.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(2)
            .burst_size(10)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Background cleanup of rate limiter state.
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let ws_routes = Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        .layer(GovernorLayer {
            config: governor_config,
        });

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/stats", get(stats));

    let static_dir = state.config.static_dir.clone();

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// GET /api/stats — Server counters and rates.
async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "active_connections": state.registry.count(),
        "rooms": state.rooms.count(),
        "users": state.users.count(),
        "metrics": state.metrics.snapshot(),
    }))
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
