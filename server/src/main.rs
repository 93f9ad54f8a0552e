use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use chat_server::broadcast::BroadcastEngine;
use chat_server::chat::history::MessageStore;
use chat_server::chat::message::ServerMessage;
use chat_server::chat::rooms::RoomDirectory;
use chat_server::chat::service::ChatService;
use chat_server::chat::users::UserDirectory;
use chat_server::config::{generate_config_template, Config};
use chat_server::conn::health;
use chat_server::conn::registry::ConnectionRegistry;
use chat_server::metrics::{self, ServerMetrics};
use chat_server::rate_limit::RateLimiter;
use chat_server::routes;
use chat_server::security::InputValidator;
use chat_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chat_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chat_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("chat server v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(config);
    let metrics = Arc::new(ServerMetrics::new());
    let rooms = Arc::new(RoomDirectory::new(
        config.max_rooms,
        config.max_users_per_room,
        metrics.clone(),
    ));
    let users = Arc::new(UserDirectory::new());
    let store = Arc::new(MessageStore::new(config.history_buffer));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_messages,
        config.rate_limit_window(),
        config.enable_rate_limit,
    ));
    let validator = InputValidator::new(&config);

    let (broadcast, broadcast_rx) = BroadcastEngine::new(config.broadcast_buffer);

    let chat = Arc::new(ChatService::new(
        broadcast.clone(),
        rooms.clone(),
        users.clone(),
        store,
        rate_limiter,
        validator,
        metrics.clone(),
        config.clone(),
    ));

    let registry = ConnectionRegistry::spawn(config.clone(), chat, metrics.clone());
    BroadcastEngine::spawn(broadcast_rx, registry.clone(), metrics.clone());

    if config.enable_health_check {
        health::spawn_health_monitor(
            registry.clone(),
            config.health_check_interval(),
            config.pong_timeout(),
        );
    }
    if config.enable_metrics {
        metrics::spawn_metrics_reporter(metrics.clone(), config.metrics_interval());
    }

    let state = AppState {
        config: config.clone(),
        registry: registry.clone(),
        broadcast: broadcast.clone(),
        metrics,
        rooms,
        users,
    };
    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        max_connections = config.max_connections,
        max_rooms = config.max_rooms,
        heartbeat_secs = config.heartbeat_interval_secs,
        "listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(registry, broadcast, config))
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Waits for Ctrl+C, broadcasts a shutdown notice, then force-closes every
/// connection after the grace period.
async fn shutdown_signal(
    registry: Arc<ConnectionRegistry>,
    broadcast: BroadcastEngine,
    config: Arc<Config>,
) {
    tokio::signal::ctrl_c()
        .await
        .expect("install Ctrl+C handler");
    tracing::info!("shutdown signal received, notifying clients");

    broadcast.broadcast(
        ServerMessage::system("Server is shutting down").to_json(),
        None,
        None,
    );
    tokio::time::sleep(config.shutdown_grace()).await;
    registry.shutdown_all().await;
}
