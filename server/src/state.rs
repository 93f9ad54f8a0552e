use std::sync::Arc;

use crate::broadcast::BroadcastEngine;
use crate::chat::rooms::RoomDirectory;
use crate::chat::users::UserDirectory;
use crate::config::Config;
use crate::conn::registry::ConnectionRegistry;
use crate::metrics::ServerMetrics;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcast: BroadcastEngine,
    pub metrics: Arc<ServerMetrics>,
    pub rooms: Arc<RoomDirectory>,
    pub users: Arc<UserDirectory>,
}
