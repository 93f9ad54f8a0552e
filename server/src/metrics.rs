//! Server-wide counters, cheap enough to bump from any task.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub struct ServerMetrics {
    total_connections: AtomicU64,
    active_connections: AtomicI64,
    total_messages: AtomicU64,
    total_commands: AtomicU64,
    active_users: AtomicI64,
    active_rooms: AtomicI64,
    started_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: i64,
    pub total_messages: u64,
    pub total_commands: u64,
    pub active_users: i64,
    pub active_rooms: i64,
    pub uptime_secs: u64,
    pub message_rate: f64,
    pub connection_rate: f64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            total_messages: AtomicU64::new(0),
            total_commands: AtomicU64::new(0),
            active_users: AtomicI64::new(0),
            active_rooms: AtomicI64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_broadcast(&self) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_executed(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_registered(&self) {
        self.active_users.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_unregistered(&self) {
        self.active_users.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn room_created(&self) {
        self.active_rooms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_removed(&self) {
        self.active_rooms.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.started_at.elapsed();
        let uptime_secs_f = uptime.as_secs_f64().max(1.0);
        let total_connections = self.total_connections.load(Ordering::Relaxed);
        let total_messages = self.total_messages.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_connections,
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_messages,
            total_commands: self.total_commands.load(Ordering::Relaxed),
            active_users: self.active_users.load(Ordering::Relaxed),
            active_rooms: self.active_rooms.load(Ordering::Relaxed),
            uptime_secs: uptime.as_secs(),
            message_rate: total_messages as f64 / uptime_secs_f,
            connection_rate: total_connections as f64 / uptime_secs_f,
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic activity log line.
pub fn spawn_metrics_reporter(metrics: Arc<ServerMetrics>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snap = metrics.snapshot();
            tracing::info!(
                active_connections = snap.active_connections,
                active_users = snap.active_users,
                active_rooms = snap.active_rooms,
                total_messages = snap.total_messages,
                "server activity"
            );
        }
    })
}
