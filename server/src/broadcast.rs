//! Room-scoped message fan-out.
//!
//! A single consumer task drains a bounded request channel in arrival
//! order, so per-room delivery order matches submission order for one
//! broadcaster. Producers never block: a full request channel drops the
//! broadcast (load shed), and a full per-connection queue evicts that
//! connection through the standard unregister path instead of stalling
//! delivery to everyone else.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::conn::connection::ConnectionId;
use crate::conn::registry::ConnectionRegistry;
use crate::metrics::ServerMetrics;
use crate::ws::transport::Frame;

#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub payload: String,
    pub exclude: Option<ConnectionId>,
    pub room: Option<String>,
}

/// Cloneable producer handle onto the broadcast channel.
#[derive(Clone)]
pub struct BroadcastEngine {
    tx: mpsc::Sender<BroadcastRequest>,
}

impl BroadcastEngine {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<BroadcastRequest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Queue a fan-out of `payload` to every live connection except
    /// `exclude`, optionally restricted to one room. Load-sheds when the
    /// request channel is full rather than blocking the caller.
    pub fn broadcast(&self, payload: String, exclude: Option<ConnectionId>, room: Option<String>) {
        let room = room.filter(|r| !r.is_empty());
        let req = BroadcastRequest {
            payload,
            exclude,
            room,
        };
        if self.tx.try_send(req).is_err() {
            tracing::warn!("broadcast channel full, dropping message");
        }
    }

    /// Start the single consumer task.
    pub fn spawn(
        rx: mpsc::Receiver<BroadcastRequest>,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<ServerMetrics>,
    ) -> JoinHandle<()> {
        tokio::spawn(run(rx, registry, metrics))
    }
}

async fn run(
    mut rx: mpsc::Receiver<BroadcastRequest>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ServerMetrics>,
) {
    while let Some(req) = rx.recv().await {
        deliver(&req, &registry, &metrics).await;
    }
}

async fn deliver(req: &BroadcastRequest, registry: &ConnectionRegistry, metrics: &ServerMetrics) {
    let mut delivered = 0usize;

    for conn in registry.snapshot() {
        if Some(conn.id()) == req.exclude.as_ref() {
            continue;
        }
        if let Some(room) = &req.room {
            // Filter on the cached room. Connections with no authenticated
            // user have no room and never match a scoped broadcast.
            if conn.current_room().as_deref() != Some(room.as_str()) {
                continue;
            }
        }
        match conn.enqueue(Frame::Text(req.payload.clone())) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(
                    conn_id = %conn.id(),
                    error = %e,
                    "outbound queue rejected broadcast, evicting connection"
                );
                registry.unregister(conn.id()).await;
            }
        }
    }

    metrics.message_broadcast();

    match &req.room {
        Some(room) => {
            tracing::debug!(delivered, room = %room, exclude = ?req.exclude, "broadcast delivered");
        }
        None => {
            tracing::debug!(delivered, exclude = ?req.exclude, "broadcast delivered");
        }
    }
}
