//! Authoritative table of live connections.
//!
//! All mutation is funneled through one task reading the register and
//! unregister channels, so the map is never mutated concurrently. Lookups
//! and counts go through a read-write lock for direct access from any task.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::Config;
use crate::conn::actor;
use crate::conn::connection::{Connection, ConnectionId};
use crate::conn::health::HealthSnapshot;
use crate::metrics::ServerMetrics;
use crate::ws::transport::{Frame, Transport};

/// Side effects the registry fires on connection lifecycle transitions.
/// The chat layer implements this; the registry stays ignorant of rooms,
/// users, and message formats.
#[async_trait]
pub trait ConnectionEvents: Send + Sync + 'static {
    /// Inbound text frame from a registered connection.
    async fn on_message(&self, conn: &Arc<Connection>, text: String);

    /// Fired exactly once per connection, from the unregister path.
    async fn on_disconnect(&self, conn: &Arc<Connection>);

    /// Payload pushed to a connection right after registration.
    fn greeting(&self) -> String;

    /// Payload written to a connection rejected at capacity.
    fn reject_notice(&self) -> String;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("server is at capacity ({max} connections)")]
    AtCapacity { max: usize },
    #[error("registry is shutting down")]
    ShuttingDown,
}

struct RegisterRequest {
    transport: Box<dyn Transport>,
    reply: oneshot::Sender<Result<ConnectionId, RegistryError>>,
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    events: Arc<dyn ConnectionEvents>,
    metrics: Arc<ServerMetrics>,
    config: Arc<Config>,
}

impl ConnectionRegistry {
    /// Build the registry and spawn its mutator task.
    pub fn spawn(
        config: Arc<Config>,
        events: Arc<dyn ConnectionEvents>,
        metrics: Arc<ServerMetrics>,
    ) -> Arc<Self> {
        let (register_tx, register_rx) = mpsc::channel(64);
        let (unregister_tx, unregister_rx) = mpsc::channel(256);

        let registry = Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            register_tx,
            unregister_tx,
            events,
            metrics,
            config,
        });

        tokio::spawn(registry.clone().run(register_rx, unregister_rx));
        registry
    }

    /// Hand a freshly upgraded transport to the registry. At capacity the
    /// transport gets a rejection notice, is closed, and `AtCapacity` comes
    /// back — a normal, logged outcome, not a fault.
    pub async fn register(&self, transport: Box<dyn Transport>) -> Result<ConnectionId, RegistryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.register_tx
            .send(RegisterRequest {
                transport,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ShuttingDown)?;
        reply_rx.await.map_err(|_| RegistryError::ShuttingDown)?
    }

    /// Queue a connection for removal. Safe to call any number of times;
    /// only the first removal has effects.
    pub async fn unregister(&self, id: &ConnectionId) {
        let _ = self.unregister_tx.send(id.clone()).await;
    }

    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .expect("connection map lock")
            .get(id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.connections.read().expect("connection map lock").len()
    }

    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .expect("connection map lock")
            .values()
            .cloned()
            .collect()
    }

    pub fn health(&self, id: &ConnectionId) -> Option<HealthSnapshot> {
        self.lookup(id).map(|conn| conn.health().snapshot())
    }

    /// Force-close every live connection, each through the unregister path.
    pub async fn shutdown_all(&self) {
        for conn in self.snapshot() {
            self.unregister(conn.id()).await;
        }
    }

    async fn run(
        self: Arc<Self>,
        mut register_rx: mpsc::Receiver<RegisterRequest>,
        mut unregister_rx: mpsc::Receiver<ConnectionId>,
    ) {
        loop {
            tokio::select! {
                Some(req) = register_rx.recv() => self.clone().handle_register(req).await,
                Some(id) = unregister_rx.recv() => self.handle_unregister(&id).await,
                else => break,
            }
        }
    }

    async fn handle_register(self: Arc<Self>, req: RegisterRequest) {
        let max = self.config.max_connections;
        if self.count() >= max {
            tracing::warn!(max, "connection limit reached, rejecting");
            let (_reader, mut writer) = req.transport.split();
            let write_timeout = self.config.write_timeout();
            let _ = timeout(
                write_timeout,
                writer.send_frame(Frame::Text(self.events.reject_notice())),
            )
            .await;
            let _ = timeout(write_timeout, writer.close()).await;
            let _ = req.reply.send(Err(RegistryError::AtCapacity { max }));
            return;
        }

        let id: ConnectionId = Uuid::new_v4().to_string();
        let remote = req.transport.remote_address();
        let (reader, writer) = req.transport.split();
        let (out_tx, out_rx) = mpsc::channel(self.config.send_buffer.max(1));
        let conn = Arc::new(Connection::new(id.clone(), remote.clone(), out_tx));

        self.connections
            .write()
            .expect("connection map lock")
            .insert(id.clone(), conn.clone());
        self.metrics.connection_opened();

        tracing::info!(
            conn_id = %id,
            remote = %remote,
            total = self.count(),
            max,
            "connection registered"
        );

        if conn.enqueue(Frame::Text(self.events.greeting())).is_err() {
            tracing::warn!(conn_id = %id, "greeting rejected by fresh queue, dropping connection");
            self.handle_unregister(&id).await;
            let _ = req.reply.send(Err(RegistryError::ShuttingDown));
            return;
        }

        actor::spawn_connection(
            conn,
            reader,
            writer,
            out_rx,
            self.clone(),
            self.events.clone(),
            self.config.clone(),
        );

        let _ = req.reply.send(Ok(id));
    }

    async fn handle_unregister(&self, id: &ConnectionId) {
        let removed = {
            self.connections
                .write()
                .expect("connection map lock")
                .remove(id)
        };
        // Duplicate unregister is a no-op.
        let Some(conn) = removed else { return };

        conn.cancel_token().cancel();
        self.events.on_disconnect(&conn).await;
        self.metrics.connection_closed();

        tracing::info!(
            conn_id = %id,
            remote = %conn.remote_addr(),
            total = self.count(),
            "connection unregistered"
        );
    }
}
