//! One live connection and its bounded outbound queue.

use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::conn::health::HealthRecord;
use crate::ws::transport::Frame;

pub type ConnectionId = String;

/// The user bound to a connection after first-frame authentication.
/// `current_room` is the cached field broadcast filtering reads; the room
/// directory updates it on join/leave.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: String,
    pub username: String,
    pub current_room: Option<String>,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("outbound queue full")]
    QueueFull,
    #[error("outbound queue closed")]
    Closed,
}

/// Shared as `Arc<Connection>`: the registry map owns one handle, the read
/// and write loops hold clones and never touch the map lock. The outbound
/// queue is bounded and producers only ever `try_send` — a full queue is a
/// signal, not something to wait on.
pub struct Connection {
    id: ConnectionId,
    remote_addr: String,
    outbound: mpsc::Sender<Frame>,
    user: RwLock<Option<SessionUser>>,
    health: HealthRecord,
    cancel: CancellationToken,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, remote_addr: String, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            remote_addr,
            outbound,
            user: RwLock::new(None),
            health: HealthRecord::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn health(&self) -> &HealthRecord {
        &self.health
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Non-blocking enqueue onto the outbound queue.
    pub fn enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        self.health.record_activity();
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.user.read().expect("connection user lock").clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.read().expect("connection user lock").is_some()
    }

    pub fn set_user(&self, user: SessionUser) {
        *self.user.write().expect("connection user lock") = Some(user);
    }

    pub fn current_room(&self) -> Option<String> {
        self.user
            .read()
            .expect("connection user lock")
            .as_ref()
            .and_then(|u| u.current_room.clone())
    }

    pub fn set_current_room(&self, room: Option<String>) {
        if let Some(user) = self.user.write().expect("connection user lock").as_mut() {
            user.current_room = room;
        }
    }
}
