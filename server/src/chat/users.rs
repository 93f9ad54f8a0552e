//! In-memory user directory: username uniqueness and per-connection identity.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::conn::connection::{ConnectionId, SessionUser};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username '{0}' is already taken")]
    NameTaken(String),
}

pub struct UserDirectory {
    by_conn: DashMap<ConnectionId, SessionUser>,
    // lowercase username -> owning connection
    names: DashMap<String, ConnectionId>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            by_conn: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Mints a fresh user id per registration; a reconnect under the same
    /// username gets a new id (and with it a fresh rate budget).
    pub fn register(
        &self,
        conn_id: &ConnectionId,
        username: &str,
    ) -> Result<SessionUser, UserError> {
        match self.names.entry(username.to_lowercase()) {
            Entry::Occupied(_) => Err(UserError::NameTaken(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(conn_id.clone());
                let user = SessionUser {
                    user_id: Uuid::new_v4().to_string(),
                    username: username.to_string(),
                    current_room: None,
                };
                self.by_conn.insert(conn_id.clone(), user.clone());
                Ok(user)
            }
        }
    }

    pub fn unregister(&self, conn_id: &ConnectionId) -> Option<SessionUser> {
        let (_, user) = self.by_conn.remove(conn_id)?;
        self.names.remove(&user.username.to_lowercase());
        Some(user)
    }

    pub fn get(&self, conn_id: &ConnectionId) -> Option<SessionUser> {
        self.by_conn.get(conn_id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.by_conn.len()
    }

    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_conn
            .iter()
            .map(|entry| entry.value().username.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}
