//! Room directory with capacity limits.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::conn::connection::ConnectionId;
use crate::metrics::ServerMetrics;

/// Every authenticated user starts here; this room is never pruned.
pub const DEFAULT_ROOM: &str = "general";

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room limit reached ({0} rooms)")]
    TooManyRooms(usize),
    #[error("room '{0}' is full")]
    RoomFull(String),
    #[error("room '{0}' already exists")]
    AlreadyExists(String),
    #[error("room '{0}' is unavailable")]
    Unavailable(String),
}

#[derive(Debug)]
struct Room {
    members: HashMap<ConnectionId, String>,
    created_at: DateTime<Utc>,
    created_by: String,
}

impl Room {
    fn new(created_by: &str) -> Self {
        Self {
            members: HashMap::new(),
            created_at: Utc::now(),
            created_by: created_by.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub users: usize,
    pub max_users: usize,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

pub struct RoomDirectory {
    rooms: DashMap<String, Room>,
    max_rooms: usize,
    max_users_per_room: usize,
    metrics: Arc<ServerMetrics>,
}

impl RoomDirectory {
    pub fn new(max_rooms: usize, max_users_per_room: usize, metrics: Arc<ServerMetrics>) -> Self {
        let dir = Self {
            rooms: DashMap::new(),
            max_rooms,
            max_users_per_room,
            metrics,
        };
        dir.rooms
            .insert(DEFAULT_ROOM.to_string(), Room::new("System"));
        dir.metrics.room_created();
        dir
    }

    pub fn create(&self, name: &str, created_by: &str) -> Result<(), RoomError> {
        if self.rooms.contains_key(name) {
            return Err(RoomError::AlreadyExists(name.to_string()));
        }
        if self.rooms.len() >= self.max_rooms {
            return Err(RoomError::TooManyRooms(self.max_rooms));
        }
        self.rooms.insert(name.to_string(), Room::new(created_by));
        self.metrics.room_created();
        tracing::debug!(room = %name, created_by = %created_by, "room created");
        Ok(())
    }

    /// Put the connection in `name`, creating the room on demand.
    pub fn join(
        &self,
        conn_id: &ConnectionId,
        username: &str,
        name: &str,
    ) -> Result<(), RoomError> {
        if !self.rooms.contains_key(name) {
            match self.create(name, username) {
                Ok(()) | Err(RoomError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut room = self
            .rooms
            .get_mut(name)
            .ok_or_else(|| RoomError::Unavailable(name.to_string()))?;
        if room.members.len() >= self.max_users_per_room {
            return Err(RoomError::RoomFull(name.to_string()));
        }
        room.members.insert(conn_id.clone(), username.to_string());
        Ok(())
    }

    /// Remove the connection from `name`; empty non-default rooms are pruned.
    pub fn leave(&self, conn_id: &ConnectionId, name: &str) {
        let empty = match self.rooms.get_mut(name) {
            Some(mut room) => {
                room.members.remove(conn_id);
                room.members.is_empty()
            }
            None => return,
        };

        if empty
            && name != DEFAULT_ROOM
            && self
                .rooms
                .remove_if(name, |_, room| room.members.is_empty())
                .is_some()
        {
            self.metrics.room_removed();
            tracing::debug!(room = %name, "empty room removed");
        }
    }

    pub fn members(&self, name: &str) -> Vec<String> {
        let Some(room) = self.rooms.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = room.members.values().cloned().collect();
        names.sort();
        names
    }

    pub fn summaries(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|entry| RoomSummary {
                name: entry.key().clone(),
                users: entry.value().members.len(),
                max_users: self.max_users_per_room,
                created_at: entry.value().created_at,
                created_by: entry.value().created_by.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}
