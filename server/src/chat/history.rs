//! Bounded in-memory message store with history and search.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Connection id of the author.
    pub sender: String,
    pub username: String,
    pub room: String,
    pub timestamp: DateTime<Utc>,
}

pub struct MessageStore {
    messages: Mutex<VecDeque<StoredMessage>>,
    capacity: usize,
}

impl MessageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn save(&self, msg: StoredMessage) {
        let mut messages = self.messages.lock().expect("message store lock");
        if messages.len() == self.capacity {
            messages.pop_front();
        }
        messages.push_back(msg);
    }

    /// Latest `limit` messages for a room, oldest first.
    pub fn room_history(&self, room: &str, limit: usize) -> Vec<StoredMessage> {
        let messages = self.messages.lock().expect("message store lock");
        let mut found: Vec<StoredMessage> = messages
            .iter()
            .rev()
            .filter(|m| m.room == room)
            .take(limit)
            .cloned()
            .collect();
        found.reverse();
        found
    }

    /// Latest `limit` messages authored by `username`, oldest first.
    pub fn user_history(&self, username: &str, limit: usize) -> Vec<StoredMessage> {
        let messages = self.messages.lock().expect("message store lock");
        let mut found: Vec<StoredMessage> = messages
            .iter()
            .rev()
            .filter(|m| m.username == username)
            .take(limit)
            .cloned()
            .collect();
        found.reverse();
        found
    }

    /// Case-insensitive substring search within a room, newest first.
    pub fn search(&self, query: &str, room: &str, limit: usize) -> Vec<StoredMessage> {
        let needle = query.to_lowercase();
        let messages = self.messages.lock().expect("message store lock");
        messages
            .iter()
            .rev()
            .filter(|m| m.room == room && m.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("message store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
