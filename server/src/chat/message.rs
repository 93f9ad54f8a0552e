//! Wire JSON schema.
//!
//! Clients send frames tagged by `type`; anything that fails to parse as a
//! tagged frame is kept as plain text for the line-based client (first
//! frame = username, `/`-prefixed = command). The server always replies
//! with JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::history::StoredMessage;
use crate::chat::rooms::RoomSummary;

/// Inbound client frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First-frame authentication.
    Join { username: String },
    Message { content: String },
    Command { command: String },
    JoinRoom { room: String },
    LeaveRoom,
    CreateRoom { room: String },
    GetHistory {
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    GetMyHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
    SearchMessages {
        query: String,
        #[serde(default)]
        room: Option<String>,
    },
}

/// A frame as parsed off the wire.
#[derive(Debug, Clone)]
pub enum Inbound {
    Structured(ClientMessage),
    Plain(String),
}

impl Inbound {
    pub fn parse(raw: &str) -> Inbound {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(msg) => Inbound::Structured(msg),
            Err(_) => Inbound::Plain(raw.trim().to_string()),
        }
    }
}

/// Outbound server frame. Optional fields are omitted from the JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Error or informational text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<RoomSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<StoredMessage>>,
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    fn base(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            content: None,
            sender: None,
            username: None,
            room: None,
            message: None,
            users: None,
            rooms: None,
            messages: None,
            timestamp: Utc::now(),
        }
    }

    pub fn auth_request(prompt: &str) -> Self {
        Self {
            content: Some(prompt.to_string()),
            sender: Some("System".to_string()),
            ..Self::base("auth_request")
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            sender: Some("System".to_string()),
            ..Self::base("system")
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::base("error")
        }
    }

    pub fn chat(msg: &StoredMessage) -> Self {
        Self {
            content: Some(msg.content.clone()),
            sender: Some(msg.sender.clone()),
            username: Some(msg.username.clone()),
            room: Some(msg.room.clone()),
            timestamp: msg.timestamp,
            ..Self::base("message")
        }
    }

    /// `user_joined` / `user_left` announcements.
    pub fn event(kind: &str, content: impl Into<String>, room: Option<String>) -> Self {
        Self {
            content: Some(content.into()),
            sender: Some("System".to_string()),
            room,
            ..Self::base(kind)
        }
    }

    pub fn room_joined(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            ..Self::base("room_joined")
        }
    }

    pub fn room_left(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            ..Self::base("room_left")
        }
    }

    pub fn room_created(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            ..Self::base("room_created")
        }
    }

    pub fn rooms_list(rooms: Vec<RoomSummary>) -> Self {
        Self {
            rooms: Some(rooms),
            ..Self::base("rooms_list")
        }
    }

    pub fn users_list(room: &str, users: Vec<String>) -> Self {
        Self {
            room: Some(room.to_string()),
            users: Some(users),
            ..Self::base("users_list")
        }
    }

    pub fn history(messages: Vec<StoredMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::base("history")
        }
    }

    pub fn search_results(messages: Vec<StoredMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::base("search_results")
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("server message serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_frames() {
        match Inbound::parse(r#"{"type":"message","content":"hi"}"#) {
            Inbound::Structured(ClientMessage::Message { content }) => assert_eq!(content, "hi"),
            other => panic!("unexpected parse: {:?}", other),
        }
        match Inbound::parse(r#"{"type":"leave_room"}"#) {
            Inbound::Structured(ClientMessage::LeaveRoom) => {}
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn falls_back_to_plain_text() {
        match Inbound::parse("  alice  ") {
            Inbound::Plain(text) => assert_eq!(text, "alice"),
            other => panic!("unexpected parse: {:?}", other),
        }
        // JSON without a known tag is still plain text.
        match Inbound::parse(r#"{"foo":"bar"}"#) {
            Inbound::Plain(_) => {}
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = ServerMessage::error("nope").to_json();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""message":"nope""#));
        assert!(!json.contains("users"));
        assert!(!json.contains("content"));
    }
}
