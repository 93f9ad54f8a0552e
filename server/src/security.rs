//! Validation and sanitization for user-supplied text.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::config::Config;

static NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("name charset regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

const MAX_COMMAND_LENGTH: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("username cannot be empty")]
    EmptyUsername,
    #[error("username too long (max {0} characters)")]
    UsernameTooLong(usize),
    #[error("username contains invalid characters (only letters, numbers, _, - allowed)")]
    InvalidUsernameChars,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message too long (max {0} characters)")]
    MessageTooLong(usize),
    #[error("message appears to be spam")]
    SpamMessage,
    #[error("room name cannot be empty")]
    EmptyRoomName,
    #[error("room name too long (max {0} characters)")]
    RoomNameTooLong(usize),
    #[error("room name contains invalid characters (no spaces, only letters, numbers, _, - allowed)")]
    InvalidRoomNameChars,
    #[error("command must start with /")]
    NotACommand,
    #[error("command too long")]
    CommandTooLong,
}

/// Input limits, a slice of the server config.
#[derive(Debug, Clone)]
pub struct InputValidator {
    max_message_length: usize,
    max_username_length: usize,
    max_room_name_length: usize,
}

impl InputValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            max_message_length: config.max_message_length,
            max_username_length: config.max_username_length,
            max_room_name_length: config.max_room_name_length,
        }
    }

    pub fn validate_username(&self, raw: &str) -> Result<String, ValidationError> {
        let username = raw.trim();
        if username.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if username.chars().count() > self.max_username_length {
            return Err(ValidationError::UsernameTooLong(self.max_username_length));
        }
        if !NAME_CHARS.is_match(username) {
            return Err(ValidationError::InvalidUsernameChars);
        }
        Ok(escape_html(username))
    }

    pub fn validate_message(&self, raw: &str) -> Result<String, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if raw.chars().count() > self.max_message_length {
            return Err(ValidationError::MessageTooLong(self.max_message_length));
        }

        let collapsed = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
        let message = escape_html(&collapsed);

        if is_spam(&message) {
            return Err(ValidationError::SpamMessage);
        }
        Ok(message)
    }

    /// Room names are additionally lowercased for consistency.
    pub fn validate_room_name(&self, raw: &str) -> Result<String, ValidationError> {
        let room = raw.trim();
        if room.is_empty() {
            return Err(ValidationError::EmptyRoomName);
        }
        if room.chars().count() > self.max_room_name_length {
            return Err(ValidationError::RoomNameTooLong(self.max_room_name_length));
        }
        if !NAME_CHARS.is_match(room) {
            return Err(ValidationError::InvalidRoomNameChars);
        }
        Ok(escape_html(&room.to_lowercase()))
    }

    pub fn validate_command(&self, raw: &str) -> Result<String, ValidationError> {
        let command = raw.trim();
        if !command.starts_with('/') {
            return Err(ValidationError::NotACommand);
        }
        if command.chars().count() > MAX_COMMAND_LENGTH {
            return Err(ValidationError::CommandTooLong);
        }
        Ok(escape_html(command))
    }
}

/// Repeated-character / repeated-word spam heuristic.
fn is_spam(message: &str) -> bool {
    if message.chars().count() > 20 {
        let mut char_counts = std::collections::HashMap::new();
        for ch in message.chars() {
            let count = char_counts.entry(ch).or_insert(0u32);
            *count += 1;
            if *count > 10 {
                return true;
            }
        }
    }

    let words: Vec<&str> = message.split_whitespace().collect();
    if words.len() > 5 {
        let mut word_counts = std::collections::HashMap::new();
        for word in words {
            let count = word_counts.entry(word.to_lowercase()).or_insert(0u32);
            *count += 1;
            if *count > 3 {
                return true;
            }
        }
    }

    false
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}
