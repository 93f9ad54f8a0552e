//! Inbound message routing: authentication, rate limiting, dispatch, and
//! the disconnect side effects fired from the registry's unregister path.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::broadcast::BroadcastEngine;
use crate::chat::commands;
use crate::chat::history::{MessageStore, StoredMessage};
use crate::chat::message::{ClientMessage, Inbound, ServerMessage};
use crate::chat::rooms::{RoomDirectory, DEFAULT_ROOM};
use crate::chat::users::UserDirectory;
use crate::config::Config;
use crate::conn::connection::{Connection, SessionUser};
use crate::conn::registry::ConnectionEvents;
use crate::metrics::ServerMetrics;
use crate::rate_limit::RateLimiter;
use crate::security::InputValidator;
use crate::ws::transport::Frame;

const DEFAULT_HISTORY_LIMIT: usize = 25;
const MAX_HISTORY_LIMIT: usize = 100;
const SEARCH_LIMIT: usize = 50;

pub struct ChatService {
    pub(crate) broadcast: BroadcastEngine,
    pub(crate) rooms: Arc<RoomDirectory>,
    pub(crate) users: Arc<UserDirectory>,
    pub(crate) store: Arc<MessageStore>,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    pub(crate) validator: InputValidator,
    pub(crate) metrics: Arc<ServerMetrics>,
    pub(crate) config: Arc<Config>,
}

impl ChatService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broadcast: BroadcastEngine,
        rooms: Arc<RoomDirectory>,
        users: Arc<UserDirectory>,
        store: Arc<MessageStore>,
        rate_limiter: Arc<RateLimiter>,
        validator: InputValidator,
        metrics: Arc<ServerMetrics>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            broadcast,
            rooms,
            users,
            store,
            rate_limiter,
            validator,
            metrics,
            config,
        }
    }

    /// Best-effort direct reply. Unlike the broadcast path, a full queue
    /// here is logged and dropped, not treated as connection death.
    pub(crate) fn send_to(&self, conn: &Arc<Connection>, msg: ServerMessage) {
        if let Err(e) = conn.enqueue(Frame::Text(msg.to_json())) {
            tracing::warn!(conn_id = %conn.id(), error = %e, "failed to queue direct reply");
        }
    }

    pub(crate) fn send_error(&self, conn: &Arc<Connection>, text: impl Into<String>) {
        self.send_to(conn, ServerMessage::error(text));
    }

    async fn authenticate(&self, conn: &Arc<Connection>, inbound: Inbound) {
        let raw_username = match inbound {
            Inbound::Structured(ClientMessage::Join { username }) => username,
            Inbound::Plain(text) => text,
            Inbound::Structured(_) => {
                self.send_error(conn, "Please authenticate first: send your username");
                return;
            }
        };

        let username = match self.validator.validate_username(&raw_username) {
            Ok(name) => name,
            Err(e) => {
                self.send_error(conn, e.to_string());
                return;
            }
        };

        let user = match self.users.register(conn.id(), &username) {
            Ok(user) => user,
            Err(e) => {
                self.send_error(conn, e.to_string());
                return;
            }
        };
        conn.set_user(user);
        self.metrics.user_registered();

        if let Err(e) = self.switch_room(conn, &username, DEFAULT_ROOM) {
            tracing::warn!(conn_id = %conn.id(), error = %e, "failed to join default room");
        }

        tracing::info!(conn_id = %conn.id(), username = %username, "user authenticated");

        self.send_to(
            conn,
            ServerMessage::system(format!(
                "Welcome {}! You joined room '{}'",
                username, DEFAULT_ROOM
            )),
        );
        self.send_to(conn, ServerMessage::rooms_list(self.rooms.summaries()));
        self.send_to(
            conn,
            ServerMessage::users_list(DEFAULT_ROOM, self.rooms.members(DEFAULT_ROOM)),
        );

        self.broadcast.broadcast(
            ServerMessage::event(
                "user_joined",
                format!("{} joined room '{}'", username, DEFAULT_ROOM),
                Some(DEFAULT_ROOM.to_string()),
            )
            .to_json(),
            Some(conn.id().clone()),
            Some(DEFAULT_ROOM.to_string()),
        );
    }

    /// Move the connection into `new_room`, silently leaving the old room
    /// first. The connection's cached room is what broadcast filtering sees.
    pub(crate) fn switch_room(
        &self,
        conn: &Arc<Connection>,
        username: &str,
        new_room: &str,
    ) -> Result<String, String> {
        let room = self
            .validator
            .validate_room_name(new_room)
            .map_err(|e| e.to_string())?;

        if let Some(old) = conn.current_room() {
            self.rooms.leave(conn.id(), &old);
            conn.set_current_room(None);
        }

        self.rooms
            .join(conn.id(), username, &room)
            .map_err(|e| e.to_string())?;
        conn.set_current_room(Some(room.clone()));
        Ok(room)
    }

    pub(crate) async fn handle_chat_message(
        &self,
        conn: &Arc<Connection>,
        user: &SessionUser,
        content: String,
    ) {
        let Some(room) = conn.current_room() else {
            self.send_error(
                conn,
                "You must be in a room to send messages. Use /join <room> to join a room",
            );
            return;
        };

        let content = match self.validator.validate_message(&content) {
            Ok(content) => content,
            Err(e) => {
                self.send_error(conn, e.to_string());
                return;
            }
        };

        let msg = StoredMessage {
            kind: "message".to_string(),
            content,
            sender: conn.id().clone(),
            username: user.username.clone(),
            room: room.clone(),
            timestamp: Utc::now(),
        };
        self.store.save(msg.clone());

        self.broadcast.broadcast(
            ServerMessage::chat(&msg).to_json(),
            Some(conn.id().clone()),
            Some(room),
        );
    }

    pub(crate) async fn handle_command(
        &self,
        conn: &Arc<Connection>,
        user: &SessionUser,
        raw: String,
    ) {
        let command = match self.validator.validate_command(&raw) {
            Ok(command) => command,
            Err(e) => {
                self.send_error(conn, format!("Invalid command: {}", e));
                return;
            }
        };

        self.metrics.command_executed();

        if let Err(e) = commands::execute(self, conn, user, &command).await {
            match e {
                commands::CommandError::Unknown(name) => {
                    self.send_error(
                        conn,
                        format!(
                            "unknown command: /{}. Use /help to see available commands",
                            name
                        ),
                    );
                }
                other => self.send_error(conn, format!("Command error: {}", other)),
            }
        }
    }

    pub(crate) async fn handle_join_room(
        &self,
        conn: &Arc<Connection>,
        user: &SessionUser,
        room: String,
    ) {
        match self.switch_room(conn, &user.username, &room) {
            Ok(room) => {
                self.send_to(conn, ServerMessage::room_joined(&room));
                self.send_to(conn, ServerMessage::rooms_list(self.rooms.summaries()));
                self.send_to(
                    conn,
                    ServerMessage::users_list(&room, self.rooms.members(&room)),
                );
                self.broadcast.broadcast(
                    ServerMessage::event(
                        "user_joined",
                        format!("{} joined the room", user.username),
                        Some(room.clone()),
                    )
                    .to_json(),
                    Some(conn.id().clone()),
                    Some(room),
                );
            }
            Err(e) => self.send_error(conn, format!("Failed to join room: {}", e)),
        }
    }

    pub(crate) async fn handle_leave_room(&self, conn: &Arc<Connection>, user: &SessionUser) {
        let Some(room) = conn.current_room() else {
            self.send_error(conn, "You are not in any room");
            return;
        };

        self.rooms.leave(conn.id(), &room);
        conn.set_current_room(None);

        self.send_to(conn, ServerMessage::room_left(&room));
        self.broadcast.broadcast(
            ServerMessage::event(
                "user_left",
                format!("{} left the room", user.username),
                Some(room.clone()),
            )
            .to_json(),
            Some(conn.id().clone()),
            Some(room),
        );
    }

    pub(crate) async fn handle_create_room(
        &self,
        conn: &Arc<Connection>,
        user: &SessionUser,
        room: String,
    ) {
        let room = match self.validator.validate_room_name(&room) {
            Ok(room) => room,
            Err(e) => {
                self.send_error(conn, e.to_string());
                return;
            }
        };

        match self.rooms.create(&room, &user.username) {
            Ok(()) => {
                self.send_to(conn, ServerMessage::room_created(&room));
                self.send_to(conn, ServerMessage::rooms_list(self.rooms.summaries()));
            }
            Err(e) => self.send_error(conn, format!("Failed to create room: {}", e)),
        }
    }

    pub(crate) async fn handle_get_history(
        &self,
        conn: &Arc<Connection>,
        room: Option<String>,
        limit: Option<usize>,
    ) {
        let Some(room) = room.or_else(|| conn.current_room()) else {
            self.send_error(conn, "You must be in a room to view history");
            return;
        };
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        self.send_to(
            conn,
            ServerMessage::history(self.store.room_history(&room, limit)),
        );
    }

    pub(crate) async fn handle_get_my_history(
        &self,
        conn: &Arc<Connection>,
        user: &SessionUser,
        limit: Option<usize>,
    ) {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.send_to(
            conn,
            ServerMessage::history(self.store.user_history(&user.username, limit)),
        );
    }

    pub(crate) async fn handle_search(
        &self,
        conn: &Arc<Connection>,
        query: String,
        room: Option<String>,
    ) {
        if query.trim().is_empty() {
            self.send_error(conn, "Search query is required");
            return;
        }
        let Some(room) = room.or_else(|| conn.current_room()) else {
            self.send_error(conn, "You must be in a room to search messages");
            return;
        };

        self.send_to(
            conn,
            ServerMessage::search_results(self.store.search(&query, &room, SEARCH_LIMIT)),
        );
    }
}

#[async_trait]
impl ConnectionEvents for ChatService {
    async fn on_message(&self, conn: &Arc<Connection>, text: String) {
        let inbound = Inbound::parse(&text);

        let Some(user) = conn.user() else {
            self.authenticate(conn, inbound).await;
            return;
        };

        // Everything an authenticated user sends is rate limited.
        if !self.rate_limiter.check(&user.user_id) {
            let status = self.rate_limiter.status(&user.user_id);
            self.send_error(
                conn,
                format!(
                    "Rate limit exceeded! You can send {} more messages in {}s",
                    status.remaining,
                    status.resets_in.as_secs()
                ),
            );
            return;
        }

        match inbound {
            Inbound::Structured(ClientMessage::Message { content }) => {
                self.handle_chat_message(conn, &user, content).await;
            }
            Inbound::Structured(ClientMessage::Command { command }) => {
                self.handle_command(conn, &user, command).await;
            }
            Inbound::Structured(ClientMessage::JoinRoom { room }) => {
                self.handle_join_room(conn, &user, room).await;
            }
            Inbound::Structured(ClientMessage::LeaveRoom) => {
                self.handle_leave_room(conn, &user).await;
            }
            Inbound::Structured(ClientMessage::CreateRoom { room }) => {
                self.handle_create_room(conn, &user, room).await;
            }
            Inbound::Structured(ClientMessage::GetHistory { room, limit }) => {
                self.handle_get_history(conn, room, limit).await;
            }
            Inbound::Structured(ClientMessage::GetMyHistory { limit }) => {
                self.handle_get_my_history(conn, &user, limit).await;
            }
            Inbound::Structured(ClientMessage::SearchMessages { query, room }) => {
                self.handle_search(conn, query, room).await;
            }
            Inbound::Structured(ClientMessage::Join { .. }) => {
                self.send_error(conn, "Already authenticated");
            }
            Inbound::Plain(text) if text.starts_with('/') => {
                self.handle_command(conn, &user, text).await;
            }
            Inbound::Plain(text) => {
                self.handle_chat_message(conn, &user, text).await;
            }
        }
    }

    async fn on_disconnect(&self, conn: &Arc<Connection>) {
        let Some(user) = conn.user() else {
            return;
        };

        if let Some(room) = conn.current_room() {
            self.rooms.leave(conn.id(), &room);
        }
        self.users.unregister(conn.id());
        self.metrics.user_unregistered();

        tracing::info!(conn_id = %conn.id(), username = %user.username, "user disconnected");

        self.broadcast.broadcast(
            ServerMessage::event("user_left", format!("{} left the chat", user.username), None)
                .to_json(),
            None,
            None,
        );
    }

    fn greeting(&self) -> String {
        ServerMessage::auth_request("Welcome! Please enter your username:").to_json()
    }

    fn reject_notice(&self) -> String {
        ServerMessage::error("Server is full, please try again later").to_json()
    }
}
