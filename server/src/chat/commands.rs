//! Slash commands.

use std::sync::Arc;
use thiserror::Error;

use crate::chat::message::ServerMessage;
use crate::chat::service::ChatService;
use crate::conn::connection::{Connection, SessionUser};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command: /{0}")]
    Unknown(String),
    #[error("{0}")]
    Usage(&'static str),
}

const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show available commands"),
    ("/users", "List users in current room"),
    ("/rooms", "List all available rooms"),
    ("/join <room_name>", "Join a room"),
    ("/leave", "Leave current room"),
    ("/create <room_name>", "Create a new room"),
    ("/history [limit]", "Get message history for current room"),
    ("/search <query>", "Search messages in current room"),
    ("/stats", "Show server statistics"),
    ("/health", "Show your connection health"),
];

pub async fn execute(
    svc: &ChatService,
    conn: &Arc<Connection>,
    user: &SessionUser,
    raw: &str,
) -> Result<(), CommandError> {
    let mut parts = raw.split_whitespace();
    let name = parts
        .next()
        .map(|p| p.trim_start_matches('/'))
        .unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match name {
        "help" => help(svc, conn),
        "users" => users(svc, conn)?,
        "rooms" => rooms(svc, conn),
        "join" => {
            let room = args
                .first()
                .ok_or(CommandError::Usage("room name required. Usage: /join <room_name>"))?;
            svc.handle_join_room(conn, user, room.to_string()).await;
        }
        "leave" => svc.handle_leave_room(conn, user).await,
        "create" => {
            let room = args.first().ok_or(CommandError::Usage(
                "room name required. Usage: /create <room_name>",
            ))?;
            svc.handle_create_room(conn, user, room.to_string()).await;
        }
        "history" => {
            let limit = args.first().and_then(|a| a.parse::<usize>().ok());
            svc.handle_get_history(conn, None, limit).await;
        }
        "search" => {
            if args.is_empty() {
                return Err(CommandError::Usage(
                    "search query required. Usage: /search <query>",
                ));
            }
            svc.handle_search(conn, args.join(" "), None).await;
        }
        "stats" => stats(svc, conn),
        "health" => health(svc, conn),
        other => return Err(CommandError::Unknown(other.to_string())),
    }

    Ok(())
}

fn help(svc: &ChatService, conn: &Arc<Connection>) {
    let mut text = String::from("Available commands:\n");
    for (usage, description) in COMMANDS {
        text.push_str(&format!("- {} - {}\n", usage, description));
    }
    svc.send_to(conn, ServerMessage::system(text));
}

fn users(svc: &ChatService, conn: &Arc<Connection>) -> Result<(), CommandError> {
    let Some(room) = conn.current_room() else {
        return Err(CommandError::Usage("you are not in any room"));
    };
    let members = svc.rooms.members(&room);
    svc.send_to(conn, ServerMessage::users_list(&room, members));
    Ok(())
}

fn rooms(svc: &ChatService, conn: &Arc<Connection>) {
    svc.send_to(conn, ServerMessage::rooms_list(svc.rooms.summaries()));
}

fn stats(svc: &ChatService, conn: &Arc<Connection>) {
    let snap = svc.metrics.snapshot();
    let text = format!(
        "Server statistics:\n\
         - Active users: {}\n\
         - Active rooms: {}\n\
         - Max connections: {}\n\
         - Max rooms: {}\n\
         - Messages sent: {}\n\
         - Commands executed: {}\n\
         - Uptime: {}s",
        svc.users.count(),
        svc.rooms.count(),
        svc.config.max_connections,
        svc.config.max_rooms,
        snap.total_messages,
        snap.total_commands,
        snap.uptime_secs,
    );
    svc.send_to(conn, ServerMessage::system(text));
}

fn health(svc: &ChatService, conn: &Arc<Connection>) {
    let snap = conn.health().snapshot();
    let text = format!(
        "Connection health:\n\
         - Healthy: {}\n\
         - Pings sent: {}\n\
         - Pongs received: {}\n\
         - Missed pongs: {}\n\
         - Connected for: {}s\n\
         - Last activity: {}s ago",
        snap.is_healthy,
        snap.pings_sent,
        snap.pongs_received,
        snap.missed_pongs,
        snap.uptime_secs,
        snap.last_activity_secs_ago,
    );
    svc.send_to(conn, ServerMessage::system(text));
}
