use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Realtime chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "chat-server", version, about = "Realtime WebSocket chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "CHAT_PORT", default_value = "9090")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "CHAT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./chat.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "CHAT_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Directory served at / (test client page)
    #[arg(long, env = "CHAT_STATIC_DIR", default_value = "./static")]
    pub static_dir: String,

    /// Maximum simultaneous connections
    #[arg(long, env = "CHAT_MAX_CONNECTIONS", default_value = "1000")]
    pub max_connections: usize,

    /// Maximum number of rooms
    #[arg(long, env = "CHAT_MAX_ROOMS", default_value = "100")]
    pub max_rooms: usize,

    /// Maximum users per room
    #[arg(long, env = "CHAT_MAX_USERS_PER_ROOM", default_value = "50")]
    pub max_users_per_room: usize,

    /// Seconds between heartbeat pings on each connection
    #[arg(long, env = "CHAT_HEARTBEAT_INTERVAL_SECS", default_value = "30")]
    pub heartbeat_interval_secs: u64,

    /// Idle read deadline in seconds, refreshed on every inbound frame
    #[arg(long, env = "CHAT_READ_TIMEOUT_SECS", default_value = "60")]
    pub read_timeout_secs: u64,

    /// Deadline in seconds for any single write
    #[arg(long, env = "CHAT_WRITE_TIMEOUT_SECS", default_value = "10")]
    pub write_timeout_secs: u64,

    /// Seconds a pong may lag the last ping before a connection is unhealthy
    #[arg(long, env = "CHAT_PONG_TIMEOUT_SECS", default_value = "60")]
    pub pong_timeout_secs: u64,

    /// Seconds between health sweeps
    #[arg(long, env = "CHAT_HEALTH_CHECK_INTERVAL_SECS", default_value = "30")]
    pub health_check_interval_secs: u64,

    /// Seconds between periodic metrics log lines
    #[arg(long, env = "CHAT_METRICS_INTERVAL_SECS", default_value = "30")]
    pub metrics_interval_secs: u64,

    /// Grace period in seconds between the shutdown notice and force-close
    #[arg(long, env = "CHAT_SHUTDOWN_GRACE_SECS", default_value = "5")]
    pub shutdown_grace_secs: u64,

    /// Broadcast request channel capacity
    #[arg(long, env = "CHAT_BROADCAST_BUFFER", default_value = "256")]
    pub broadcast_buffer: usize,

    /// Per-connection outbound queue capacity
    #[arg(long, env = "CHAT_SEND_BUFFER", default_value = "256")]
    pub send_buffer: usize,

    /// In-memory message history capacity
    #[arg(long, env = "CHAT_HISTORY_BUFFER", default_value = "1000")]
    pub history_buffer: usize,

    /// Maximum chat message length in characters
    #[arg(long, env = "CHAT_MAX_MESSAGE_LENGTH", default_value = "1000")]
    pub max_message_length: usize,

    /// Maximum username length in characters
    #[arg(long, env = "CHAT_MAX_USERNAME_LENGTH", default_value = "50")]
    pub max_username_length: usize,

    /// Maximum room name length in characters
    #[arg(long, env = "CHAT_MAX_ROOM_NAME_LENGTH", default_value = "50")]
    pub max_room_name_length: usize,

    /// Messages allowed per user per rate window
    #[arg(long, env = "CHAT_RATE_LIMIT_MESSAGES", default_value = "10")]
    pub rate_limit_messages: u32,

    /// Rate window length in seconds
    #[arg(long, env = "CHAT_RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// Per-user message rate limiting
    #[arg(long, env = "CHAT_ENABLE_RATE_LIMIT", default_value = "true", action = clap::ArgAction::Set)]
    pub enable_rate_limit: bool,

    /// Periodic ping/pong health sweep
    #[arg(long, env = "CHAT_ENABLE_HEALTH_CHECK", default_value = "true", action = clap::ArgAction::Set)]
    pub enable_health_check: bool,

    /// Periodic metrics reporting
    #[arg(long, env = "CHAT_ENABLE_METRICS", default_value = "true", action = clap::ArgAction::Set)]
    pub enable_metrics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9090,
            bind_address: "0.0.0.0".to_string(),
            config: "./chat.toml".to_string(),
            json_logs: false,
            generate_config: false,
            static_dir: "./static".to_string(),
            max_connections: 1000,
            max_rooms: 100,
            max_users_per_room: 50,
            heartbeat_interval_secs: 30,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            pong_timeout_secs: 60,
            health_check_interval_secs: 30,
            metrics_interval_secs: 30,
            shutdown_grace_secs: 5,
            broadcast_buffer: 256,
            send_buffer: 256,
            history_buffer: 1000,
            max_message_length: 1000,
            max_username_length: 50,
            max_room_name_length: 50,
            rate_limit_messages: 10,
            rate_limit_window_secs: 60,
            enable_rate_limit: true,
            enable_health_check: true,
            enable_metrics: true,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHAT_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Realtime Chat Server Configuration
# Place this file at ./chat.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHAT_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 9090)
# port = 9090

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Directory served at / for the test client page
# static_dir = "./static"

# ---- Capacity ----

# Maximum simultaneous WebSocket connections (default: 1000)
# max_connections = 1000

# Maximum number of rooms (default: 100)
# max_rooms = 100

# Maximum users per room (default: 50)
# max_users_per_room = 50

# ---- Liveness ----

# Seconds between heartbeat pings (default: 30)
# heartbeat_interval_secs = 30

# Idle read deadline in seconds (default: 60)
# read_timeout_secs = 60

# Per-write deadline in seconds (default: 10)
# write_timeout_secs = 10

# Seconds a pong may lag before a connection is unhealthy (default: 60)
# pong_timeout_secs = 60

# Seconds between health sweeps (default: 30)
# health_check_interval_secs = 30

# enable_health_check = true

# ---- Queues ----

# Broadcast request channel capacity (default: 256)
# broadcast_buffer = 256

# Per-connection outbound queue capacity (default: 256)
# send_buffer = 256

# In-memory message history capacity (default: 1000)
# history_buffer = 1000

# ---- Input limits ----

# max_message_length = 1000
# max_username_length = 50
# max_room_name_length = 50

# ---- Rate limiting ----

# Messages allowed per user per window (default: 10 per 60s)
# rate_limit_messages = 10
# rate_limit_window_secs = 60
# enable_rate_limit = true

# ---- Metrics ----

# metrics_interval_secs = 30
# enable_metrics = true
"#
    .to_string()
}
