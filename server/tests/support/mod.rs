//! Shared test helpers: an in-memory transport pair and a fully wired
//! server core with no HTTP layer in front of it.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use chat_server::broadcast::BroadcastEngine;
use chat_server::chat::history::MessageStore;
use chat_server::chat::rooms::RoomDirectory;
use chat_server::chat::service::ChatService;
use chat_server::chat::users::UserDirectory;
use chat_server::config::Config;
use chat_server::conn::connection::ConnectionId;
use chat_server::conn::health;
use chat_server::conn::registry::ConnectionRegistry;
use chat_server::metrics::ServerMetrics;
use chat_server::rate_limit::RateLimiter;
use chat_server::security::InputValidator;
use chat_server::ws::transport::{Frame, Transport, TransportError, TransportReader, TransportWriter};

/// In-memory transport: unbounded client→server pipe, bounded server→client
/// pipe. A small unread server→client pipe makes the connection's write
/// loop stall mid-send, which is how tests back up the outbound queue.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::Sender<Frame>,
    remote: String,
}

pub struct MockClient {
    pub to_server: mpsc::UnboundedSender<Frame>,
    pub from_server: mpsc::Receiver<Frame>,
}

pub fn transport_pair(write_capacity: usize) -> (MockTransport, MockClient) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::channel(write_capacity);
    (
        MockTransport {
            incoming: in_rx,
            outgoing: out_tx,
            remote: "127.0.0.1:0".to_string(),
        },
        MockClient {
            to_server: in_tx,
            from_server: out_rx,
        },
    )
}

impl Transport for MockTransport {
    fn remote_address(&self) -> String {
        self.remote.clone()
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        (
            Box::new(MockReader(self.incoming)),
            Box::new(MockWriter(self.outgoing)),
        )
    }
}

struct MockReader(mpsc::UnboundedReceiver<Frame>);

#[async_trait]
impl TransportReader for MockReader {
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.0.recv().await)
    }
}

struct MockWriter(mpsc::Sender<Frame>);

#[async_trait]
impl TransportWriter for MockWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.0.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl MockClient {
    pub fn send_text(&self, text: &str) {
        let _ = self.to_server.send(Frame::Text(text.to_string()));
    }

    pub async fn recv_frame(&mut self) -> Option<Frame> {
        timeout(Duration::from_secs(1), self.from_server.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next text frame parsed as JSON, skipping pings.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        loop {
            match self.recv_frame().await? {
                Frame::Text(text) => return serde_json::from_str(&text).ok(),
                Frame::Close => return None,
                _ => continue,
            }
        }
    }

    /// Next JSON frame of the given type, skipping everything else.
    pub async fn recv_type(&mut self, kind: &str) -> Option<serde_json::Value> {
        for _ in 0..50 {
            let value = self.recv_json().await?;
            if value["type"] == kind {
                return Some(value);
            }
        }
        None
    }

    /// Discard buffered frames until the pipe has been quiet for a moment.
    pub async fn drain(&mut self) {
        while timeout(Duration::from_millis(100), self.from_server.recv())
            .await
            .ok()
            .flatten()
            .is_some()
        {}
    }
}

/// Answers server pings so the connection stays healthy; everything else is
/// discarded.
pub fn auto_pong(mut client: MockClient) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = client.from_server.recv().await {
            if let Frame::Ping(data) = frame {
                let _ = client.to_server.send(Frame::Pong(data));
            }
        }
    })
}

pub struct TestCore {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcast: BroadcastEngine,
    pub metrics: Arc<ServerMetrics>,
    pub rooms: Arc<RoomDirectory>,
    pub users: Arc<UserDirectory>,
    pub store: Arc<MessageStore>,
}

/// Defaults with long liveness timers so tests opt in to heartbeat traffic.
pub fn test_config() -> Config {
    Config {
        heartbeat_interval_secs: 3600,
        health_check_interval_secs: 3600,
        read_timeout_secs: 3600,
        enable_health_check: false,
        ..Config::default()
    }
}

/// Wire the core exactly the way main.rs does, minus the HTTP layer.
pub fn spawn_core(config: Config) -> TestCore {
    let config = Arc::new(config);
    let metrics = Arc::new(ServerMetrics::new());
    let rooms = Arc::new(RoomDirectory::new(
        config.max_rooms,
        config.max_users_per_room,
        metrics.clone(),
    ));
    let users = Arc::new(UserDirectory::new());
    let store = Arc::new(MessageStore::new(config.history_buffer));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_messages,
        config.rate_limit_window(),
        config.enable_rate_limit,
    ));
    let validator = InputValidator::new(&config);

    let (broadcast, broadcast_rx) = BroadcastEngine::new(config.broadcast_buffer);
    let chat = Arc::new(ChatService::new(
        broadcast.clone(),
        rooms.clone(),
        users.clone(),
        store.clone(),
        rate_limiter,
        validator,
        metrics.clone(),
        config.clone(),
    ));

    let registry = ConnectionRegistry::spawn(config.clone(), chat, metrics.clone());
    BroadcastEngine::spawn(broadcast_rx, registry.clone(), metrics.clone());

    if config.enable_health_check {
        health::spawn_health_monitor(
            registry.clone(),
            config.health_check_interval(),
            config.pong_timeout(),
        );
    }

    TestCore {
        config,
        registry,
        broadcast,
        metrics,
        rooms,
        users,
        store,
    }
}

pub async fn connect(core: &TestCore) -> (ConnectionId, MockClient) {
    connect_with_capacity(core, 64).await
}

pub async fn connect_with_capacity(
    core: &TestCore,
    write_capacity: usize,
) -> (ConnectionId, MockClient) {
    let (transport, client) = transport_pair(write_capacity);
    let id = core
        .registry
        .register(Box::new(transport))
        .await
        .expect("register transport");
    (id, client)
}

/// Complete the first-frame username handshake and consume the reply burst.
pub async fn authenticate(client: &mut MockClient, username: &str) {
    client
        .recv_type("auth_request")
        .await
        .expect("auth request greeting");
    client.send_text(username);
    client
        .recv_type("users_list")
        .await
        .expect("authentication reply sequence");
}

pub async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
