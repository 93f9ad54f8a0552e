//! Per-connection ping/pong liveness accounting and the periodic sweep.
//!
//! The write loop records pings, the pong handler records pongs, and the
//! sweep evaluates — recording and deciding never happen in the same place.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::conn::registry::ConnectionRegistry;

/// Ping/pong bookkeeping for one connection, behind its own lock because
/// the write loop, the pong handler, and the sweep all touch it.
#[derive(Debug)]
pub struct HealthRecord {
    inner: Mutex<HealthState>,
}

#[derive(Debug)]
struct HealthState {
    is_healthy: bool,
    // First ping ever sent; the yardstick for a peer that never pongs.
    first_ping: Option<Instant>,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    pings_sent: u64,
    pongs_received: u64,
    missed_pongs: u64,
    connection_start: Instant,
    last_activity: Instant,
}

/// Point-in-time copy of a connection's health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub is_healthy: bool,
    pub pings_sent: u64,
    pub pongs_received: u64,
    pub missed_pongs: u64,
    pub uptime_secs: u64,
    pub last_activity_secs_ago: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ping_secs_ago: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pong_secs_ago: Option<u64>,
}

impl HealthRecord {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Mutex::new(HealthState {
                is_healthy: true,
                first_ping: None,
                last_ping: None,
                last_pong: None,
                pings_sent: 0,
                pongs_received: 0,
                missed_pongs: 0,
                connection_start: now,
                last_activity: now,
            }),
        }
    }

    pub fn record_ping(&self) {
        let mut state = self.inner.lock().expect("health state lock");
        let now = Instant::now();
        if state.first_ping.is_none() {
            state.first_ping = Some(now);
        }
        state.last_ping = Some(now);
        state.pings_sent += 1;
    }

    /// A single pong fully clears prior misses.
    pub fn record_pong(&self) {
        let mut state = self.inner.lock().expect("health state lock");
        state.last_pong = Some(Instant::now());
        state.pongs_received += 1;
        state.is_healthy = true;
        state.missed_pongs = 0;
    }

    pub fn record_activity(&self) {
        let mut state = self.inner.lock().expect("health state lock");
        state.last_activity = Instant::now();
    }

    /// Evaluate liveness. A connection that has never been pinged is always
    /// healthy (startup grace period). A peer that has never ponged is
    /// measured from its first ping; once it has ponged, from its last pong.
    /// An overdue pong marks the record unhealthy and counts one miss.
    pub fn check_health(&self, pong_timeout: Duration) -> bool {
        let mut state = self.inner.lock().expect("health state lock");
        let now = Instant::now();

        let Some(first_ping) = state.first_ping else {
            return true;
        };

        match state.last_pong {
            None => {
                if now.duration_since(first_ping) > pong_timeout {
                    state.is_healthy = false;
                    state.missed_pongs += 1;
                    false
                } else {
                    true
                }
            }
            Some(last_pong) => {
                if now.duration_since(last_pong) > pong_timeout {
                    state.is_healthy = false;
                    state.missed_pongs += 1;
                    false
                } else {
                    state.is_healthy
                }
            }
        }
    }

    pub fn missed_pongs(&self) -> u64 {
        self.inner.lock().expect("health state lock").missed_pongs
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let state = self.inner.lock().expect("health state lock");
        let now = Instant::now();
        HealthSnapshot {
            is_healthy: state.is_healthy,
            pings_sent: state.pings_sent,
            pongs_received: state.pongs_received,
            missed_pongs: state.missed_pongs,
            uptime_secs: now.duration_since(state.connection_start).as_secs(),
            last_activity_secs_ago: now.duration_since(state.last_activity).as_secs(),
            last_ping_secs_ago: state
                .last_ping
                .map(|t| now.duration_since(t).as_secs()),
            last_pong_secs_ago: state
                .last_pong
                .map(|t| now.duration_since(t).as_secs()),
        }
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic sweep evicting connections whose pongs are overdue. Eviction
/// goes through the registry's standard unregister path, the same as any
/// transport failure.
pub fn spawn_health_monitor(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    pong_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it.
        ticker.tick().await;

        tracing::info!(
            interval_secs = interval.as_secs(),
            pong_timeout_secs = pong_timeout.as_secs(),
            "connection health monitor started"
        );

        loop {
            ticker.tick().await;

            let mut healthy = 0usize;
            let mut evicted = 0usize;
            for conn in registry.snapshot() {
                if conn.health().check_health(pong_timeout) {
                    healthy += 1;
                } else {
                    tracing::warn!(
                        conn_id = %conn.id(),
                        missed_pongs = conn.health().missed_pongs(),
                        "evicting unhealthy connection"
                    );
                    registry.unregister(conn.id()).await;
                    evicted += 1;
                }
            }

            if evicted > 0 {
                tracing::info!(healthy, evicted, "health sweep complete");
            }
        }
    })
}
