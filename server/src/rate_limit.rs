//! Per-user fixed-window message budgets.
//!
//! Fixed-window counting, lazily reset on the first check after the window
//! elapses. This tolerates a short burst at window boundaries in exchange
//! for O(1) memory per user and no background timers.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct RateLimiter {
    limits: DashMap<String, Mutex<UserWindow>>,
    max_messages: u32,
    window: Duration,
    enabled: bool,
}

#[derive(Debug)]
struct UserWindow {
    count: u32,
    window_start: Instant,
}

#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub limit: u32,
    pub resets_in: Duration,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration, enabled: bool) -> Self {
        Self {
            limits: DashMap::new(),
            max_messages,
            window,
            enabled,
        }
    }

    /// Books one message if the user has budget left in the current window.
    /// Per-user state has its own lock so different users don't serialize
    /// beyond the map lookup.
    pub fn check(&self, user_id: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let entry = self
            .limits
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Mutex::new(UserWindow {
                    count: 0,
                    window_start: Instant::now(),
                })
            });
        let mut window = entry.lock().expect("rate limit window lock");

        let now = Instant::now();
        if now.duration_since(window.window_start) > self.window {
            window.count = 0;
            window.window_start = now;
        }

        if window.count >= self.max_messages {
            return false;
        }
        window.count += 1;
        true
    }

    pub fn status(&self, user_id: &str) -> RateLimitStatus {
        let Some(entry) = self.limits.get(user_id) else {
            return RateLimitStatus {
                remaining: self.max_messages,
                limit: self.max_messages,
                resets_in: self.window,
            };
        };
        let window = entry.lock().expect("rate limit window lock");

        let elapsed = Instant::now().duration_since(window.window_start);
        if elapsed > self.window {
            RateLimitStatus {
                remaining: self.max_messages,
                limit: self.max_messages,
                resets_in: Duration::ZERO,
            }
        } else {
            RateLimitStatus {
                remaining: self.max_messages.saturating_sub(window.count),
                limit: self.max_messages,
                resets_in: self.window - elapsed,
            }
        }
    }
}
