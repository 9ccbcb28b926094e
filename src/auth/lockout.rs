//! Sliding-window lockout tracking for failed authentication attempts.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Tracks failed attempts per credential identifier. Once `max_attempts`
/// failures land inside the window, the identifier is locked until the
/// oldest failure slides out.
pub struct LockoutTracker {
    window: Duration,
    max_attempts: u32,
    attempts: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl LockoutTracker {
    pub fn new(window: Duration, max_attempts: u32) -> Self {
        Self {
            window,
            max_attempts,
            attempts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn is_locked(&self, identifier: &str) -> bool {
        let cutoff = Utc::now() - self.window;
        let attempts = self.attempts.read().await;
        match attempts.get(identifier) {
            Some(failures) => {
                failures.iter().filter(|&&at| at > cutoff).count() >= self.max_attempts as usize
            }
            None => false,
        }
    }

    pub async fn record_failure(&self, identifier: &str) {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut attempts = self.attempts.write().await;
        let failures = attempts.entry(identifier.to_string()).or_default();
        failures.retain(|&at| at > cutoff);
        failures.push(now);
    }

    /// Successful authentication resets the window.
    pub async fn clear(&self, identifier: &str) {
        self.attempts.write().await.remove(identifier);
    }

    /// Drop identifiers whose failures have all slid out of the window,
    /// so probes against unknown usernames cannot grow the map forever.
    pub async fn prune(&self) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, failures| {
            failures.retain(|&at| at > cutoff);
            !failures.is_empty()
        });
    }
}
