//! In-memory fixed-window rate limiter
//!
//! Keyed by an arbitrary string (the API uses the client IP). Each key gets a
//! rolling fixed window: the first request opens the window, subsequent
//! requests within it increment a counter, and the window resets once its
//! duration has elapsed. State lives in process memory; a multi-instance
//! deployment rate-limits per instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Entries older than this are pruned opportunistically on insert.
const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Thread-safe fixed-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    /// Create an in-memory limiter with no background sweeper.
    pub fn new_in_memory() -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a hit for `key` and report whether it is within `limit` hits
    /// per `window`. Returns `false` once the limit is exceeded; the counter
    /// still advances so repeated over-limit calls stay rejected until the
    /// window rolls over.
    pub async fn check(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.check_at(key, limit, window, Instant::now()).await
    }

    /// Clock-injectable variant of [`check`](Self::check).
    pub async fn check_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;

        // Opportunistic cleanup so abandoned keys do not accumulate.
        if windows.len() > 1024 {
            windows.retain(|_, w| now.duration_since(w.started) < STALE_AFTER);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }

        entry.count += 1;
        entry.count <= limit
    }

    /// Drop all state for a key. Used by tests and by admin tooling.
    pub async fn reset(&self, key: &str) {
        self.windows.lock().await.remove(key);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new_in_memory()
    }
}
