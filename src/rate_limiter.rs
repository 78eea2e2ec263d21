use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Sliding-window limiter keyed by caller, e.g. a client address
#[derive(Clone)]
pub struct RateLimiter {
    limit: RateLimit,
    state: Arc<Mutex<HashMap<String, RateLimitState>>>,
}

#[derive(Debug, Clone, Copy)]
struct RateLimit {
    requests: usize,
    window: Duration,
}

struct RateLimitState {
    requests: Vec<Instant>,
}

impl RateLimiter {
    /// Allows `requests` per `window` for every key
    pub fn new(requests: usize, window: Duration) -> Self {
        Self {
            limit: RateLimit { requests, window },
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `requests` per minute for every key
    pub fn per_minute(requests: usize) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Records a request for `key` if the window has room.
    ///
    /// Returns `false` without recording anything when the key is over its
    /// limit. Keys whose window has emptied are dropped on the way.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let window = self.limit.window;
        state.retain(|_, entry| {
            entry.requests.retain(|&t| now.duration_since(t) < window);
            !entry.requests.is_empty()
        });

        let entry = state.entry(key.to_string()).or_insert_with(|| RateLimitState {
            requests: Vec::new(),
        });
        if entry.requests.len() < self.limit.requests {
            entry.requests.push(now);
            true
        } else {
            debug!(key, "rate limit reached");
            if entry.requests.is_empty() {
                state.remove(key);
            }
            false
        }
    }

    /// Number of keys with requests inside the current window
    pub async fn tracked_keys(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Acquires a permit for `key`, waiting if necessary
    pub async fn acquire(&self, key: &str) {
        while !self.try_acquire(key).await {
            sleep(Duration::from_millis(100)).await;
        }
    }
}
