//! Sliding-window request throttling.
//!
//! One bucket per key holds `(window_start, count)`. A request is allowed
//! while the window's count stays at or under the configured maximum; once
//! the window ages out the bucket resets. A periodic sweep drops buckets
//! whose window has lapsed so abandoned keys do not accumulate.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use stormgrid_core::Clock;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per key per window.
    pub max_per_window: u32,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// How often idle buckets are swept away.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: 60,
            window: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: OffsetDateTime,
    count: u32,
}

/// Sliding-window rate limiter keyed by arbitrary strings.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
            clock,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records a request under `key` and returns whether it is allowed.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = self.clock.now();
        let window = self.config.window;

        let mut entry = self.buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });
        if now - entry.window_start >= window {
            entry.window_start = now;
            entry.count = 0;
        }
        entry.count += 1;
        let allowed = entry.count <= self.config.max_per_window;
        if !allowed {
            tracing::debug!(key = %key, count = entry.count, "Rate limit exceeded");
        }
        allowed
    }

    /// Seconds until the key's current window resets; 0 when the key has no
    /// live window.
    #[must_use]
    pub fn retry_after(&self, key: &str) -> Duration {
        let now = self.clock.now();
        let Some(bucket) = self.buckets.get(key) else {
            return Duration::ZERO;
        };
        let elapsed = now - bucket.window_start;
        let window = time::Duration::try_from(self.config.window).unwrap_or(time::Duration::ZERO);
        let remaining = window - elapsed;
        if remaining.is_positive() {
            Duration::from_secs(remaining.whole_seconds().max(1) as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Removes buckets whose window has fully lapsed. Returns the number
    /// removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now - bucket.window_start < window);
        before - self.buckets.len()
    }

    /// Number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Spawns the periodic sweep task; it exits when `shutdown` flips.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let interval = limiter.config.cleanup_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "Swept idle rate-limit buckets");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}

/// Builds the throttle key for a client-credential request.
#[must_use]
pub fn client_key(client_id: &str, client_ip: &str) -> String {
    format!("client:{client_id}@{client_ip}")
}

/// Builds the throttle key for a password-grant request.
#[must_use]
pub fn user_key(username: &str, client_ip: &str) -> String {
    format!("user:{username}@{client_ip}")
}
