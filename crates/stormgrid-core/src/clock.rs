//! Injectable time source.
//!
//! Every component that makes a time-based decision (registry TTLs, token
//! expiry, rate-limit windows, autoscaler cooldowns) takes an
//! `Arc<dyn Clock>` at construction instead of calling
//! `OffsetDateTime::now_utc()` directly. Production wires [`SystemClock`]
//! once at startup; tests inject [`ManualClock`] and advance it explicitly.

use std::sync::Arc;
use std::sync::Mutex;

use time::{Duration, OffsetDateTime};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> OffsetDateTime;

    /// Returns the current instant as a Unix timestamp in seconds.
    fn unix_timestamp(&self) -> i64 {
        self.now().unix_timestamp()
    }
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a shared system clock.
    #[must_use]
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually advanced clock for tests.
///
/// Starts at a fixed instant and only moves when [`ManualClock::advance`]
/// or [`ManualClock::set`] is called, which makes TTL and cooldown behavior
/// deterministic under test.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Creates a manual clock at the given instant.
    #[must_use]
    pub fn starting_at(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Creates a manual clock at the Unix epoch.
    #[must_use]
    pub fn epoch() -> Self {
        Self::starting_at(OffsetDateTime::UNIX_EPOCH)
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += delta;
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, instant: OffsetDateTime) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().expect("clock mutex poisoned")
    }
}
