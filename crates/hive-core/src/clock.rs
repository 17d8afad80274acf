//! Injectable clock
//!
//! The limiter, cache, and session janitor all reason about elapsed
//! time. Taking the clock as a trait object keeps their invariants
//! testable without sleeping.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Time source for components that measure windows and expirations.
pub trait Clock: Send + Sync {
    /// Wall-clock now.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic now, in milliseconds since an arbitrary epoch.
    fn monotonic_ms(&self) -> u64;
}

/// Production clock backed by the system.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    origin: Option<std::time::Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Some(std::time::Instant::now()),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> u64 {
        match self.origin {
            Some(origin) => origin.elapsed().as_millis() as u64,
            None => 0,
        }
    }
}

/// Test clock advanced by hand.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    monotonic_ms: u64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: start,
                monotonic_ms: 0,
            })),
        }
    }

    /// Advance both the wall clock and the monotonic clock.
    pub fn advance(&self, delta: Duration) {
        let mut state = self.state.lock();
        state.now += chrono::Duration::from_std(delta).expect("duration in range");
        state.monotonic_ms += delta.as_millis() as u64;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    fn monotonic_ms(&self) -> u64 {
        self.state.lock().monotonic_ms
    }
}

/// Shared clock handle.
pub type ClockRef = Arc<dyn Clock>;

/// System clock as a shared handle.
pub fn system_clock() -> ClockRef {
    Arc::new(SystemClock::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let t0 = clock.now();
        let m0 = clock.monotonic_ms();
        clock.advance(Duration::from_secs(5));
        assert_eq!((clock.now() - t0).num_seconds(), 5);
        assert_eq!(clock.monotonic_ms() - m0, 5000);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
    }
}
