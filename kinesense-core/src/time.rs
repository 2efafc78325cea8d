//! Time management for the streaming pipeline
//!
//! Provides a clock abstraction so the same code runs against the host's
//! wall clock in production and a hand-advanced clock in tests (calibration
//! expiry and correlation windows both depend on elapsed time).

use std::sync::atomic::{AtomicU64, Ordering};

/// Timestamp in milliseconds since epoch (or session start for monotonic sources)
pub type Timestamp = u64;

/// Source of time for the pipeline
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;
}

/// Wall clock backed by the host system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Hand-advanced clock for deterministic tests
///
/// Interior mutability lets a test advance time while the store or
/// correlator under test holds a shared reference to the clock.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ms: AtomicU64,
}

impl FixedClock {
    /// Create a clock frozen at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            now_ms: AtomicU64::new(timestamp),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, timestamp: Timestamp) {
        self.now_ms.store(timestamp, Ordering::Relaxed);
    }

    /// Move time forward by `ms` milliseconds
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> Timestamp {
        self.now_ms.load(Ordering::Relaxed)
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(1000);
        assert_eq!(clock.now(), 1000);

        clock.advance(500);
        assert_eq!(clock.now(), 1500);

        clock.set(10_000);
        assert_eq!(clock.now(), 10_000);
        assert!(!clock.is_wall_clock());
    }

    #[test]
    fn system_clock_is_wall_clock() {
        let clock = SystemClock;
        assert!(clock.is_wall_clock());
        assert!(clock.now() > 0);
    }
}
