//! Injectable processing-time clocks.
//!
//! Window firing is driven by processing time (or by watermarks derived
//! from it), so the clock is a seam: production code uses [`SystemClock`],
//! tests use [`VirtualClock`] and advance it explicitly instead of
//! sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of processing time in epoch milliseconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current processing time.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)] // epoch millis fit i64 until year ~292M
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A manually-advanced clock for deterministic tests.
///
/// Time only moves when `advance` or `set_ms` is called, so tests can step
/// past window boundaries without real sleeping.
#[derive(Debug)]
pub struct VirtualClock {
    now_ms: AtomicI64,
}

impl VirtualClock {
    /// Creates a virtual clock starting at the given epoch-ms timestamp.
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// Creates a virtual clock seeded from the current wall clock.
    #[must_use]
    pub fn from_system_time() -> Self {
        Self::new(SystemClock.now_ms())
    }

    /// Moves the clock forward by `delta`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, delta: Duration) {
        self.now_ms
            .fetch_add(delta.as_millis() as i64, Ordering::AcqRel);
    }

    /// Sets the clock to an absolute timestamp.
    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::Release);
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_sane() {
        // Anything after 2020-01-01 counts as sane here.
        assert!(SystemClock::new().now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_virtual_clock_starts_where_told() {
        let clock = VirtualClock::new(5000);
        assert_eq!(clock.now_ms(), 5000);
    }

    #[test]
    fn test_virtual_clock_advance() {
        let clock = VirtualClock::new(1000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3000);
    }

    #[test]
    fn test_virtual_clock_set() {
        let clock = VirtualClock::new(1000);
        clock.set_ms(42);
        assert_eq!(clock.now_ms(), 42);
    }
}
