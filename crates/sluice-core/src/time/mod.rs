//! Time handling: processing-time clocks and event-time watermarks.
//!
//! All timestamps in Sluice are epoch milliseconds carried as `i64`, on both
//! the event-time axis (row timestamps, window bounds, watermarks) and the
//! processing-time axis (clock readings, fire boundaries).

mod clock;

pub use clock::{Clock, SystemClock, VirtualClock};

use std::sync::atomic::{AtomicI64, Ordering};

/// A watermark: an assertion that event time has progressed to at least
/// this timestamp for one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(i64);

impl Watermark {
    /// Creates a watermark at the given epoch-ms timestamp.
    #[must_use]
    pub fn new(timestamp: i64) -> Self {
        Self(timestamp)
    }

    /// Returns the watermark timestamp.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.0
    }

    /// Returns true if an event at `event_time` is behind this watermark.
    #[must_use]
    pub fn is_late(&self, event_time: i64) -> bool {
        event_time < self.0
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self(i64::MIN)
    }
}

impl From<i64> for Watermark {
    fn from(timestamp: i64) -> Self {
        Self(timestamp)
    }
}

impl From<Watermark> for i64 {
    fn from(watermark: Watermark) -> Self {
        watermark.0
    }
}

/// Tracks the maximum event time observed by one view.
///
/// The tracked value is monotonically non-decreasing: `observe` uses
/// `fetch_max`, so concurrent ingestion threads can feed the tracker
/// without additional locking and out-of-order rows never move it
/// backwards.
#[derive(Debug)]
pub struct WatermarkTracker {
    max_event_time: AtomicI64,
}

impl WatermarkTracker {
    /// Creates a tracker that has seen no events yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_event_time: AtomicI64::new(i64::MIN),
        }
    }

    /// Records an observed event timestamp and returns the watermark after
    /// the update.
    pub fn observe(&self, event_time: i64) -> Watermark {
        let prev = self.max_event_time.fetch_max(event_time, Ordering::AcqRel);
        Watermark::new(prev.max(event_time))
    }

    /// Returns the current watermark, or `None` if no events have been seen.
    #[must_use]
    pub fn current(&self) -> Option<Watermark> {
        let ts = self.max_event_time.load(Ordering::Acquire);
        (ts != i64::MIN).then(|| Watermark::new(ts))
    }
}

impl Default for WatermarkTracker {
    fn default() -> Self {
        Self::new()
    }
}
