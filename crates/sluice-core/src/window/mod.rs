//! Hopping window specification and assignment.
//!
//! A hop window of size `n * hop` recurs every `hop` milliseconds; each
//! event therefore belongs to up to `n` overlapping windows. With
//! `size == hop` the windows do not overlap and behave as classic tumbling
//! windows.
//!
//! ```text
//! size: 3s, hop: 1s
//!
//! Window 1: [00:00, 00:03)
//! Window 2: [00:01, 00:04)
//! Window 3: [00:02, 00:05)
//!
//! An event at 00:02.5 belongs to windows 1, 2, 3
//! ```
//!
//! Windows are half-open `[start, end)` and aligned to epoch (timestamp 0):
//! an event exactly on a boundary belongs to the window starting there.

pub mod table;

pub use table::{GroupKey, WindowState, WindowTable};

use smallvec::SmallVec;
use std::time::Duration;

use crate::{Error, Result};

/// Window parameters of one view: size, hop, and the event-time column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Window duration in milliseconds.
    pub size_ms: i64,
    /// Interval between consecutive window starts, in milliseconds.
    pub hop_ms: i64,
    /// Name of the source column carrying event time.
    pub time_column: String,
}

impl WindowSpec {
    /// Creates a hopping window spec.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // practical durations fit i64 millis
    pub fn hopping(size: Duration, hop: Duration, time_column: impl Into<String>) -> Self {
        Self {
            size_ms: size.as_millis() as i64,
            hop_ms: hop.as_millis() as i64,
            time_column: time_column.into(),
        }
    }

    /// Creates a tumbling window spec (`hop == size`).
    #[must_use]
    pub fn tumbling(size: Duration, time_column: impl Into<String>) -> Self {
        Self::hopping(size, size, time_column)
    }

    /// Validates the spec as required at CREATE time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWindowSpec`] when `hop <= 0`, `size <= 0`,
    /// or `size` is not an integer multiple of `hop`.
    pub fn validate(&self) -> Result<()> {
        if self.hop_ms <= 0 {
            return Err(Error::InvalidWindowSpec(format!(
                "hop must be positive, got {}ms",
                self.hop_ms
            )));
        }
        if self.size_ms <= 0 {
            return Err(Error::InvalidWindowSpec(format!(
                "size must be positive, got {}ms",
                self.size_ms
            )));
        }
        if self.size_ms % self.hop_ms != 0 {
            return Err(Error::InvalidWindowSpec(format!(
                "size ({}ms) must be a multiple of hop ({}ms)",
                self.size_ms, self.hop_ms
            )));
        }
        Ok(())
    }

    /// Returns true when the spec degenerates to tumbling windows.
    #[must_use]
    pub fn is_tumbling(&self) -> bool {
        self.size_ms == self.hop_ms
    }

    /// Number of windows each event belongs to (`size / hop`).
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // validate() guarantees positive
    pub fn windows_per_event(&self) -> usize {
        (self.size_ms / self.hop_ms) as usize
    }
}

/// One window's time range: `[start, end)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowBounds {
    /// Inclusive start timestamp.
    pub start: i64,
    /// Exclusive end timestamp.
    pub end: i64,
}

impl WindowBounds {
    /// Creates window bounds.
    #[must_use]
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Window duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    /// Returns true if `timestamp` falls inside the half-open range.
    #[must_use]
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// Collection type for window assignments.
///
/// `SmallVec` keeps the common cases off the heap: one window for tumbling
/// views, a handful for typical hop ratios.
pub type WindowVec = SmallVec<[WindowBounds; 4]>;

/// Pure assignment of event timestamps to hopping windows.
///
/// Deterministic and side-effect free: `assign` is a function of the
/// timestamp and the spec alone.
#[derive(Debug, Clone)]
pub struct HopWindowAssigner {
    size_ms: i64,
    hop_ms: i64,
}

impl HopWindowAssigner {
    /// Builds an assigner from a validated spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWindowSpec`] if the spec fails validation.
    pub fn for_spec(spec: &WindowSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            size_ms: spec.size_ms,
            hop_ms: spec.hop_ms,
        })
    }

    /// Returns the window size in milliseconds.
    #[must_use]
    pub fn size_ms(&self) -> i64 {
        self.size_ms
    }

    /// Returns the hop interval in milliseconds.
    #[must_use]
    pub fn hop_ms(&self) -> i64 {
        self.hop_ms
    }

    /// Start of the latest window containing `timestamp`.
    #[inline]
    fn last_window_start(&self, timestamp: i64) -> i64 {
        if timestamp >= 0 {
            (timestamp / self.hop_ms) * self.hop_ms
        } else {
            // Floor division for negative timestamps.
            ((timestamp - self.hop_ms + 1) / self.hop_ms) * self.hop_ms
        }
    }

    /// End of the latest window containing `timestamp`.
    ///
    /// A row is late exactly when this is at or before the fire boundary:
    /// every window it maps to has already fired.
    #[inline]
    #[must_use]
    pub fn latest_end(&self, timestamp: i64) -> i64 {
        self.last_window_start(timestamp) + self.size_ms
    }

    /// Returns every window containing `timestamp`, earliest start first.
    #[must_use]
    pub fn assign(&self, timestamp: i64) -> WindowVec {
        let mut windows = WindowVec::new();

        // Walk backwards from the latest containing window.
        let mut window_start = self.last_window_start(timestamp);
        while window_start + self.size_ms > timestamp {
            windows.push(WindowBounds::new(window_start, window_start + self.size_ms));
            window_start -= self.hop_ms;
        }

        windows.reverse();
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tumbling_1s() -> HopWindowAssigner {
        HopWindowAssigner::for_spec(&WindowSpec::tumbling(Duration::from_secs(1), "ts")).unwrap()
    }

    #[test]
    fn test_tumbling_assigns_exactly_one_window() {
        let assigner = tumbling_1s();
        for ts in [0, 1, 999, 1000, 1500, 123_456_789] {
            let windows = assigner.assign(ts);
            assert_eq!(windows.len(), 1, "timestamp {ts}");
            let expected_start = (ts / 1000) * 1000;
            assert_eq!(windows[0], WindowBounds::new(expected_start, expected_start + 1000));
            assert!(windows[0].contains(ts));
        }
    }

    #[test]
    fn test_boundary_belongs_to_window_starting_there() {
        let assigner = tumbling_1s();
        let windows = assigner.assign(2000);
        assert_eq!(windows[0], WindowBounds::new(2000, 3000));
    }

    #[test]
    fn test_hopping_overlap_count() {
        // size = 3 * hop: every timestamp past the first window maps to 3 windows.
        let spec = WindowSpec::hopping(Duration::from_secs(3), Duration::from_secs(1), "ts");
        let assigner = HopWindowAssigner::for_spec(&spec).unwrap();
        for ts in [3000, 3500, 10_250, 99_999] {
            assert_eq!(assigner.assign(ts).len(), 3, "timestamp {ts}");
        }
    }

    #[test]
    fn test_hopping_assignment_members() {
        let spec = WindowSpec::hopping(Duration::from_secs(3), Duration::from_secs(1), "ts");
        let assigner = HopWindowAssigner::for_spec(&spec).unwrap();
        let windows = assigner.assign(5500);
        assert_eq!(
            windows.as_slice(),
            &[
                WindowBounds::new(3000, 6000),
                WindowBounds::new(4000, 7000),
                WindowBounds::new(5000, 8000),
            ]
        );
        for w in &windows {
            assert!(w.contains(5500));
        }
    }

    #[test]
    fn test_epoch_start_has_fewer_windows() {
        let spec = WindowSpec::hopping(Duration::from_secs(3), Duration::from_secs(1), "ts");
        let assigner = HopWindowAssigner::for_spec(&spec).unwrap();
        // Within the first `size` of epoch only the windows starting at or
        // after 0 exist.
        assert_eq!(assigner.assign(500).len(), 1);
        assert_eq!(assigner.assign(1500).len(), 2);
    }

    #[test]
    fn test_negative_timestamps_floor() {
        let assigner = tumbling_1s();
        let windows = assigner.assign(-1);
        assert_eq!(windows[0], WindowBounds::new(-1000, 0));
        let windows = assigner.assign(-1000);
        assert_eq!(windows[0], WindowBounds::new(-1000, 0));
    }

    #[test]
    fn test_latest_end() {
        let spec = WindowSpec::hopping(Duration::from_secs(3), Duration::from_secs(1), "ts");
        let assigner = HopWindowAssigner::for_spec(&spec).unwrap();
        assert_eq!(assigner.size_ms(), 3000);
        assert_eq!(assigner.hop_ms(), 1000);
        // Latest containing window of t=5500 is [5000, 8000).
        assert_eq!(assigner.latest_end(5500), 8000);
        assert_eq!(assigner.assign(5500)[0].duration_ms(), 3000);
    }

    #[test]
    fn test_spec_validation() {
        assert!(WindowSpec::tumbling(Duration::from_secs(1), "ts").validate().is_ok());

        let zero_hop = WindowSpec {
            size_ms: 1000,
            hop_ms: 0,
            time_column: "ts".into(),
        };
        assert!(matches!(zero_hop.validate(), Err(Error::InvalidWindowSpec(_))));

        let zero_size = WindowSpec {
            size_ms: 0,
            hop_ms: 1000,
            time_column: "ts".into(),
        };
        assert!(matches!(zero_size.validate(), Err(Error::InvalidWindowSpec(_))));

        let not_multiple =
            WindowSpec::hopping(Duration::from_millis(2500), Duration::from_secs(1), "ts");
        assert!(matches!(not_multiple.validate(), Err(Error::InvalidWindowSpec(_))));
    }

    #[test]
    fn test_windows_per_event() {
        let spec = WindowSpec::hopping(Duration::from_secs(4), Duration::from_secs(1), "ts");
        assert_eq!(spec.windows_per_event(), 4);
        assert!(!spec.is_tumbling());
        assert!(WindowSpec::tumbling(Duration::from_secs(1), "ts").is_tumbling());
    }
}
