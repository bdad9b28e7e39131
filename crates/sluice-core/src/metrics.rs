//! Per-view counters for late data and window flushing.

/// Counters for rows that arrived after their windows had fired.
///
/// Late rows are dropped, never surfaced to the inserting caller; these
/// counters are how the drop becomes observable.
#[derive(Debug, Clone, Default)]
pub struct LateDataMetrics {
    rows_dropped: u64,
    last_event_time: Option<i64>,
}

impl LateDataMetrics {
    /// Creates a zeroed tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one dropped late row.
    pub fn record_dropped(&mut self, event_time: i64) {
        self.rows_dropped += 1;
        self.last_event_time = Some(event_time);
    }

    /// Total late rows dropped.
    #[must_use]
    pub fn rows_dropped(&self) -> u64 {
        self.rows_dropped
    }

    /// Event time of the most recent late row, if any.
    #[must_use]
    pub fn last_event_time(&self) -> Option<i64> {
        self.last_event_time
    }
}

/// Counters for window flushing.
///
/// Close latency measures the delay between a window's end and the tick
/// that actually emitted it; it reflects the poll interval plus any retry
/// backoff, and is the number to watch when tuning flush latency.
#[derive(Debug, Clone, Default)]
pub struct FlushMetrics {
    windows_flushed: u64,
    rows_emitted: u64,
    flush_failures: u64,
    consecutive_failures: u64,
    max_close_latency_ms: i64,
}

impl FlushMetrics {
    /// Creates a zeroed tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful window flush.
    ///
    /// `window_end` and `flushed_at` are epoch-ms; their difference is the
    /// close latency.
    pub fn record_flush(&mut self, rows: u64, window_end: i64, flushed_at: i64) {
        self.windows_flushed += 1;
        self.rows_emitted += rows;
        self.consecutive_failures = 0;
        let latency = flushed_at.saturating_sub(window_end).max(0);
        if latency > self.max_close_latency_ms {
            self.max_close_latency_ms = latency;
        }
    }

    /// Records a failed destination append.
    pub fn record_failure(&mut self) {
        self.flush_failures += 1;
        self.consecutive_failures += 1;
    }

    /// Windows flushed successfully.
    #[must_use]
    pub fn windows_flushed(&self) -> u64 {
        self.windows_flushed
    }

    /// Result rows appended to the destination.
    #[must_use]
    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    /// Total failed append attempts.
    #[must_use]
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures
    }

    /// Failed attempts since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    /// Worst observed close latency in milliseconds.
    #[must_use]
    pub fn max_close_latency_ms(&self) -> i64 {
        self.max_close_latency_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_data_counters() {
        let mut metrics = LateDataMetrics::new();
        assert_eq!(metrics.rows_dropped(), 0);
        metrics.record_dropped(500);
        metrics.record_dropped(800);
        assert_eq!(metrics.rows_dropped(), 2);
        assert_eq!(metrics.last_event_time(), Some(800));
    }

    #[test]
    fn test_flush_latency_tracking() {
        let mut metrics = FlushMetrics::new();
        metrics.record_flush(3, 1000, 1250);
        metrics.record_flush(1, 2000, 2100);
        assert_eq!(metrics.windows_flushed(), 2);
        assert_eq!(metrics.rows_emitted(), 4);
        assert_eq!(metrics.max_close_latency_ms(), 250);
    }

    #[test]
    fn test_failure_streak_resets_on_success() {
        let mut metrics = FlushMetrics::new();
        metrics.record_failure();
        metrics.record_failure();
        assert_eq!(metrics.consecutive_failures(), 2);
        metrics.record_flush(1, 1000, 1001);
        assert_eq!(metrics.consecutive_failures(), 0);
        assert_eq!(metrics.flush_failures(), 2);
    }
}
