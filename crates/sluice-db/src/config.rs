//! Configuration for a `SluiceDb` instance.

use std::time::Duration;

use crate::view::FirePolicy;

/// Configuration for a [`crate::SluiceDb`] instance.
#[derive(Debug, Clone)]
pub struct SluiceConfig {
    /// Lower bound on a view's fire-scheduler poll interval. Guards
    /// against busy-looping when a view is created with a very small hop.
    pub min_poll_interval: Duration,
    /// Upper bound on the poll interval, so flush latency stays bounded
    /// for views with large hops. Each view polls at
    /// `clamp(hop, min_poll_interval, max_poll_interval)`.
    pub max_poll_interval: Duration,
    /// How long DROP waits for a view's in-flight fire tick to finish
    /// before giving up on the task handle.
    pub drop_timeout: Duration,
    /// Fire policy applied to views that do not specify one.
    pub default_fire_policy: FirePolicy,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            min_poll_interval: Duration::from_millis(10),
            max_poll_interval: Duration::from_secs(1),
            drop_timeout: Duration::from_secs(5),
            default_fire_policy: FirePolicy::ProcessingTime,
        }
    }
}

impl SluiceConfig {
    /// Poll interval for a view with the given hop.
    #[must_use]
    pub(crate) fn poll_interval_for_hop(&self, hop: Duration) -> Duration {
        hop.clamp(self.min_poll_interval, self.max_poll_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_clamping() {
        let config = SluiceConfig::default();
        assert_eq!(
            config.poll_interval_for_hop(Duration::from_millis(1)),
            config.min_poll_interval
        );
        assert_eq!(
            config.poll_interval_for_hop(Duration::from_millis(500)),
            Duration::from_millis(500)
        );
        assert_eq!(
            config.poll_interval_for_hop(Duration::from_secs(3600)),
            config.max_poll_interval
        );
    }
}
