//! Timing configuration for a [`SyncCounter`](crate::SyncCounter).

use std::time::Duration;

use crate::backoff::{BackoffConfig, JitterRange};

/// Pause between two poll fan-outs.
pub const DEFAULT_POLL_INTERVAL: JitterRange =
    JitterRange::new(Duration::from_millis(250), Duration::from_millis(750));

/// Pause between two pull attempts of a blocking full sync.
pub const DEFAULT_FULL_SYNC_RETRY: JitterRange =
    JitterRange::new(Duration::from_millis(50), Duration::from_millis(150));

/// Timing of the three sync paths.
///
/// Built with [`SyncConfig::default`] and adjusted with the `with_*`
/// setters:
///
/// ```
/// use std::time::Duration;
/// use crdt_tally::SyncConfig;
///
/// let config = SyncConfig::default()
///     .with_poll_interval(Duration::from_millis(10), Duration::from_millis(20));
/// assert_eq!(config.poll_interval.min, Duration::from_millis(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Sleep between background poll rounds.
    pub poll_interval: JitterRange,
    /// Sleep between failed pulls while a full sync is waiting.
    pub full_sync_retry: JitterRange,
    /// Retry policy of the push-on-write path.
    pub push_backoff: BackoffConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            full_sync_retry: DEFAULT_FULL_SYNC_RETRY,
            push_backoff: BackoffConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Set the jittered pause between poll rounds.
    pub fn with_poll_interval(mut self, min: Duration, max: Duration) -> Self {
        self.poll_interval = JitterRange::new(min, max);
        self
    }

    /// Set the jittered pause between full-sync pull retries.
    pub fn with_full_sync_retry(mut self, min: Duration, max: Duration) -> Self {
        self.full_sync_retry = JitterRange::new(min, max);
        self
    }

    /// Set the push retry backoff.
    pub fn with_push_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.push_backoff = backoff;
        self
    }
}
