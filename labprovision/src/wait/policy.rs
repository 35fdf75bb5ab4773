//! Wait window configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the interval between artifact polls.
pub const MAX_POLL_INTERVAL_MINUTES: i64 = 5;

/// How long to wait for artifacts after a successful deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Wall-clock wait window in minutes; zero or less disables waiting.
    #[serde(default)]
    pub max_wait_minutes: i64,
}

impl WaitPolicy {
    /// Creates a policy waiting up to `max_wait_minutes`.
    #[must_use]
    pub fn minutes(max_wait_minutes: i64) -> Self {
        Self { max_wait_minutes }
    }

    /// A policy that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns true if the waiter should poll at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.max_wait_minutes > 0
    }

    /// The wait window.
    #[must_use]
    pub fn window(&self) -> Duration {
        minutes_to_duration(self.max_wait_minutes)
    }

    /// Interval between polls: `min(max_wait_minutes, 5)` minutes.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        minutes_to_duration(self.max_wait_minutes.min(MAX_POLL_INTERVAL_MINUTES))
    }
}

fn minutes_to_duration(minutes: i64) -> Duration {
    Duration::from_secs(u64::try_from(minutes).unwrap_or(0).saturating_mul(60))
}
