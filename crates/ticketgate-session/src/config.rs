//! Timing policy for login decisions.
//!
//! All four blind intervals are fields on [`LoginConfig`] rather than
//! process-wide globals, so a coordinator (or a test) can shorten them.
//! The defaults are the constants below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A ticket with less than this left is refreshed preemptively.
pub const TIME_TO_RELOGIN: Duration = Duration::from_millis(3_600_000);

/// How long a successful decision is trusted without asking the backend.
pub const SUCCESS_BLIND_INTERVAL: Duration = Duration::from_millis(600_000);

/// How long a credentials failure suppresses a retry with unchanged
/// credentials.
pub const CREDENTIALS_BLIND_INTERVAL: Duration = Duration::from_millis(1_000);

/// How long a connection failure suppresses network retries.
pub const NETWORK_BLIND_INTERVAL: Duration = Duration::from_millis(600_000);

/// Smallest accepted non-zero refresh interval.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// LoginConfig
// ---------------------------------------------------------------------------

/// Blind intervals plus the background refresh schedule.
///
/// `#[serde(default)]` means any field missing from a config file keeps
/// its default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Preemptive relogin threshold for the remaining ticket lifetime.
    pub time_to_relogin: Duration,

    /// Cached success is returned as-is inside this window.
    pub success_blind_interval: Duration,

    /// Retry suppression after a credentials failure.
    pub credentials_blind_interval: Duration,

    /// Retry suppression after a connection failure.
    pub network_blind_interval: Duration,

    /// Period of the background sweep. `Duration::ZERO` disables it.
    pub refresh_interval: Duration,

    /// Upper bound of the random delay before the first sweep, so several
    /// coordinators started together don't sweep in lockstep.
    pub refresh_jitter: Duration,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            time_to_relogin: TIME_TO_RELOGIN,
            success_blind_interval: SUCCESS_BLIND_INTERVAL,
            credentials_blind_interval: CREDENTIALS_BLIND_INTERVAL,
            network_blind_interval: NETWORK_BLIND_INTERVAL,
            refresh_interval: Duration::from_secs(5 * 60),
            refresh_jitter: Duration::from_secs(2),
        }
    }
}

impl LoginConfig {
    /// Fixes values that would make the refresh loop spin.
    ///
    /// A non-zero `refresh_interval` below one second is raised to one
    /// second; zero is left alone (it means "no background sweep").
    pub fn validated(mut self) -> Self {
        if !self.refresh_interval.is_zero() && self.refresh_interval < MIN_REFRESH_INTERVAL {
            tracing::warn!(
                requested_ms = self.refresh_interval.as_millis() as u64,
                min_ms = MIN_REFRESH_INTERVAL.as_millis() as u64,
                "refresh_interval below minimum, clamping"
            );
            self.refresh_interval = MIN_REFRESH_INTERVAL;
        }
        self
    }

    /// Returns the sweep period, or `None` when sweeping is disabled.
    pub fn refresh_period(&self) -> Option<Duration> {
        if self.refresh_interval.is_zero() {
            None
        } else {
            Some(self.refresh_interval)
        }
    }
}
