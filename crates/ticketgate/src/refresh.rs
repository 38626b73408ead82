//! Periodic background refresh of every known connection.
//!
//! ```text
//! spawn ──(random jitter)──→ sweep ──(refresh_interval)──→ sweep → ...
//! ```
//!
//! A sweep that overruns the interval doesn't cause a burst of catch-up
//! sweeps: missed ticks are skipped.

use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::{LoginManager, PerformerFactory, Settings};

impl<F: PerformerFactory, S: Settings> LoginManager<F, S> {
    /// Starts the background sweep on the current Tokio runtime.
    ///
    /// Returns `None` when `refresh_interval` is zero. Abort the returned
    /// handle to stop sweeping; the manager itself is unaffected.
    pub fn spawn_refresh_task(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.config.refresh_period()?;
        let jitter = initial_jitter(self.inner.config.refresh_jitter);
        let manager = self.clone();

        debug!(
            period_ms = period.as_millis() as u64,
            jitter_ms = jitter.as_millis() as u64,
            "starting login refresh task"
        );

        Some(tokio::spawn(async move {
            if !jitter.is_zero() {
                time::sleep(jitter).await;
            }
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                manager.refresh_login_state().await;
            }
        }))
    }
}

/// Random delay in `0..max`, so managers started together don't sweep in
/// lockstep.
fn initial_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}
