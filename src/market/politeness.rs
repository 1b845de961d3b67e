//! Minimum spacing between outbound calls to a rate-limited upstream.
//!
//! The limiter is owned by one [`MarketGateway`](super::MarketGateway) and
//! its state (the last call instant) is local to this process. Several
//! worker processes each enforce their own interval, so the aggregate rate
//! against the upstream can exceed one call per interval.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default spacing between upstream calls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Serialises callers so that consecutive calls start at least `interval` apart.
pub struct Politeness {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Politeness {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the interval since the previous call has elapsed, then
    /// claim the current instant as the new "previous call".
    ///
    /// The lock is held across the wait so concurrent callers queue up
    /// rather than all firing once the first interval elapses.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let ready_at = last + self.interval;
            if ready_at > Instant::now() {
                debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "delaying upstream call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

impl Default for Politeness {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}
