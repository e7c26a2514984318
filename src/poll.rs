//! Generic polling helper.
//!
//! [`poll_until`] repeatedly runs an async probe at a fixed interval until
//! it yields a value or the overall timeout elapses. It knows nothing about
//! what is being probed, so the same loop drives file-readiness checks and
//! can be exercised in tests with tokio's paused clock.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

/// Run `probe` every `interval` until it returns `Some`, or give up after
/// `timeout`.
///
/// The first probe runs immediately. Returns `None` on timeout; a probe
/// already in flight when the deadline passes is abandoned.
pub async fn poll_until<T, F, Fut>(interval: Duration, timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let attempts = async {
        loop {
            ticker.tick().await;
            if let Some(value) = probe().await {
                return value;
            }
        }
    };

    tokio::time::timeout_at(deadline, attempts).await.ok()
}
