//! Bounded wait used between the graceful and forced stop signals.

use std::time::Duration;

/// Default polling cadence while waiting for the worker to exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default ceiling before a stop escalates to a forced kill.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Check `exited` every `interval` until it reports true or `ceiling` passes.
///
/// The first check happens immediately. Returns whether the probe succeeded
/// in time.
pub async fn poll_until<F>(interval: Duration, ceiling: Duration, mut exited: F) -> bool
where
    F: FnMut() -> bool,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::time::timeout(ceiling, async {
        loop {
            ticker.tick().await;
            if exited() {
                return;
            }
        }
    })
    .await
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_when_already_exited() {
        let start = Instant::now();
        assert!(poll_until(POLL_INTERVAL, STOP_TIMEOUT, || true).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_at_fixed_interval_until_exit() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let ok = poll_until(POLL_INTERVAL, STOP_TIMEOUT, || {
            calls.set(calls.get() + 1);
            calls.get() == 4
        })
        .await;
        assert!(ok);
        assert_eq!(calls.get(), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_ceiling() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let ok = poll_until(POLL_INTERVAL, STOP_TIMEOUT, || {
            calls.set(calls.get() + 1);
            false
        })
        .await;
        assert!(!ok);
        assert_eq!(start.elapsed(), STOP_TIMEOUT);
        // Ticks at 0, 0.5, ..., 4.5s; the one due at 5s races the deadline.
        assert!(calls.get() >= 10);
    }
}
