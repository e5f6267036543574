use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deterministic exponential wait: starts at the initial delay and doubles up to the cap.
///
/// State lives in the instance; build a new one to start over from the initial delay.
pub struct Backoff {
    delays: ExponentialBackoff,
    next_delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        let mut delays = ExponentialBuilder::default()
            .with_min_delay(initial)
            .with_max_delay(max)
            .with_factor(2.0)
            .without_max_times()
            .build();
        let next_delay = delays.next().unwrap_or(initial);
        Self {
            delays,
            next_delay,
            max_delay: max,
        }
    }

    /// Delay the next call to [`Backoff::wait`] will sleep for.
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Sleeps for the current delay, or less if `cancel` fires, then escalates the delay.
    ///
    /// Returns `false` when the wait was cut short by cancellation.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let completed = tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.next_delay) => true,
        };
        self.next_delay = self.delays.next().unwrap_or(self.max_delay);
        completed
    }
}
