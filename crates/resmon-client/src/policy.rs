//! Reconnect delay policies.

use std::time::Duration;

/// Default delay between reconnect attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Decides how long to wait before a reconnect attempt.
///
/// `attempt` counts consecutive failures starting at 1 and resets after a
/// successful connection. Returning `None` stops reconnecting.
pub trait RetryPolicy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

impl<F> RetryPolicy for F
where
    F: Fn(u32) -> Option<Duration> + Send + Sync,
{
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self(attempt)
    }
}

/// Retries forever with the same delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval(pub Duration);

impl Default for FixedInterval {
    fn default() -> Self {
        Self(DEFAULT_RETRY_INTERVAL)
    }
}

impl RetryPolicy for FixedInterval {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        Some(self.0)
    }
}

/// Doubles the delay on every failed attempt up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max);
        Some(delay.min(self.max))
    }
}
