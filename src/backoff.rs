//! Reconnection backoff policy.

use std::time::Duration;
use tokio::time::Instant;

/// Computes the delay before the next reconnection attempt.
///
/// `next_delay` is pure and deterministic; the controller owns the attempt
/// counter and stops retrying once `is_exhausted` reports true.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 1.5,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (the first retry is attempt 1).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.mul_f64(self.factor * attempt as f64);
        scaled.clamp(self.initial_delay, self.max_delay)
    }

    /// True once `attempt` exceeds the configured attempt limit.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

/// Book-keeping for an in-progress reconnection. Exists only while the
/// session is reconnecting; dropped on the next successful `Connected`
/// transition.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempt: u32,
    pub next_delay: Duration,
    pub deadline: Instant,
}

impl RetryState {
    pub fn new(attempt: u32, policy: &BackoffPolicy) -> Self {
        let next_delay = policy.next_delay(attempt);
        Self {
            attempt,
            next_delay,
            deadline: Instant::now() + next_delay,
        }
    }
}
