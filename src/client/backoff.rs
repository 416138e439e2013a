use std::time::Duration;

use rand::Rng;

/// Exponential reconnect delays: `base * 2^(attempt - 1)`, capped, optionally jittered.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    /// Create a schedule starting at `base` and never exceeding `max`.
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter,
        }
    }

    /// Delay before reconnect attempt `attempt`, counting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base
            .checked_mul(1 << exponent)
            .unwrap_or(self.max)
            .min(self.max);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        // Up to a quarter of the delay, in either direction.
        let spread = delay.as_millis() as u64 / 4;
        if spread == 0 {
            return delay;
        }
        let offset = rand::rng().random_range(0..=spread * 2);
        (delay + Duration::from_millis(offset))
            .saturating_sub(Duration::from_millis(spread))
            .min(self.max)
    }
}
