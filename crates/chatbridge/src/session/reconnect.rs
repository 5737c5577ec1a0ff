//! Reconnect backoff.

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Tracks consecutive reconnect attempts.
#[derive(Debug)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, with up to 10% jitter subtracted so
    /// the cap is never exceeded.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = rand::rng().random_range(0.0..=0.1);
        base.mul_f64(1.0 - jitter)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.policy.multiplier.max(1.0);
        let factor = multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.policy.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.policy.max_delay.as_secs_f64() {
            self.policy.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
