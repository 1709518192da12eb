//! Exponential backoff for generation retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with configurable min/max and an attempt budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    /// Creates a new backoff starting at `initial`, capping at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// Returns the current backoff duration.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Returns how many times the backoff has been advanced.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Advances to the next backoff interval (doubles, capped at max).
    pub fn next(&mut self) {
        self.current = (self.current * 2).min(self.max);
        self.attempts += 1;
    }

    /// Sleeps for the current interval, then advances.
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.current).await;
        self.next();
    }

    /// Resets backoff to initial value.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
