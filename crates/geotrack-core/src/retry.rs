//! Retry budget and backoff for queued location updates.
//!
//! The worker consults a [`RetryPolicy`] whenever an acquisition reports
//! [`TransientUnavailable`](crate::AcquisitionOutcome::TransientUnavailable).
//! The budget is captured on the queued row at enqueue time, so changing
//! the policy only affects work enqueued afterwards.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use geotrack_core::RetryPolicy;
//!
//! let policy = RetryPolicy::new(5)
//!     .initial_delay(Duration::from_secs(10))
//!     .max_delay(Duration::from_secs(300))
//!     .jitter(false);
//!
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
//! ```

use std::time::Duration;

use rand::Rng;

/// Backoff configuration for retried work.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts a unit of work may make, including the first (min 1).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for the computed delay (before jitter).
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Default backoff with a custom attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Retry without waiting. Used by tests and one-shot CLI runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Set the attempt budget.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// The attempt budget stored on newly enqueued work.
    pub fn budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given (1-based) attempt failed transiently.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64()).max(0.0);

        let final_delay = if self.jitter {
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Absolute time (ms since epoch) of the next attempt.
    pub fn next_run_at(&self, now_ms: i64, attempt: u32) -> i64 {
        let delay_ms = i64::try_from(self.delay_for_attempt(attempt).as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_add(delay_ms)
    }
}
