//! Retry policy for generation requests

use std::time::Duration;

/// How the wait between attempts evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt
    Fixed,
    /// Delay doubles after every failed attempt, capped at `max`
    Exponential {
        /// Maximum delay cap
        max: Duration,
    },
}

/// Retry policy for generation requests
///
/// Controls how many attempts are made, how long each may take and how
/// long to wait between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub backoff: Duration,
    /// Growth of the delay across attempts
    pub strategy: Backoff,
    /// Deadline for a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            strategy: Backoff::Fixed,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.strategy {
            Backoff::Fixed => self.backoff,
            Backoff::Exponential { max } => {
                let exponent = attempt.saturating_sub(1);
                self.backoff
                    .saturating_mul(2u32.saturating_pow(exponent))
                    .min(max)
            }
        }
    }

    /// Whether another attempt follows attempt number `attempt` (1-based)
    #[must_use]
    pub const fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
