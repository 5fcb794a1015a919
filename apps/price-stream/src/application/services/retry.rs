//! Stream Retry Policy
//!
//! Fixed-delay retry for the streaming transport. The delay does not
//! grow between attempts; continuity while the stream is down comes from
//! the polling fallback, not from pacing the reconnects.

use std::time::Duration;

/// Configuration for stream retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay between reconnection attempts.
    pub delay: Duration,
    /// Maximum number of attempts before giving up on the stream
    /// (0 = unlimited). Polling continues either way.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 0,
        }
    }
}

/// Fixed-delay retry policy with attempt counting.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempts: u32,
}

impl RetryPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` when the attempt cap is
    /// exhausted.
    pub const fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.config.delay)
    }

    /// Reset the counter after a successful connection.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }
}
