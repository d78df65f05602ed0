//! Retry pacing for endpoint checks.
//!
//! The delay between attempts ramps linearly and then stays flat:
//! 10s, 20s, 30s, 30s, ... The poll loop is modelled as a small state
//! machine so it can be stepped without real sleeps.

use std::time::Duration;

/// Delay before the first retry, and the increment for each one after it
pub const DELAY_STEP: Duration = Duration::from_secs(10);

/// Ceiling for the delay between attempts
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Delay to sleep before retry number `retry` (1-based)
pub fn delay_for_retry(retry: u32) -> Duration {
    DELAY_STEP.saturating_mul(retry.max(1)).min(MAX_DELAY)
}

/// Where a poll currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// About to issue an attempt
    Attempting { attempt: u32 },

    /// Waiting before the next attempt
    Backoff { retry: u32, delay: Duration },

    /// Got a 200
    Succeeded,

    /// `max_wait` elapsed without a 200
    TimedOut,

    /// Could not even build the request
    Failed,
}

/// Counters carried across the attempts of one poll
#[derive(Debug, Clone)]
pub struct RetryState {
    max_wait: Duration,
    attempts: u32,
    retries: u32,
    delays: Vec<Duration>,
}

impl RetryState {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            attempts: 0,
            retries: 0,
            delays: Vec::new(),
        }
    }

    /// Record that an attempt is starting
    pub fn begin_attempt(&mut self) -> PollState {
        self.attempts += 1;
        PollState::Attempting {
            attempt: self.attempts,
        }
    }

    /// Decide what follows an attempt that finished `elapsed` after the
    /// poll started.
    ///
    /// The backoff delay never reaches past `max_wait`, so a poll that
    /// keeps failing makes one last attempt right at the deadline.
    pub fn after_attempt(&mut self, succeeded: bool, elapsed: Duration) -> PollState {
        if succeeded {
            return PollState::Succeeded;
        }
        if elapsed >= self.max_wait {
            return PollState::TimedOut;
        }

        self.retries += 1;
        let remaining = self.max_wait - elapsed;
        let delay = delay_for_retry(self.retries).min(remaining);
        self.delays.push(delay);

        PollState::Backoff {
            retry: self.retries,
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Every delay handed out so far, in order
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}
