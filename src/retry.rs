// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded retry budgets
//!
//! Every retry loop in the station is capped. Unbounded retry only emerges
//! from the scheduler calling a manager again on the next tick.

use crate::clock::Clock;
use std::time::Duration;

/// Retry strategy for a single bounded operation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Single attempt, no retries
    #[default]
    None,
    /// Fixed number of attempts with constant delay between them
    Fixed {
        /// Maximum number of attempts
        max_attempts: u32,
        /// Delay between attempts
        delay: Duration,
    },
}

impl RetryStrategy {
    /// Create a fixed strategy
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Maximum number of attempts (at least one)
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Delay to wait after the given attempt (0-indexed).
    ///
    /// Returns `None` once the attempt cap is reached.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
        }
    }

    /// Worst-case time spent waiting between attempts
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts())
            .filter_map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

/// Outcome of a bounded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Whether the condition became true
    pub satisfied: bool,
    /// Attempts made
    pub attempts: u32,
}

/// Poll `condition` until it holds or the strategy is exhausted.
///
/// Waits through `clock` between attempts, so the total blocking time is
/// bounded by [`RetryStrategy::worst_case_wait`].
pub fn poll_until<F>(strategy: &RetryStrategy, clock: &dyn Clock, mut condition: F) -> PollOutcome
where
    F: FnMut() -> bool,
{
    let mut attempt = 0;
    loop {
        if condition() {
            return PollOutcome {
                satisfied: true,
                attempts: attempt + 1,
            };
        }
        match strategy.delay_after(attempt) {
            Some(delay) => {
                clock.sleep(delay);
                attempt += 1;
            }
            None => {
                return PollOutcome {
                    satisfied: false,
                    attempts: attempt + 1,
                }
            }
        }
    }
}
