// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Time sources
//!
//! All deadlines and intervals in the station are measured against a
//! [`Clock`]. [`SystemClock`] uses the host's monotonic and wall clocks;
//! [`ManualClock`] only moves when told to, which keeps timeout and
//! scheduling tests instantaneous.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Shared handle to a clock, held by every component that waits
pub type SharedClock = Rc<dyn Clock>;

/// Source of monotonic and wall-clock time
pub trait Clock {
    /// Monotonic time since the clock was created
    fn now(&self) -> Duration;

    /// Block for the given duration
    fn sleep(&self, duration: Duration);

    /// Current wall-clock time
    fn wall_time(&self) -> DateTime<Utc>;
}

/// Clock backed by [`Instant`] and the system wall clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    /// Create a clock whose monotonic origin is now
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Create a shared handle
    pub fn shared() -> SharedClock {
        Rc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests and simulation
///
/// Time advances on [`Clock::sleep`], on [`ManualClock::advance`], and by
/// an optional fixed step on every [`Clock::now`] call. The step models a
/// busy loop that consumes time even when nothing sleeps.
#[derive(Debug)]
pub struct ManualClock {
    elapsed: Cell<Duration>,
    step: Cell<Duration>,
    epoch: DateTime<Utc>,
    sleeps: Cell<u32>,
}

impl ManualClock {
    /// Create a clock at zero, with wall time starting at the Unix epoch
    pub fn new() -> Self {
        Self {
            elapsed: Cell::new(Duration::ZERO),
            step: Cell::new(Duration::ZERO),
            epoch: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
            sleeps: Cell::new(0),
        }
    }

    /// Create a clock whose wall time starts at the given Unix timestamp
    pub fn starting_at(unix_secs: i64) -> Self {
        let epoch = Utc
            .timestamp_opt(unix_secs, 0)
            .single()
            .unwrap_or_default();
        Self {
            epoch,
            ..Self::new()
        }
    }

    /// Advance time by `step` on every `now()` call
    pub fn with_step(self, step: Duration) -> Self {
        self.step.set(step);
        self
    }

    /// Create a shared handle
    pub fn shared(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    /// Number of `sleep` calls so far
    pub fn sleep_count(&self) -> u32 {
        self.sleeps.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let now = self.elapsed.get();
        self.elapsed.set(now + self.step.get());
        now
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let elapsed = ChronoDuration::from_std(self.elapsed.get())
            .unwrap_or_else(|_| ChronoDuration::zero());
        self.epoch + elapsed
    }
}
