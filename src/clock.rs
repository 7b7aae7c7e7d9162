//! High-resolution scheduling for the acquisition loop.
//!
//! [`Clock`] measures seconds since its creation with a monotonic counter and
//! provides two absolute-deadline waits:
//!
//! - [`Clock::sleep_until`] wakes at or after a virtual time,
//! - [`Clock::sleep_from_previous`] schedules relative to the previous *target*,
//!   so lateness on one tick never shifts the following ones.
//!
//! Waiting is hybrid: the bulk of an interval is spent in `thread::sleep`, and only
//! the last [`SPIN_WINDOW`] is busy-polled, which keeps sub-millisecond accuracy
//! without burning a core for the whole period.

use std::time::{Duration, Instant};

/// Portion of every wait that is busy-polled instead of slept.
pub const SPIN_WINDOW: Duration = Duration::from_millis(1);

/// Monotonic clock with drift-free periodic scheduling.
#[derive(Debug, Clone)]
pub struct Clock {
    origin: Instant,
    /// Target of the last `sleep_from_previous` call, in seconds since `origin`.
    previous_target: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            previous_target: 0.0,
        }
    }

    /// Elapsed seconds since the clock was created. Never decreases.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Block until `target` seconds have elapsed and return the actual wake time.
    ///
    /// Never returns early; may overshoot under load. Returns immediately when the
    /// target is already in the past.
    pub fn sleep_until(&self, target: f64) -> f64 {
        let mut now = self.now();
        let remaining = target - now;
        if remaining <= 0.0 {
            return now;
        }

        let coarse = remaining - SPIN_WINDOW.as_secs_f64();
        if coarse > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(coarse));
            now = self.now();
        }

        while now < target {
            std::hint::spin_loop();
            now = self.now();
        }
        now
    }

    /// Block until `seconds` after the previous call's target.
    ///
    /// A non-positive delta returns the current time immediately and leaves the
    /// schedule unchanged.
    pub fn sleep_from_previous(&mut self, seconds: f64) -> f64 {
        if seconds <= 0.0 {
            return self.now();
        }
        self.previous_target += seconds;
        self.sleep_until(self.previous_target)
    }

    /// Anchor the periodic schedule at the current time.
    pub fn reset_schedule(&mut self) {
        self.previous_target = self.now();
    }

    /// Target of the most recent periodic wait.
    pub fn previous_target(&self) -> f64 {
        self.previous_target
    }
}
