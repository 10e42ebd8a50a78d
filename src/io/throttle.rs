//! Cooperative pacing of bulk reads and writes.

use std::thread;
use std::time::Duration;

/// Pauses a bulk operation after every `every` units of work.
///
/// Only enabled in production mode; tests and local runs go full speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    enabled: bool,
    every: u64,
    pause: Duration,
}

impl Throttle {
    /// A throttle that never pauses.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            every: 1,
            pause: Duration::ZERO,
        }
    }

    /// A throttle that pauses for `pause` after every `every` units when
    /// `enabled` is set.
    #[must_use]
    pub const fn new(enabled: bool, every: u64, pause: Duration) -> Self {
        Self {
            enabled,
            every: if every == 0 { 1 } else { every },
            pause,
        }
    }

    /// Returns whether the policy pauses at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.pause.is_zero()
    }

    /// Returns the pause duration.
    #[must_use]
    pub const fn pause(&self) -> Duration {
        self.pause
    }

    /// Returns whether `done` completed units call for a pause.
    #[must_use]
    pub fn should_pause(&self, done: u64) -> bool {
        self.is_enabled() && done > 0 && done % self.every == 0
    }

    /// Sleeps if `done` completed units call for a pause.
    pub fn tick(&self, done: u64) {
        if self.should_pause(done) {
            tracing::debug!(done, pause_ms = self.pause.as_millis(), "throttling");
            thread::sleep(self.pause);
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::disabled()
    }
}
