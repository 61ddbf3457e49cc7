//! Fixed-step frame clock.
//!
//! The app advances this once per tick by the configured fixed delta, and
//! only while unpaused — so `elapsed` is simulated time, not wall time.

use std::time::Duration;

/// Simulated time accumulated by the app driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct Time {
    elapsed: Duration,
    delta: Duration,
    ticks: u64,
}

impl Time {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Advance by one fixed step. Not called while paused.
    pub(crate) fn advance(&mut self, dt: f32) {
        self.delta = Duration::from_secs_f32(dt);
        self.elapsed += self.delta;
        self.ticks += 1;
    }

    /// Simulated time since the app started, excluding paused ticks.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Simulated time in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// The fixed step of the most recent unpaused tick.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Number of unpaused ticks so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_accumulates_fixed_steps() {
        let mut time = Time::new();
        for _ in 0..120 {
            time.advance(1.0 / 120.0);
        }
        assert_eq!(time.tick_count(), 120);
        assert!((time.elapsed_secs() - 1.0).abs() < 1e-3);
        assert!((time.delta_secs() - 1.0 / 120.0).abs() < 1e-6);
    }
}
