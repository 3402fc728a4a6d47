//! # Time
//!
//! Millisecond time base shared by the scheduler and the tasks. One
//! [`Instant`] tick is one SysTick period (`config::TICK_HZ` = 1 kHz).
//! Instants are 32-bit and compare with wrap-around semantics, so ordering
//! stays correct across the ~49.7 day rollover as long as compared instants
//! are less than half the range apart.

use core::cell::Cell;

use crate::config::{IDLE_STEP_MS, TICK_HZ};

/// Point in time, millisecond resolution.
pub type Instant = fugit::TimerInstantU32<TICK_HZ>;

/// Span of time, millisecond resolution.
pub type Duration = fugit::TimerDurationU32<TICK_HZ>;

/// Source of the current time, plus what to do when no task is ready.
pub trait Clock {
    /// Current time.
    fn now(&self) -> Instant;

    /// Called by the scheduler loop when no task is ready. Hardware clocks
    /// sleep until the next interrupt; the default returns immediately.
    fn idle(&self) {}
}

/// Time elapsed from `earlier` to `later`, zero if `later` is not after
/// `earlier`.
#[inline]
pub fn elapsed(earlier: Instant, later: Instant) -> Duration {
    later
        .checked_duration_since(earlier)
        .unwrap_or(Duration::from_ticks(0))
}

/// Software clock for tests and simulation.
///
/// Time only moves when told to: [`advance`](ManualClock::advance),
/// [`set`](ManualClock::set), or an idle call from the scheduler, which
/// advances it by `config::IDLE_STEP_MS`.
#[derive(Debug)]
pub struct ManualClock {
    ticks: Cell<u32>,
    idle_step: u32,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub const fn starting_at(ms: u32) -> Self {
        Self {
            ticks: Cell::new(ms),
            idle_step: IDLE_STEP_MS,
        }
    }

    /// Override how far an idle call moves time (0 freezes time while idle).
    pub fn with_idle_step(mut self, ms: u32) -> Self {
        self.idle_step = ms;
        self
    }

    pub fn advance(&self, by: Duration) {
        self.ticks.set(self.ticks.get().wrapping_add(by.ticks()));
    }

    pub fn set(&self, ms: u32) {
        self.ticks.set(ms);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.ticks.get())
    }

    fn idle(&self) {
        self.advance(Duration::from_ticks(self.idle_step));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now().ticks(), 0);
        clock.advance(Duration::millis(250));
        assert_eq!(clock.now().ticks(), 250);
        clock.idle();
        assert_eq!(clock.now().ticks(), 250 + IDLE_STEP_MS);
    }

    #[test]
    fn test_elapsed_saturates_at_zero() {
        let a = Instant::from_ticks(1_000);
        let b = Instant::from_ticks(1_600);
        assert_eq!(elapsed(a, b).to_millis(), 600);
        assert_eq!(elapsed(b, a).to_millis(), 0);
    }

    #[test]
    fn test_ordering_survives_rollover() {
        let before = Instant::from_ticks(u32::MAX - 5);
        let after = before + Duration::millis(10);
        assert!(after > before);
        assert_eq!(elapsed(before, after).to_millis(), 10);
    }

    #[test]
    fn test_frozen_idle() {
        let clock = ManualClock::starting_at(40).with_idle_step(0);
        clock.idle();
        assert_eq!(clock.now().ticks(), 40);
    }
}
