//! Deterministic time system
//!
//! Fixed 60Hz tick rate driven by an accumulator of wall-clock time.
//!
//! Elapsed time is kept in exact integer units (nanoseconds scaled by the tick
//! rate), so the number of ticks fired for a total elapsed time `S` is always
//! `floor(S * 60)` no matter how `S` was split across calls.

use std::time::Duration;

/// Simulation tick counter.
pub type Tick = u32;

/// Fixed simulation tick rate (60 Hz = 16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_DURATION_SECS: f64 = 1.0 / TICK_RATE_HZ as f64;
pub const TICK_DURATION: Duration = Duration::from_nanos(16_666_667); // rounded, for display/sleeps

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Accumulator-based fixed-step clock.
///
/// Call [`TickClock::step`] once per frame with the frame's elapsed time, then
/// keep calling it with [`Duration::ZERO`] while it returns `true` to drain the
/// backlog. There is no cap on the backlog: a caller that stalls for seconds
/// runs every missed tick on the next frame.
#[derive(Debug, Clone, Default)]
pub struct TickClock {
    tick: Tick,
    // nanoseconds * TICK_RATE_HZ; one tick period == NANOS_PER_SEC
    accumulated: u128,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick. Starts at 0 and goes up by exactly one per fired step.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Add `elapsed` and fire at most one tick.
    ///
    /// Returns `true` when a tick fired; the counter has already been
    /// incremented when this returns.
    pub fn step(&mut self, elapsed: Duration) -> bool {
        self.accumulated += elapsed.as_nanos() * TICK_RATE_HZ as u128;
        if self.accumulated < NANOS_PER_SEC {
            return false;
        }

        self.accumulated -= NANOS_PER_SEC;
        self.tick = self.tick.wrapping_add(1);
        true
    }

    /// [`TickClock::step`] taking seconds. Negative or non-finite input counts as zero.
    pub fn step_secs(&mut self, elapsed_secs: f64) -> bool {
        let elapsed = Duration::try_from_secs_f64(elapsed_secs).unwrap_or(Duration::ZERO);
        self.step(elapsed)
    }

    /// Unconsumed time below one tick period (or above it, if the backlog was not drained).
    pub fn accumulated(&self) -> Duration {
        let nanos = self.accumulated / TICK_RATE_HZ as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Whole ticks currently waiting to be drained.
    pub fn pending_ticks(&self) -> u64 {
        (self.accumulated / NANOS_PER_SEC).min(u64::MAX as u128) as u64
    }

    /// Fraction of the next tick already accumulated, for render interpolation.
    pub fn alpha(&self) -> f32 {
        let residual = self.accumulated % NANOS_PER_SEC;
        residual as f32 / NANOS_PER_SEC as f32
    }

    pub fn reset(&mut self) {
        self.tick = 0;
        self.accumulated = 0;
    }
}
