// clock.rs — Clock-period arithmetic for schedule times
//
// Maps continuous schedule times (same unit as the clock period, typically
// nanoseconds) to integer clock indices. A fixed minimal epsilon breaks
// ties at clock boundaries: a value produced exactly at a boundary belongs
// to the cycle it starts, not the one it ends. Every clock comparison in
// the compiler must go through this module rather than raw float division.
//
// Preconditions: period > 0.
// Postconditions: none (pure arithmetic).
// Failure modes: none.
// Side effects: none.

/// Tie-breaking epsilon, in the same continuous unit as the clock period.
/// Must be far below any realistic operator latency.
pub const BOUNDARY_EPS: f64 = 1e-9;

/// Clock-period arithmetic context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockModel {
    period: f64,
}

impl ClockModel {
    pub fn new(period: f64) -> Self {
        assert!(period > 0.0, "clock period must be positive");
        ClockModel { period }
    }

    /// Derive the period from a target frequency in Hz, with times in ns.
    pub fn from_freq_hz(freq_hz: f64) -> Self {
        ClockModel::new(1.0e9 / freq_hz)
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Clock index of a *start* time. A time exactly on a boundary is
    /// attributed to the cycle beginning there.
    pub fn index_of(&self, t: f64) -> i64 {
        ((t + BOUNDARY_EPS) / self.period).floor() as i64
    }

    /// Clock index of an *end* time. A time exactly on a boundary is
    /// attributed to the cycle ending there.
    pub fn index_of_end(&self, t: f64) -> i64 {
        ((t - BOUNDARY_EPS) / self.period).floor() as i64
    }

    /// First boundary strictly after `t` (modulo the epsilon nudge).
    pub fn next_boundary(&self, t: f64) -> f64 {
        (self.index_of(t) + 1) as f64 * self.period
    }

    /// Start time of clock cycle `idx`.
    pub fn start_of(&self, idx: i64) -> f64 {
        idx as f64 * self.period
    }

    /// End time of clock cycle `idx` (the next boundary).
    pub fn end_of(&self, idx: i64) -> f64 {
        (idx + 1) as f64 * self.period
    }

    /// Whether an operation spanning [start, start + pre] stays within a
    /// single clock cycle.
    pub fn fits_in_cycle(&self, start: f64, pre_latency: f64) -> bool {
        if pre_latency <= 0.0 {
            return true;
        }
        self.index_of(start) == self.index_of_end(start + pre_latency)
    }
}
