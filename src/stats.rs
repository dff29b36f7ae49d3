//! Distance-traveled accumulator.
//!
//! Shaped like the teacher's `cycle::CycleStats`: an O(1) accumulator
//! updated from the hot path (`track_delta`), with a heavier, mutex-guarded
//! operation (`mark_saved`) reserved for the slower persistence path.

use serde::{Deserialize, Serialize};

/// Cumulative distance-traveled tracker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatsTracking {
    /// Total steps traveled since boot, monotonically non-decreasing.
    pub total_steps: u64,
    /// `total_steps` value as of the last persistence watermark.
    last_saved_steps: u64,
    /// `current_step` as of the previous call to `track_delta`.
    last_sampled_step: i64,
}

impl StatsTracking {
    /// Record the distance traveled since the previous sample. Called once
    /// per tick from the motion core with the controller's current step
    /// position; safe to call with an unchanged position (delta is zero).
    pub fn track_delta(&mut self, current_step: i64) {
        let delta = (current_step - self.last_sampled_step).unsigned_abs();
        self.total_steps += delta;
        self.last_sampled_step = current_step;
    }

    /// Steps accumulated since the last [`Self::mark_saved`].
    pub fn unsaved_steps(&self) -> u64 {
        self.total_steps - self.last_saved_steps
    }

    /// Advance the persistence watermark to the current total.
    pub fn mark_saved(&mut self) {
        self.last_saved_steps = self.total_steps;
    }

    /// Reset all counters, e.g. after a recalibration changes step geometry.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_forward_and_backward_motion_as_distance() {
        let mut s = StatsTracking::default();
        s.track_delta(10);
        s.track_delta(0);
        assert_eq!(s.total_steps, 20);
    }

    #[test]
    fn total_is_monotonically_non_decreasing() {
        let mut s = StatsTracking::default();
        let mut prev = 0;
        for step in [5, -5, 3, -100, 0, 42] {
            s.track_delta(step);
            assert!(s.total_steps >= prev);
            prev = s.total_steps;
        }
    }

    #[test]
    fn mark_saved_zeroes_unsaved_delta() {
        let mut s = StatsTracking::default();
        s.track_delta(100);
        assert_eq!(s.unsaved_steps(), 100);
        s.mark_saved();
        assert_eq!(s.unsaved_steps(), 0);
        s.track_delta(150);
        assert_eq!(s.unsaved_steps(), 50);
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = StatsTracking::default();
        s.track_delta(500);
        s.mark_saved();
        s.reset();
        assert_eq!(s.total_steps, 0);
        assert_eq!(s.unsaved_steps(), 0);
    }
}
