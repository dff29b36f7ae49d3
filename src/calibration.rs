//! Homing: discovers total travel by driving to each limit contact in turn.
//!
//! Shaped like the teacher's `command::homing::HomingSupervisor`: a phase
//! enum, a `start`/`tick` pair, and a typed tick result the caller applies
//! rather than the supervisor mutating system state directly.

use crate::contacts::DriftSensor;
use crate::context::MotionContext;
use crate::motor::{Direction, StepSink};

/// Phase of the homing procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    /// Not homing.
    Idle,
    /// Driving toward the start contact.
    MovingToStart,
    /// Backing off the start contact until it releases, then by the safety offset.
    LeavingStart,
    /// Driving toward the end contact.
    MovingToEnd,
    /// Backing off the end contact.
    LeavingEnd,
    /// Returning to the start-side origin after the travel length is known.
    ReturningToZero,
    /// Homing completed successfully.
    Finished,
    /// Contact not found within the watchdog step budget.
    Failed,
}

/// Outcome of one [`Calibrator::tick`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingTickResult {
    /// Homing still in progress.
    InProgress,
    /// Homing completed; `total_distance_mm` gives the measured travel.
    Success {
        /// Discovered travel length, millimeters.
        total_distance_mm: f64,
    },
    /// Watchdog step budget exhausted without finding a contact.
    Failed,
}

/// Approach speed, in delay microseconds between steps, used throughout homing.
pub const APPROACH_STEP_DELAY_US: u32 = 2_000;
/// Step budget before a phase gives up and reports failure.
pub const WATCHDOG_STEPS: u32 = 200_000;

/// Homing supervisor. Drives the axis to the start contact, then the end
/// contact, measuring the step count between them.
pub struct Calibrator {
    phase: HomingPhase,
    steps_taken: u32,
    start_step: i64,
    end_step: i64,
    current_step: i64,
    measured_total_distance_mm: f64,
    last_step_us: u64,
}

impl Calibrator {
    /// Construct an idle calibrator.
    pub fn new() -> Self {
        Self {
            phase: HomingPhase::Idle,
            steps_taken: 0,
            start_step: 0,
            end_step: 0,
            current_step: 0,
            measured_total_distance_mm: 0.0,
            last_step_us: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> HomingPhase {
        self.phase
    }

    /// Begin homing from an unknown position.
    pub fn start(&mut self) {
        self.phase = HomingPhase::MovingToStart;
        self.steps_taken = 0;
        self.current_step = 0;
        self.last_step_us = 0;
    }

    /// Resulting step position after homing completes, valid once
    /// [`Self::phase`] is [`HomingPhase::Finished`].
    pub fn current_step(&self) -> i64 {
        self.current_step
    }

    fn watchdog_tick(&mut self) -> bool {
        self.steps_taken += 1;
        if self.steps_taken > WATCHDOG_STEPS {
            self.phase = HomingPhase::Failed;
            true
        } else {
            false
        }
    }

    /// True if `APPROACH_STEP_DELAY_US` hasn't elapsed since the last step;
    /// the watchdog still counts gated ticks, so a stuck contact still times
    /// out on schedule.
    fn rate_limited(&mut self, now_us: u64) -> bool {
        if now_us.saturating_sub(self.last_step_us) < APPROACH_STEP_DELAY_US as u64 {
            true
        } else {
            self.last_step_us = now_us;
            false
        }
    }

    /// Run one homing tick, emitting at most one step.
    pub fn tick<M: StepSink, C: DriftSensor>(
        &mut self,
        ctx: &mut MotionContext<M, C>,
        steps_per_mm: f64,
        safety_offset_steps: i64,
    ) -> HomingTickResult {
        match self.phase {
            HomingPhase::Idle | HomingPhase::Finished => HomingTickResult::InProgress,
            HomingPhase::Failed => HomingTickResult::Failed,

            HomingPhase::MovingToStart => {
                if ctx.contacts.hard_drift_start(self.current_step, self.current_step, i64::MAX) {
                    self.phase = HomingPhase::LeavingStart;
                    self.steps_taken = 0;
                    self.last_step_us = ctx.now_us;
                    return HomingTickResult::InProgress;
                }
                if self.watchdog_tick() {
                    return HomingTickResult::Failed;
                }
                if self.rate_limited(ctx.now_us) {
                    return HomingTickResult::InProgress;
                }
                let _ = ctx.motor.step_in(Direction::Backward);
                self.current_step -= 1;
                HomingTickResult::InProgress
            }

            HomingPhase::LeavingStart => {
                if !ctx.contacts.hard_drift_start(self.current_step, self.current_step, i64::MAX) {
                    self.current_step = 0;
                    self.start_step = 0;
                    for _ in 0..safety_offset_steps.max(0) {
                        let _ = ctx.motor.step_in(Direction::Forward);
                        self.current_step += 1;
                    }
                    self.phase = HomingPhase::MovingToEnd;
                    self.steps_taken = 0;
                    self.last_step_us = ctx.now_us;
                    return HomingTickResult::InProgress;
                }
                if self.watchdog_tick() {
                    return HomingTickResult::Failed;
                }
                if self.rate_limited(ctx.now_us) {
                    return HomingTickResult::InProgress;
                }
                let _ = ctx.motor.step_in(Direction::Forward);
                self.current_step += 1;
                HomingTickResult::InProgress
            }

            HomingPhase::MovingToEnd => {
                if ctx.contacts.hard_drift_end(self.current_step, self.current_step, i64::MAX) {
                    self.phase = HomingPhase::LeavingEnd;
                    self.steps_taken = 0;
                    self.last_step_us = ctx.now_us;
                    return HomingTickResult::InProgress;
                }
                if self.watchdog_tick() {
                    return HomingTickResult::Failed;
                }
                if self.rate_limited(ctx.now_us) {
                    return HomingTickResult::InProgress;
                }
                let _ = ctx.motor.step_in(Direction::Forward);
                self.current_step += 1;
                HomingTickResult::InProgress
            }

            HomingPhase::LeavingEnd => {
                if !ctx.contacts.hard_drift_end(self.current_step, self.current_step, i64::MAX) {
                    self.end_step = self.current_step;
                    for _ in 0..safety_offset_steps.max(0) {
                        let _ = ctx.motor.step_in(Direction::Backward);
                        self.current_step -= 1;
                    }
                    self.measured_total_distance_mm =
                        crate::motion_math::steps_to_mm(self.end_step - self.start_step, steps_per_mm);
                    self.phase = HomingPhase::ReturningToZero;
                    self.steps_taken = 0;
                    self.last_step_us = ctx.now_us;
                    return HomingTickResult::InProgress;
                }
                if self.watchdog_tick() {
                    return HomingTickResult::Failed;
                }
                if self.rate_limited(ctx.now_us) {
                    return HomingTickResult::InProgress;
                }
                let _ = ctx.motor.step_in(Direction::Backward);
                self.current_step -= 1;
                HomingTickResult::InProgress
            }

            HomingPhase::ReturningToZero => {
                if self.current_step <= 0 {
                    self.phase = HomingPhase::Finished;
                    return HomingTickResult::Success {
                        total_distance_mm: self.measured_total_distance_mm,
                    };
                }
                if self.watchdog_tick() {
                    return HomingTickResult::Failed;
                }
                if self.rate_limited(ctx.now_us) {
                    return HomingTickResult::InProgress;
                }
                let _ = ctx.motor.step_in(Direction::Backward);
                self.current_step -= 1;
                HomingTickResult::InProgress
            }
        }
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}
