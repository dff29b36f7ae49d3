//! Pursuit controller: chases a stream of externally supplied target
//! positions, with no cycle or phase logic of its own.

use crate::contacts::{check_and_correct_drift_end, check_and_correct_drift_start, DriftSensor};
use crate::context::MotionContext;
use crate::motion_math;
use crate::motor::{Direction, StepSink};
use crate::stats::StatsTracking;

/// Outcome of one [`PursuitController::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PursuitEvent {
    /// No motion needed, or still waiting out the step delay.
    None,
    /// One step was emitted.
    Stepped,
    /// The carriage reached the current target.
    Arrived,
    /// A limit contact fired.
    SafetyFault,
}

/// Real-time target-chasing controller.
pub struct PursuitController {
    current_step: i64,
    target_step: i64,
    last_step_us: u64,
}

impl PursuitController {
    /// Construct a controller at `current_step`, targeting its own position.
    pub fn new(current_step: i64) -> Self {
        Self {
            current_step,
            target_step: current_step,
            last_step_us: 0,
        }
    }

    /// Current absolute step position.
    pub fn current_step(&self) -> i64 {
        self.current_step
    }

    /// Queue a new target position, clamped to `[min_step, max_step]`.
    pub fn set_target_step(&mut self, target_step: i64, min_step: i64, max_step: i64) {
        self.target_step = target_step.clamp(min_step, max_step);
    }

    /// Queue a new target in millimeters.
    pub fn set_target_mm(&mut self, mm: f64, steps_per_mm: f64, min_step: i64, max_step: i64) {
        self.set_target_step(motion_math::mm_to_steps(mm, steps_per_mm), min_step, max_step);
    }

    /// Run one tick. At most one step is emitted.
    pub fn process<M: StepSink, C: DriftSensor>(
        &mut self,
        ctx: &mut MotionContext<M, C>,
        stats: &mut StatsTracking,
    ) -> PursuitEvent {
        if self.current_step == self.target_step {
            return PursuitEvent::Arrived;
        }

        let error_mm =
            motion_math::steps_to_mm(self.target_step - self.current_step, ctx.cfg.steps_per_mm);
        let delay = motion_math::pursuit_step_delay_us(
            error_mm,
            ctx.cfg.max_speed_level,
            ctx.cfg.steps_per_mm,
            ctx.cfg.speed_compensation_factor,
        );
        if ctx.now_us.saturating_sub(self.last_step_us) < delay as u64 {
            return PursuitEvent::None;
        }

        let test_zone = ctx.hard_drift_test_zone_steps();
        let direction = if self.target_step > self.current_step {
            Direction::Forward
        } else {
            Direction::Backward
        };

        match direction {
            Direction::Forward => {
                if ctx.contacts.hard_drift_end(self.current_step, ctx.max_step, test_zone) {
                    return PursuitEvent::SafetyFault;
                }
                if let Some(c) = check_and_correct_drift_end(self.current_step, ctx.max_step, ctx.cfg.soft_drift_buffer_steps) {
                    self.current_step = c;
                    self.target_step = self.target_step.min(ctx.max_step);
                    self.last_step_us = ctx.now_us;
                    return PursuitEvent::None;
                }
            }
            Direction::Backward => {
                if ctx.contacts.hard_drift_start(self.current_step, ctx.min_step, test_zone) {
                    return PursuitEvent::SafetyFault;
                }
                if let Some(c) = check_and_correct_drift_start(self.current_step, ctx.min_step, ctx.cfg.soft_drift_buffer_steps) {
                    self.current_step = c;
                    self.target_step = self.target_step.max(ctx.min_step);
                    self.last_step_us = ctx.now_us;
                    return PursuitEvent::None;
                }
            }
        }

        let _ = ctx.motor.step_in(direction);
        self.current_step += if direction == Direction::Forward { 1 } else { -1 };
        self.last_step_us = ctx.now_us;
        stats.track_delta(self.current_step);
        PursuitEvent::Stepped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::contacts::ContactSensors;
    use crate::motor::MotorDriver;
    use crate::sim::{SimClock, SimContact, SimDelay, SimPin};

    #[test]
    fn idle_with_matching_target_reports_arrived() {
        let mut p = PursuitController::new(100);
        let cfg = EngineConfig::default();
        let clock = SimClock::default();
        let mut motor = MotorDriver::init(SimPin::default(), SimPin::default(), SimPin::default(), SimDelay(&clock)).unwrap();
        let start_c = SimContact::default();
        let end_c = SimContact::default();
        let mut contacts = ContactSensors::new(start_c.pin.clone(), end_c.pin.clone(), SimDelay(&clock));
        let mut stats = StatsTracking::default();
        let mut ctx = MotionContext::new(&mut motor, &mut contacts, 0, 0, &cfg, 0, 100_000);
        assert_eq!(p.process(&mut ctx, &mut stats), PursuitEvent::Arrived);
    }

    #[test]
    fn set_target_clamps_to_bounds() {
        let mut p = PursuitController::new(0);
        p.set_target_step(10_000, 0, 500);
        assert_eq!(p.target_step, 500);
        p.set_target_step(-10, 0, 500);
        assert_eq!(p.target_step, 0);
    }

    #[test]
    fn chases_target_and_arrives() {
        let mut p = PursuitController::new(0);
        p.set_target_step(50, -1_000, 1_000);
        let cfg = EngineConfig::default();
        let clock = SimClock::default();
        let mut motor = MotorDriver::init(SimPin::default(), SimPin::default(), SimPin::default(), SimDelay(&clock)).unwrap();
        let start_c = SimContact::default();
        let end_c = SimContact::default();
        let mut contacts = ContactSensors::new(start_c.pin.clone(), end_c.pin.clone(), SimDelay(&clock));
        let mut stats = StatsTracking::default();

        let mut arrived = false;
        for _ in 0..20_000 {
            clock.advance(50);
            let mut ctx = MotionContext::new(&mut motor, &mut contacts, clock.now_us(), clock.now_ms(), &cfg, -1_000, 1_000);
            match p.process(&mut ctx, &mut stats) {
                PursuitEvent::Arrived => {
                    arrived = true;
                    break;
                }
                PursuitEvent::SafetyFault => panic!("unexpected safety fault"),
                _ => {}
            }
        }
        assert!(arrived);
        assert_eq!(p.current_step(), 50);
    }

    #[test]
    fn reversing_target_changes_direction_cleanly() {
        let mut p = PursuitController::new(0);
        p.set_target_step(20, -1_000, 1_000);
        let cfg = EngineConfig::default();
        let clock = SimClock::default();
        let mut motor = MotorDriver::init(SimPin::default(), SimPin::default(), SimPin::default(), SimDelay(&clock)).unwrap();
        let start_c = SimContact::default();
        let end_c = SimContact::default();
        let mut contacts = ContactSensors::new(start_c.pin.clone(), end_c.pin.clone(), SimDelay(&clock));
        let mut stats = StatsTracking::default();

        for _ in 0..5_000 {
            clock.advance(50);
            let mut ctx = MotionContext::new(&mut motor, &mut contacts, clock.now_us(), clock.now_ms(), &cfg, -1_000, 1_000);
            if p.process(&mut ctx, &mut stats) == PursuitEvent::Arrived {
                break;
            }
        }
        p.set_target_step(-30, -1_000, 1_000);
        let mut arrived = false;
        for _ in 0..20_000 {
            clock.advance(50);
            let mut ctx = MotionContext::new(&mut motor, &mut contacts, clock.now_us(), clock.now_ms(), &cfg, -1_000, 1_000);
            if p.process(&mut ctx, &mut stats) == PursuitEvent::Arrived {
                arrived = true;
                break;
            }
        }
        assert!(arrived);
        assert_eq!(p.current_step(), -30);
    }
}
