//! Base movement ("VAET"): back-and-forth traversal with optional
//! zone-effect modulation near either endpoint.
//!
//! No single teacher file matches this shape directly; the tick-based
//! `process()` + phase/event-return pattern follows the teacher's
//! `safety::stop::SafeStopExecutor` (`trigger`/`tick`/`phase`), and the
//! pending-config shadow pattern realizes the §9 "pending config" design
//! note as plain ownership instead of a registered callback.

use heapless::Vec as HVec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::context::MotionContext;
use crate::contacts::{check_and_correct_drift_end, check_and_correct_drift_start, DriftSensor};
use crate::motion_math::{self, SpeedCurve, SpeedEffect};
use crate::motor::{Direction, StepSink};
use crate::stats::StatsTracking;

/// Fixed or randomized pause inserted at a cycle or zone boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CyclePauseConfig {
    /// Whether a pause fires at all.
    pub enabled: bool,
    /// If true, duration is uniform random in `[min_s, max_s]`; else `fixed_duration_s`.
    pub is_random: bool,
    /// Fixed duration, seconds.
    pub fixed_duration_s: f64,
    /// Minimum random duration, seconds.
    pub min_s: f64,
    /// Maximum random duration, seconds.
    pub max_s: f64,
}

impl Default for CyclePauseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            is_random: false,
            fixed_duration_s: 1.0,
            min_s: 0.5,
            max_s: 2.0,
        }
    }
}

impl CyclePauseConfig {
    /// Compute a concrete duration in milliseconds for one pause instance.
    pub fn duration_ms(&self, rng: &mut impl Rng) -> u64 {
        let seconds = if self.is_random {
            rng.gen_range(self.min_s.min(self.max_s)..=self.min_s.max(self.max_s))
        } else {
            self.fixed_duration_s
        };
        (seconds * 1000.0).max(0.0) as u64
    }
}

/// Transient pause-timer state, shared shape for cycle pauses and
/// zone-effect end pauses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PauseState {
    /// Whether a pause is currently in effect.
    pub is_pausing: bool,
    /// Timestamp (ms) the pause began.
    pub start_ms: u64,
    /// Computed duration of this pause instance, ms.
    pub duration_ms: u64,
}

impl PauseState {
    /// Begin a pause of `duration_ms` starting at `now_ms`.
    pub fn begin(&mut self, now_ms: u64, duration_ms: u64) {
        self.is_pausing = true;
        self.start_ms = now_ms;
        self.duration_ms = duration_ms;
    }

    /// Returns `true` once the pause has elapsed, clearing it.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if !self.is_pausing {
            return false;
        }
        if now_ms.saturating_sub(self.start_ms) >= self.duration_ms {
            self.is_pausing = false;
            true
        } else {
            false
        }
    }
}

/// Random turnback sub-config of a zone effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnbackConfig {
    /// Whether random turnback is enabled for this zone.
    pub enabled: bool,
    /// Percent chance (0..=100) of a turnback roll succeeding on zone entry.
    pub chance_percent: u8,
}

/// Zone-effect configuration applied near the start and/or end of travel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneEffectConfig {
    /// Apply the effect near the start of travel.
    pub enable_start: bool,
    /// Apply the effect near the end of travel.
    pub enable_end: bool,
    /// Width of the zone, millimeters.
    pub zone_mm: f64,
    /// Swap which end is "start"/"end" on the return (backward) pass.
    pub mirror_on_return: bool,
    /// Speed modulation applied inside the zone.
    pub speed_effect: SpeedEffect,
    /// Curve shape for the speed modulation.
    pub speed_curve: SpeedCurve,
    /// Intensity, 0..=100.
    pub intensity: u8,
    /// Random turnback sub-config.
    pub turnback: TurnbackConfig,
    /// Pause fired when crossing the zone's endpoint.
    pub end_pause: CyclePauseConfig,
}

impl Default for ZoneEffectConfig {
    fn default() -> Self {
        Self {
            enable_start: false,
            enable_end: false,
            zone_mm: 0.0,
            mirror_on_return: false,
            speed_effect: SpeedEffect::None,
            speed_curve: SpeedCurve::Linear,
            intensity: 0,
            turnback: TurnbackConfig::default(),
            end_pause: CyclePauseConfig::default(),
        }
    }
}

/// Per-pass transient state for the zone effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneEffectState {
    /// A turnback point has been rolled and is pending.
    pub has_pending_turnback: bool,
    /// A turnback roll has already happened this pass (no re-roll).
    pub has_rolled: bool,
    /// Distance into the zone, mm, at which to reverse.
    pub turnback_point_mm: f64,
    /// End-pause timer.
    pub pause: PauseState,
}

/// Motion parameters for one VAET configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Start-of-travel position, millimeters from the calibrated zero.
    pub start_position_mm: f64,
    /// Distance of travel from the start position, millimeters.
    pub target_distance_mm: f64,
    /// Speed level driving the forward pass.
    pub speed_forward: f64,
    /// Speed level driving the backward pass.
    pub speed_backward: f64,
    /// Pause inserted after each full cycle.
    pub cycle_pause: CyclePauseConfig,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            start_position_mm: 0.0,
            target_distance_mm: 0.0,
            speed_forward: 5.0,
            speed_backward: 5.0,
            cycle_pause: CyclePauseConfig::default(),
        }
    }
}

/// Outcome of one [`VaetController::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaetEvent {
    /// Nothing happened this tick (gated, paused, or waiting on delay).
    None,
    /// One step was emitted.
    Stepped,
    /// A full forward+backward cycle completed.
    CycleComplete,
    /// A limit contact fired; caller should transition to `Error`.
    SafetyFault,
}

/// Back-and-forth traversal controller.
pub struct VaetController {
    config: MotionConfig,
    pending: Option<MotionConfig>,
    zone_effect: ZoneEffectConfig,
    zone_state: ZoneEffectState,
    cycle_pause: PauseState,
    start_step: i64,
    target_step: i64,
    current_step: i64,
    moving_forward: bool,
    has_reached_start: bool,
    last_step_us: u64,
    completed_cycles: u32,
    rng: StdRng,
}

impl VaetController {
    /// Build a controller at `current_step`, with `config`/`zone_effect`
    /// not yet activated (call [`Self::start`] to begin motion).
    pub fn new(current_step: i64, seed: u64) -> Self {
        Self {
            config: MotionConfig::default(),
            pending: None,
            zone_effect: ZoneEffectConfig::default(),
            zone_state: ZoneEffectState::default(),
            cycle_pause: PauseState::default(),
            start_step: current_step,
            target_step: current_step,
            current_step,
            moving_forward: true,
            has_reached_start: false,
            last_step_us: 0,
            completed_cycles: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Current absolute step position.
    pub fn current_step(&self) -> i64 {
        self.current_step
    }

    /// Number of full forward+backward cycles completed since the last
    /// [`Self::start`].
    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    /// The configuration currently in effect (not the pending shadow).
    pub fn config(&self) -> MotionConfig {
        self.config
    }

    /// Activate a configuration, clamping `target_distance_mm` so the move
    /// fits within `[0, total_distance_mm]`, and pick the initial direction
    /// from where `current_step` already sits relative to the new window.
    pub fn start(
        &mut self,
        mut config: MotionConfig,
        zone_effect: ZoneEffectConfig,
        total_distance_mm: f64,
        steps_per_mm: f64,
    ) {
        let max_distance = (total_distance_mm - config.start_position_mm).max(0.0);
        if config.target_distance_mm > max_distance {
            config.target_distance_mm = max_distance;
        }
        self.start_step = motion_math::mm_to_steps(config.start_position_mm, steps_per_mm);
        self.target_step = self.start_step
            + motion_math::mm_to_steps(config.target_distance_mm, steps_per_mm);
        self.config = config;
        self.zone_effect = zone_effect;
        self.zone_state = ZoneEffectState::default();
        self.cycle_pause = PauseState::default();
        self.has_reached_start = self.current_step <= self.start_step;
        self.moving_forward = self.current_step < self.target_step;
        self.pending = None;
        self.completed_cycles = 0;
    }

    /// Queue (or, if idle, apply) a new target distance.
    pub fn set_distance(&mut self, mm: f64, total_distance_mm: f64, running: bool) {
        let shadow = self.pending.get_or_insert(self.config);
        shadow.target_distance_mm = mm.clamp(0.0, (total_distance_mm - shadow.start_position_mm).max(0.0));
        if !running {
            self.config = self.pending.take().unwrap();
        }
    }

    /// Queue (or, if idle, apply) a new start position.
    pub fn set_start_position(&mut self, mm: f64, total_distance_mm: f64, running: bool) {
        let shadow = self.pending.get_or_insert(self.config);
        shadow.start_position_mm = mm.clamp(0.0, total_distance_mm);
        shadow.target_distance_mm = shadow
            .target_distance_mm
            .min((total_distance_mm - shadow.start_position_mm).max(0.0));
        if !running {
            self.config = self.pending.take().unwrap();
        }
    }

    /// Queue (or, if idle, apply) a new forward speed.
    pub fn set_speed_forward(&mut self, level: f64, running: bool) {
        let shadow = self.pending.get_or_insert(self.config);
        shadow.speed_forward = level;
        if !running {
            self.config = self.pending.take().unwrap();
        }
    }

    /// Queue (or, if idle, apply) a new backward speed.
    pub fn set_speed_backward(&mut self, level: f64, running: bool) {
        let shadow = self.pending.get_or_insert(self.config);
        shadow.speed_backward = level;
        if !running {
            self.config = self.pending.take().unwrap();
        }
    }

    /// Queue (or, if idle, apply) a new cycle-pause configuration.
    pub fn set_cycle_pause(&mut self, cfg: CyclePauseConfig, running: bool) {
        let shadow = self.pending.get_or_insert(self.config);
        shadow.cycle_pause = cfg;
        if !running {
            self.config = self.pending.take().unwrap();
        }
    }

    /// Replace the zone-effect configuration, taking effect on the next tick.
    pub fn set_zone_effect(&mut self, zone_effect: ZoneEffectConfig) {
        self.zone_effect = zone_effect;
        self.zone_state = ZoneEffectState::default();
    }

    fn base_delay_us(&self, steps_per_mm: f64, max_level: f64, step_exec_us: f64, comp: f64) -> u32 {
        let (distance, level) = if self.moving_forward {
            (self.config.target_distance_mm, self.config.speed_forward)
        } else {
            (self.config.target_distance_mm, self.config.speed_backward)
        };
        motion_math::vaet_step_delay_us(distance, level, steps_per_mm, max_level, step_exec_us, comp)
    }

    /// Advance the zone-effect speed factor and possibly roll/apply a
    /// random turnback, for the given progress into an active zone.
    fn zone_factor_and_turnback(&mut self, progress_into_zone: f64, now_ms: u64) -> (f64, bool) {
        if !self.zone_state.has_rolled && self.zone_effect.turnback.enabled && progress_into_zone < 2.0 / self.zone_effect.zone_mm.max(1e-6) {
            self.zone_state.has_rolled = true;
            let roll: u8 = self.rng.gen_range(0..100);
            if roll < self.zone_effect.turnback.chance_percent {
                let frac = self.rng.gen_range(0.1..=0.9);
                self.zone_state.turnback_point_mm = frac * self.zone_effect.zone_mm;
                self.zone_state.has_pending_turnback = true;
            }
        }
        let factor = motion_math::zone_speed_factor(
            self.zone_effect.speed_effect,
            self.zone_effect.speed_curve,
            self.zone_effect.intensity,
            progress_into_zone.clamp(0.0, 1.0),
        );
        let distance_into_zone_mm = progress_into_zone * self.zone_effect.zone_mm;
        let reverse_now = self.zone_state.has_pending_turnback
            && distance_into_zone_mm >= self.zone_state.turnback_point_mm;
        if reverse_now {
            self.zone_state.has_pending_turnback = false;
            if self.zone_effect.end_pause.enabled {
                let dur = self.zone_effect.end_pause.duration_ms(&mut self.rng);
                self.zone_state.pause.begin(now_ms, dur);
            }
        }
        (factor, reverse_now)
    }

    /// Run one tick. At most one step is emitted.
    pub fn process<M: StepSink, C: DriftSensor>(
        &mut self,
        ctx: &mut MotionContext<M, C>,
        stats: &mut StatsTracking,
    ) -> VaetEvent {
        if self.cycle_pause.is_pausing {
            if self.cycle_pause.poll(ctx.now_ms) {
                self.moving_forward = true;
            } else {
                return VaetEvent::None;
            }
        }
        if self.zone_state.pause.is_pausing {
            if !self.zone_state.pause.poll(ctx.now_ms) {
                return VaetEvent::None;
            }
        }

        let steps_per_mm = ctx.cfg.steps_per_mm;
        let mut delay = self.base_delay_us(
            steps_per_mm,
            ctx.cfg.max_speed_level,
            ctx.cfg.step_execution_time_us,
            ctx.cfg.speed_compensation_factor,
        );
        let mut reverse_from_turnback = false;

        if self.zone_effect.enable_start || self.zone_effect.enable_end {
            if self.has_reached_start {
                let pos_mm = motion_math::steps_to_mm(self.current_step - self.start_step, steps_per_mm);
                let distance_mm = motion_math::steps_to_mm(self.target_step - self.start_step, steps_per_mm);
                let (mirror_start, mirror_end) = if self.zone_effect.mirror_on_return && !self.moving_forward {
                    (self.zone_effect.enable_end, self.zone_effect.enable_start)
                } else {
                    (self.zone_effect.enable_start, self.zone_effect.enable_end)
                };
                let mut factors: HVec<f64, 2> = HVec::new();
                if mirror_start && pos_mm < self.zone_effect.zone_mm {
                    let progress = pos_mm / self.zone_effect.zone_mm.max(1e-6);
                    let (f, rev) = self.zone_factor_and_turnback(progress, ctx.now_ms);
                    let _ = factors.push(f);
                    reverse_from_turnback |= rev;
                }
                if mirror_end && (distance_mm - pos_mm) < self.zone_effect.zone_mm {
                    let progress = (distance_mm - pos_mm) / self.zone_effect.zone_mm.max(1e-6);
                    let (f, rev) = self.zone_factor_and_turnback(progress, ctx.now_ms);
                    let _ = factors.push(f);
                    reverse_from_turnback |= rev;
                }
                if !factors.is_empty() {
                    let factor = match self.zone_effect.speed_effect {
                        SpeedEffect::Decel => factors.iter().cloned().fold(f64::MIN, f64::max),
                        SpeedEffect::Accel => factors.iter().cloned().fold(f64::MAX, f64::min),
                        SpeedEffect::None => 1.0,
                    };
                    delay = (delay as f64 * factor).round().max(motion_math::MIN_STEP_DELAY_US as f64) as u32;
                }
            }
        }

        if ctx.now_us.saturating_sub(self.last_step_us) < delay as u64 {
            return VaetEvent::None;
        }

        if reverse_from_turnback {
            self.moving_forward = !self.moving_forward;
            self.zone_state.has_rolled = false;
            self.last_step_us = ctx.now_us;
            return VaetEvent::None;
        }

        let test_zone = ctx.hard_drift_test_zone_steps();
        if self.moving_forward {
            if ctx.contacts.hard_drift_end(self.current_step, ctx.max_step, test_zone) {
                return VaetEvent::SafetyFault;
            }
            if let Some(corrected) = check_and_correct_drift_end(self.current_step, ctx.max_step, ctx.cfg.soft_drift_buffer_steps)
            {
                self.current_step = corrected;
                self.moving_forward = false;
                self.zone_state = ZoneEffectState::default();
                self.last_step_us = ctx.now_us;
                return VaetEvent::None;
            }
            if self.current_step + 1 > self.target_step {
                self.moving_forward = false;
                self.zone_state = ZoneEffectState::default();
                self.last_step_us = ctx.now_us;
                return VaetEvent::None;
            }
            let _ = ctx.motor.step_in(Direction::Forward);
            self.current_step += 1;
        } else {
            if ctx.contacts.hard_drift_start(self.current_step, ctx.min_step, test_zone) {
                return VaetEvent::SafetyFault;
            }
            if let Some(corrected) = check_and_correct_drift_start(self.current_step, ctx.min_step, ctx.cfg.soft_drift_buffer_steps)
            {
                self.current_step = corrected;
                self.moving_forward = true;
                self.zone_state = ZoneEffectState::default();
                self.last_step_us = ctx.now_us;
                return VaetEvent::None;
            }
            if self.current_step - 1 < self.start_step {
                return self.complete_cycle(ctx.now_ms);
            }
            let _ = ctx.motor.step_in(Direction::Backward);
            self.current_step -= 1;
        }
        self.last_step_us = ctx.now_us;
        stats.track_delta(self.current_step);
        if self.current_step <= self.start_step + ctx.cfg.was_at_start_threshold_steps {
            self.has_reached_start = true;
        }
        VaetEvent::Stepped
    }

    fn complete_cycle(&mut self, now_ms: u64) -> VaetEvent {
        if let Some(pending) = self.pending.take() {
            self.config = pending;
        }
        self.has_reached_start = true;
        self.completed_cycles += 1;
        if self.config.cycle_pause.enabled {
            let dur = self.config.cycle_pause.duration_ms(&mut self.rng);
            self.cycle_pause.begin(now_ms, dur);
        } else {
            self.moving_forward = true;
        }
        VaetEvent::CycleComplete
    }
}
