//! Oscillation controller: continuous waveform motion around a center
//! point, with ramps, inter-cycle pauses, and live transitions of
//! frequency/center/amplitude.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::context::MotionContext;
use crate::contacts::{check_and_correct_drift_end, check_and_correct_drift_start, DriftSensor};
use crate::motion_math::{self, Waveform};
use crate::motor::{Direction, StepSink};
use crate::vaet::{CyclePauseConfig, PauseState};

/// A linear interpolation in progress for one scalar oscillation parameter.
#[derive(Debug, Clone, Copy, Default)]
struct Transition {
    active: bool,
    start_ms: u64,
    duration_ms: u64,
    old: f64,
    target: f64,
}

impl Transition {
    fn begin(&mut self, now_ms: u64, duration_ms: u64, old: f64, target: f64) {
        self.active = true;
        self.start_ms = now_ms;
        self.duration_ms = duration_ms.max(1);
        self.old = old;
        self.target = target;
    }

    fn value(&mut self, now_ms: u64) -> f64 {
        if !self.active {
            return self.target;
        }
        let elapsed = now_ms.saturating_sub(self.start_ms);
        if elapsed >= self.duration_ms {
            self.active = false;
            return self.target;
        }
        let frac = elapsed as f64 / self.duration_ms as f64;
        self.old + (self.target - self.old) * frac
    }
}

/// A one-shot linear ramp from `0.0` to `1.0` (ramp-in) or `1.0` to `0.0`
/// (ramp-out), used to scale amplitude at the start/end of a run.
#[derive(Debug, Clone, Copy, Default)]
struct Ramp {
    active: bool,
    start_ms: u64,
    duration_ms: u64,
    rising: bool,
}

impl Ramp {
    fn begin(&mut self, now_ms: u64, duration_ms: u64, rising: bool) {
        self.active = duration_ms > 0;
        self.start_ms = now_ms;
        self.duration_ms = duration_ms.max(1);
        self.rising = rising;
    }

    /// Returns the scale factor in `[0.0, 1.0]`, clearing `active` once done.
    fn factor(&mut self, now_ms: u64) -> f64 {
        if !self.active {
            return 1.0;
        }
        let elapsed = now_ms.saturating_sub(self.start_ms);
        if elapsed >= self.duration_ms {
            self.active = false;
            return if self.rising { 1.0 } else { 0.0 };
        }
        let frac = elapsed as f64 / self.duration_ms as f64;
        if self.rising {
            frac
        } else {
            1.0 - frac
        }
    }
}

/// Oscillation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillationConfig {
    /// Center position, millimeters from calibrated zero.
    pub center_mm: f64,
    /// Peak deviation from center, millimeters.
    pub amplitude_mm: f64,
    /// Waveform shape.
    pub waveform: Waveform,
    /// Requested frequency, Hz (subject to the speed cap).
    pub frequency_hz: f64,
    /// Ramp-in duration, ms (0 = no ramp).
    pub ramp_in_ms: u64,
    /// Ramp-out duration, ms (0 = no ramp).
    pub ramp_out_ms: u64,
    /// Stop after this many completed cycles (0 = infinite).
    pub cycle_count: u32,
    /// Return to center before stopping.
    pub return_to_center: bool,
    /// Pause inserted after each completed cycle.
    pub cycle_pause: CyclePauseConfig,
}

impl Default for OscillationConfig {
    fn default() -> Self {
        Self {
            center_mm: 0.0,
            amplitude_mm: 0.0,
            waveform: Waveform::Sine,
            frequency_hz: 1.0,
            ramp_in_ms: 0,
            ramp_out_ms: 0,
            cycle_count: 0,
            return_to_center: false,
            cycle_pause: CyclePauseConfig::default(),
        }
    }
}

impl OscillationConfig {
    /// Reject configurations whose travel would exceed `[0, effective_max]`.
    pub fn validate_amplitude(&self, effective_max_mm: f64) -> Result<(), String> {
        if self.center_mm - self.amplitude_mm < 0.0 {
            return Err(format!(
                "center ({:.2}) - amplitude ({:.2}) is below 0",
                self.center_mm, self.amplitude_mm
            ));
        }
        if self.center_mm + self.amplitude_mm > effective_max_mm {
            return Err(format!(
                "center ({:.2}) + amplitude ({:.2}) exceeds effective max ({:.2})",
                self.center_mm, self.amplitude_mm, effective_max_mm
            ));
        }
        Ok(())
    }
}

/// Outcome of one [`OscillationController::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscillationEvent {
    /// Nothing happened this tick.
    None,
    /// One step was emitted.
    Stepped,
    /// A full waveform cycle completed (and a cycle pause began, if configured).
    CycleComplete,
    /// The configured cycle count was reached and the controller stopped.
    Finished,
    /// A limit contact fired.
    SafetyFault,
}

/// Waveform oscillation controller.
pub struct OscillationController {
    config: OscillationConfig,
    current_step: i64,
    accumulated_phase: f64,
    last_phase: f64,
    last_phase_update_ms: u64,
    frequency: Transition,
    center: Transition,
    amplitude: Transition,
    ramp: Ramp,
    is_ramping_out: bool,
    is_returning: bool,
    is_initial_positioning: bool,
    completed_cycles: u32,
    cycle_pause: PauseState,
    rng: StdRng,
    last_step_us: u64,
}

impl OscillationController {
    /// Construct a controller at `current_step`; call [`Self::start`] to begin.
    pub fn new(current_step: i64) -> Self {
        Self::with_seed(current_step, 0xA5_0C_11_7A)
    }

    /// Construct a controller at `current_step` with an explicit RNG seed,
    /// for reproducible cycle-pause durations.
    pub fn with_seed(current_step: i64, seed: u64) -> Self {
        Self {
            config: OscillationConfig::default(),
            current_step,
            accumulated_phase: 0.0,
            last_phase: 0.0,
            last_phase_update_ms: 0,
            frequency: Transition::default(),
            center: Transition::default(),
            amplitude: Transition::default(),
            ramp: Ramp::default(),
            is_ramping_out: false,
            is_returning: false,
            is_initial_positioning: false,
            completed_cycles: 0,
            cycle_pause: PauseState::default(),
            rng: StdRng::seed_from_u64(seed),
            last_step_us: 0,
        }
    }

    /// Current absolute step position.
    pub fn current_step(&self) -> i64 {
        self.current_step
    }

    /// Completed waveform cycle count.
    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    /// Re-anchor the phase clock to `now_ms` without touching accumulated
    /// phase, so a paused run resumes from where it left off instead of
    /// jumping forward by the elapsed pause duration.
    pub fn rebase_phase_clock(&mut self, now_ms: u64) {
        self.last_phase_update_ms = now_ms;
    }

    /// Activate a new oscillation configuration, beginning from an initial
    /// positioning move to `center - amplitude`.
    pub fn start(&mut self, config: OscillationConfig, now_ms: u64) {
        self.completed_cycles = 0;
        self.accumulated_phase = 0.0;
        self.last_phase = 0.0;
        self.last_phase_update_ms = now_ms;
        self.is_ramping_out = false;
        self.is_returning = false;
        self.is_initial_positioning = true;
        self.cycle_pause = PauseState::default();
        self.frequency = Transition::default();
        self.center = Transition::default();
        self.amplitude = Transition::default();
        self.ramp = Ramp::default();
        if config.ramp_in_ms > 0 {
            self.ramp.begin(now_ms, config.ramp_in_ms, true);
        }
        self.config = config;
    }

    /// Queue a live frequency change as a linear transition.
    pub fn set_frequency(&mut self, hz: f64, now_ms: u64, duration_ms: u64) {
        let current = self.frequency.value(now_ms);
        self.frequency.begin(now_ms, duration_ms, current, hz);
    }

    /// Queue a live center change as a linear transition.
    pub fn set_center(&mut self, mm: f64, now_ms: u64, duration_ms: u64) {
        let current = self.center.value(now_ms);
        self.center.begin(now_ms, duration_ms, current, mm);
    }

    /// Queue a live amplitude change as a linear transition.
    pub fn set_amplitude(&mut self, mm: f64, now_ms: u64, duration_ms: u64) {
        let current = self.amplitude.value(now_ms);
        self.amplitude.begin(now_ms, duration_ms, current, mm);
    }

    /// Replace the cycle-pause configuration, applied the next time a cycle completes.
    pub fn set_cycle_pause(&mut self, cfg: CyclePauseConfig) {
        self.config.cycle_pause = cfg;
    }

    fn effective_center(&mut self, now_ms: u64) -> f64 {
        if self.center.active {
            self.center.value(now_ms)
        } else {
            self.config.center_mm
        }
    }

    fn effective_amplitude(&mut self, now_ms: u64) -> f64 {
        let base = if self.amplitude.active {
            self.amplitude.value(now_ms)
        } else {
            self.config.amplitude_mm
        };
        let ramp_factor = if self.ramp.active { self.ramp.factor(now_ms) } else { 1.0 };
        base * ramp_factor
    }

    /// Run one tick. At most one step is emitted.
    pub fn process<M: StepSink, C: DriftSensor>(
        &mut self,
        ctx: &mut MotionContext<M, C>,
        stats: &mut crate::stats::StatsTracking,
    ) -> OscillationEvent {
        if self.cycle_pause.is_pausing {
            if !self.cycle_pause.poll(ctx.now_ms) {
                return OscillationEvent::None;
            }
        }

        let steps_per_mm = ctx.cfg.steps_per_mm;
        let center = self.effective_center(ctx.now_ms);
        let amplitude = self.effective_amplitude(ctx.now_ms);

        let target_mm = if self.is_initial_positioning {
            center - amplitude
        } else if self.is_returning {
            center
        } else {
            let requested_hz = if self.frequency.active {
                self.frequency.value(ctx.now_ms)
            } else {
                self.config.frequency_hz
            };
            let hz = motion_math::cap_oscillation_frequency(requested_hz, amplitude, ctx.cfg.osc_max_speed_mms);
            let dt_ms = ctx.now_ms.saturating_sub(self.last_phase_update_ms);
            self.last_phase_update_ms = ctx.now_ms;
            self.last_phase = self.accumulated_phase;
            self.accumulated_phase += hz * dt_ms as f64 / 1000.0;
            center + amplitude * motion_math::waveform_value(self.config.waveform, self.accumulated_phase)
        };

        let target_step = motion_math::mm_to_steps(target_mm, steps_per_mm);

        if !self.is_initial_positioning && !self.is_returning {
            let prev_cycle = self.last_phase.floor();
            let cur_cycle = self.accumulated_phase.floor();
            if cur_cycle > prev_cycle {
                self.completed_cycles += 1;
                let limit_reached = self.config.cycle_count > 0 && self.completed_cycles >= self.config.cycle_count;
                if limit_reached {
                    if self.config.ramp_out_ms > 0 && !self.is_ramping_out {
                        self.is_ramping_out = true;
                        self.ramp.begin(ctx.now_ms, self.config.ramp_out_ms, false);
                    } else if self.config.return_to_center {
                        self.is_returning = true;
                    } else {
                        return OscillationEvent::Finished;
                    }
                } else if self.config.cycle_pause.enabled {
                    let dur = self.config.cycle_pause.duration_ms(&mut self.rng);
                    self.cycle_pause.begin(ctx.now_ms, dur);
                    return OscillationEvent::CycleComplete;
                }
            }
            if self.is_ramping_out && !self.ramp.active {
                if self.config.return_to_center {
                    self.is_returning = true;
                } else {
                    return OscillationEvent::Finished;
                }
            }
        }

        if self.is_returning && target_step == self.current_step {
            return OscillationEvent::Finished;
        }

        if target_step == self.current_step {
            if self.is_initial_positioning {
                self.is_initial_positioning = false;
                self.last_phase_update_ms = ctx.now_ms;
            }
            return OscillationEvent::None;
        }

        let test_zone = ctx.hard_drift_test_zone_steps();
        let direction = if target_step > self.current_step {
            Direction::Forward
        } else {
            Direction::Backward
        };

        match direction {
            Direction::Forward => {
                if ctx.contacts.hard_drift_end(self.current_step, ctx.max_step, test_zone) {
                    return OscillationEvent::SafetyFault;
                }
                if let Some(c) = check_and_correct_drift_end(self.current_step, ctx.max_step, ctx.cfg.soft_drift_buffer_steps) {
                    self.current_step = c;
                    return OscillationEvent::None;
                }
            }
            Direction::Backward => {
                if ctx.contacts.hard_drift_start(self.current_step, ctx.min_step, test_zone) {
                    return OscillationEvent::SafetyFault;
                }
                if let Some(c) = check_and_correct_drift_start(self.current_step, ctx.min_step, ctx.cfg.soft_drift_buffer_steps) {
                    self.current_step = c;
                    return OscillationEvent::None;
                }
            }
        }

        let _ = ctx.motor.step_in(direction);
        self.current_step += if direction == Direction::Forward { 1 } else { -1 };
        self.last_step_us = ctx.now_us;
        stats.track_delta(self.current_step);

        if self.is_initial_positioning && self.current_step == target_step {
            self.is_initial_positioning = false;
            self.last_phase_update_ms = ctx.now_ms;
        }

        OscillationEvent::Stepped
    }
}
