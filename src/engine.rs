//! Engine aggregate: owns every subsystem by value and exposes the two
//! entry points a host loop needs — [`Engine::process`] (one tick) and
//! [`Engine::handle_command`] (one decoded [`Command`]).
//!
//! Grounded on the teacher's `cycle.rs` three-phase cycle body (read →
//! process → write) minus its RT-scheduling syscalls: there is no SHM
//! boundary here, so "read" and "write" collapse into the motor/contacts
//! calls each controller's `process()` already makes through a
//! [`MotionContext`]. Each controller tracks its own `current_step`
//! independently; `Engine` keeps a single `last_known_step` refreshed from
//! whichever controller just ran, and reseeds the next controller from it
//! whenever a movement hands off to another (a fresh `VaetController`,
//! `OscillationController`, etc. built at that position) — this is the
//! "explicit ownership" redesign's concrete position-continuity story.
//!
//! `MotionContext` values are built inline at each tick/command call site
//! from named `self` fields rather than through a shared helper: a helper
//! taking `&mut self` would borrow the whole struct for the context's
//! lifetime and block the sibling `&mut self.<controller>` borrow every
//! tick also needs.

use serde::Serialize;

use crate::calibration::{Calibrator, HomingTickResult};
use crate::chaos::patterns::ChaosPattern;
use crate::chaos::{ChaosConfig, ChaosController, ChaosEvent};
use crate::command::{Command, CyclePauseTarget};
use crate::config::EngineConfig;
use crate::contacts::DriftSensor;
use crate::context::MotionContext;
use crate::error::EngineError;
use crate::motion_math;
use crate::motor::StepSink;
use crate::oscillation::{OscillationConfig, OscillationController, OscillationEvent};
use crate::platform::MicrosClock;
use crate::pursuit::{PursuitController, PursuitEvent};
use crate::sequencer::{SequenceExecutionState, SequenceLineParams, Sequencer, SequencerEvent};
use crate::stats::StatsTracking;
use crate::state::{ExecutionContext, MovementType, SystemState};
use crate::supervisor::Supervisor;
use crate::vaet::{CyclePauseConfig, MotionConfig, VaetController, VaetEvent, ZoneEffectConfig};

/// A point-in-time readout assembled under the shared-state lock in a
/// multi-core deployment; here just a plain snapshot of `Engine`'s fields.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub system_state: SystemState,
    pub movement_type: Option<MovementType>,
    pub execution_context: ExecutionContext,
    pub current_position_mm: f64,
    pub effective_max_distance_mm: f64,
    pub total_distance_mm: f64,
    pub active_vaet_config: Option<MotionConfig>,
    pub vaet_cycles_completed: u32,
    pub oscillation_cycles_completed: u32,
    pub chaos_active_pattern: Option<ChaosPattern>,
    pub sequence_state: SequenceExecutionState,
    pub stats: StatsTracking,
}

/// Owns the motor, contacts, clock, and every motion controller; the sole
/// thing a host loop needs to drive the axis.
pub struct Engine<M: StepSink, C: DriftSensor, Clk: MicrosClock> {
    motor: M,
    contacts: C,
    clock: Clk,
    cfg: EngineConfig,
    supervisor: Supervisor,

    total_distance_mm: f64,
    last_known_step: i64,
    recovering: bool,
    pending_after_calibration: Option<Command>,

    vaet: VaetController,
    oscillation: OscillationController,
    chaos: ChaosController,
    pursuit: PursuitController,
    calibrator: Calibrator,
    sequencer: Sequencer,
    stats: StatsTracking,

    vaet_zone_effect: ZoneEffectConfig,
    osc_staged: OscillationConfig,
    chaos_staged: ChaosConfig,
    pursuit_max_level: f64,
}

impl<M: StepSink, C: DriftSensor, Clk: MicrosClock> Engine<M, C, Clk> {
    /// Construct an engine in `Init`, with an unknown (zero) travel length.
    pub fn new(motor: M, contacts: C, clock: Clk, cfg: EngineConfig) -> Self {
        Self {
            motor,
            contacts,
            clock,
            pursuit_max_level: cfg.max_speed_level,
            cfg,
            supervisor: Supervisor::new(),
            total_distance_mm: 0.0,
            last_known_step: 0,
            recovering: false,
            pending_after_calibration: None,
            vaet: VaetController::new(0, 0),
            oscillation: OscillationController::new(0),
            chaos: ChaosController::new(0),
            pursuit: PursuitController::new(0),
            calibrator: Calibrator::new(),
            sequencer: Sequencer::new(),
            stats: StatsTracking::default(),
            vaet_zone_effect: ZoneEffectConfig::default(),
            osc_staged: OscillationConfig::default(),
            chaos_staged: ChaosConfig::default(),
        }
    }

    /// Current top-level state.
    pub fn state(&self) -> SystemState {
        self.supervisor.state()
    }

    /// The last step position reported by whichever controller ran most
    /// recently. Exposed for host loops that must drive simulated limit
    /// contacts in lockstep with homing (real contacts are wired directly
    /// to hardware and need no such coupling).
    pub fn last_known_step(&self) -> i64 {
        self.last_known_step
    }

    /// The calibration state machine's current phase, meaningful only while
    /// [`Self::state`] is `Calibrating`.
    pub fn calibrator_phase(&self) -> crate::calibration::HomingPhase {
        self.calibrator.phase()
    }

    fn min_step(&self) -> i64 {
        0
    }

    fn effective_max_distance_mm(&self) -> f64 {
        self.total_distance_mm * self.cfg.limit_percent
    }

    fn max_step(&self) -> i64 {
        motion_math::mm_to_steps(self.effective_max_distance_mm(), self.cfg.steps_per_mm)
    }

    /// A full snapshot of engine state, suitable for `GET_STATUS`.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            system_state: self.supervisor.state(),
            movement_type: self.supervisor.movement(),
            execution_context: self.supervisor.context(),
            current_position_mm: motion_math::steps_to_mm(self.last_known_step, self.cfg.steps_per_mm),
            effective_max_distance_mm: self.effective_max_distance_mm(),
            total_distance_mm: self.total_distance_mm,
            active_vaet_config: matches!(self.supervisor.movement(), Some(MovementType::Vaet))
                .then(|| self.vaet.config()),
            vaet_cycles_completed: self.vaet.completed_cycles(),
            oscillation_cycles_completed: self.oscillation.completed_cycles(),
            chaos_active_pattern: self.chaos.active_pattern(),
            sequence_state: self.sequencer.state(),
            stats: self.stats,
        }
    }

    /// The current sequence program, in order.
    pub fn export_sequence(&self) -> &[crate::sequencer::SequenceLine] {
        self.sequencer.export()
    }

    // ---- tick ------------------------------------------------------

    /// Run one scheduling tick. Emits at most one step.
    pub fn process(&mut self) {
        if self.recovering {
            self.tick_recovery();
            return;
        }
        match self.supervisor.state() {
            SystemState::Calibrating => self.tick_calibration(),
            SystemState::Running => self.tick_running(),
            _ => {}
        }
    }

    fn tick_recovery(&mut self) {
        let (min, max) = (self.min_step(), self.max_step());
        let now_us = self.clock.now_us();
        let now_ms = self.clock.now_ms();
        let mut ctx = MotionContext::new(&mut self.motor, &mut self.contacts, now_us, now_ms, &self.cfg, min, max);
        let event = self.pursuit.process(&mut ctx, &mut self.stats);
        self.last_known_step = self.pursuit.current_step();
        match event {
            PursuitEvent::Arrived => {
                self.recovering = false;
                let _ = self.supervisor.recover_to_ready();
            }
            PursuitEvent::SafetyFault => {
                self.recovering = false;
                self.supervisor.safety_fault("hard drift while returning to start");
            }
            _ => {}
        }
    }

    fn tick_calibration(&mut self) {
        let steps_per_mm = self.cfg.steps_per_mm;
        let safety_offset = self.cfg.safety_offset_steps;
        let now_us = self.clock.now_us();
        let now_ms = self.clock.now_ms();
        let mut ctx =
            MotionContext::new(&mut self.motor, &mut self.contacts, now_us, now_ms, &self.cfg, i64::MIN, i64::MAX);
        match self.calibrator.tick(&mut ctx, steps_per_mm, safety_offset) {
            HomingTickResult::Success { total_distance_mm } => {
                self.total_distance_mm = total_distance_mm;
                self.last_known_step = self.calibrator.current_step();
                let _ = self.supervisor.calibration_complete();
                if let Some(cmd) = self.pending_after_calibration.take() {
                    let _ = self.handle_command(cmd);
                }
            }
            HomingTickResult::Failed => {
                let _ = self.supervisor.calibration_failed();
                self.pending_after_calibration = None;
            }
            HomingTickResult::InProgress => {
                self.last_known_step = self.calibrator.current_step();
            }
        }
    }

    fn tick_running(&mut self) {
        let now_ms = self.clock.now_ms();
        let now_us = self.clock.now_us();

        if self.sequencer.state().is_waiting_pause {
            match self.sequencer.poll_pause(now_ms) {
                SequencerEvent::AdvancedTo(_) | SequencerEvent::Looped => {
                    let _ = self.activate_current_sequence_line();
                }
                SequencerEvent::ProgramComplete => {
                    let _ = self.supervisor.stop();
                }
                SequencerEvent::None | SequencerEvent::RepeatLine | SequencerEvent::Pausing => {}
            }
            return;
        }

        let (min, max) = (self.min_step(), self.max_step());
        let in_sequence = self.supervisor.context() == ExecutionContext::Sequencer;

        match self.supervisor.movement() {
            Some(MovementType::Vaet) => {
                let mut ctx =
                    MotionContext::new(&mut self.motor, &mut self.contacts, now_us, now_ms, &self.cfg, min, max);
                let event = self.vaet.process(&mut ctx, &mut self.stats);
                self.last_known_step = self.vaet.current_step();
                match event {
                    VaetEvent::SafetyFault => self.supervisor.safety_fault("hard drift during VAET motion"),
                    VaetEvent::CycleComplete if in_sequence => self.advance_sequence(now_ms, now_us),
                    _ => {}
                }
            }
            Some(MovementType::Oscillation) => {
                let mut ctx =
                    MotionContext::new(&mut self.motor, &mut self.contacts, now_us, now_ms, &self.cfg, min, max);
                let event = self.oscillation.process(&mut ctx, &mut self.stats);
                self.last_known_step = self.oscillation.current_step();
                match event {
                    OscillationEvent::SafetyFault => {
                        self.supervisor.safety_fault("hard drift during oscillation")
                    }
                    OscillationEvent::CycleComplete | OscillationEvent::Finished if in_sequence => {
                        self.advance_sequence(now_ms, now_us)
                    }
                    OscillationEvent::Finished => {
                        let _ = self.supervisor.stop();
                    }
                    _ => {}
                }
            }
            Some(MovementType::Chaos) => {
                let mut ctx =
                    MotionContext::new(&mut self.motor, &mut self.contacts, now_us, now_ms, &self.cfg, min, max);
                let event = self.chaos.process(&mut ctx, &mut self.stats);
                self.last_known_step = self.chaos.current_step();
                match event {
                    ChaosEvent::SafetyFault => self.supervisor.safety_fault("hard drift during chaos run"),
                    ChaosEvent::Finished if in_sequence => self.advance_sequence(now_ms, now_us),
                    ChaosEvent::Finished => {
                        let _ = self.supervisor.stop();
                    }
                    _ => {}
                }
            }
            Some(MovementType::Pursuit) => {
                // A standalone PURSUIT_MOVE's requested speed cap only binds
                // this controller's own context, never the engine-wide cfg.
                let mut pursuit_cfg = self.cfg;
                pursuit_cfg.max_speed_level = self.pursuit_max_level.min(self.cfg.max_speed_level);
                let mut ctx = MotionContext::new(
                    &mut self.motor,
                    &mut self.contacts,
                    now_us,
                    now_ms,
                    &pursuit_cfg,
                    min,
                    max,
                );
                let event = self.pursuit.process(&mut ctx, &mut self.stats);
                self.last_known_step = self.pursuit.current_step();
                if event == PursuitEvent::SafetyFault {
                    self.supervisor.safety_fault("hard drift during pursuit move");
                }
            }
            Some(MovementType::Calibration) | None => {}
        }
    }

    /// Notify the sequencer one line-iteration finished and react to the result.
    fn advance_sequence(&mut self, now_ms: u64, now_us: u64) {
        match self.sequencer.on_cycle_complete(now_ms) {
            SequencerEvent::RepeatLine => {
                if self.supervisor.movement() == Some(MovementType::Chaos) {
                    self.restart_chaos_line(now_ms, now_us);
                }
            }
            SequencerEvent::AdvancedTo(_) | SequencerEvent::Looped => {
                let _ = self.activate_current_sequence_line();
            }
            SequencerEvent::ProgramComplete => {
                let _ = self.supervisor.stop();
            }
            SequencerEvent::None | SequencerEvent::Pausing => {}
        }
    }

    fn restart_chaos_line(&mut self, now_ms: u64, now_us: u64) {
        if let Some(line) = self.sequencer.current_line() {
            if let SequenceLineParams::Chaos(cfg) = line.params.clone() {
                self.chaos.start(cfg, now_ms, now_us, self.cfg.max_speed_level);
            }
        }
    }

    /// Build and activate the controller for the sequencer's current line,
    /// continuing from [`Self::last_known_step`]. Vaet and Oscillation
    /// repeat their own cycles automatically once started; Chaos has no
    /// internal repeat once `Finished`, so a sequencer repeat of a chaos
    /// line goes through [`Self::restart_chaos_line`] instead.
    fn activate_current_sequence_line(&mut self) -> Result<(), EngineError> {
        let now_ms = self.clock.now_ms();
        let now_us = self.clock.now_us();
        let steps_per_mm = self.cfg.steps_per_mm;
        let max_speed_level = self.cfg.max_speed_level;
        let last_known = self.last_known_step;
        let total_distance_mm = self.total_distance_mm;

        let line = self
            .sequencer
            .current_line()
            .cloned()
            .ok_or_else(|| EngineError::ConfigInvalid("no active sequence line".into()))?;

        match line.params {
            SequenceLineParams::Vaet(cfg) => {
                self.vaet = VaetController::new(last_known, now_us);
                self.vaet.start(cfg, self.vaet_zone_effect, total_distance_mm, steps_per_mm);
                self.supervisor.set_active_movement(MovementType::Vaet);
            }
            SequenceLineParams::Oscillation(mut cfg) => {
                cfg.cycle_count = 0;
                self.oscillation = OscillationController::with_seed(last_known, now_us);
                self.oscillation.start(cfg, now_ms);
                self.supervisor.set_active_movement(MovementType::Oscillation);
            }
            SequenceLineParams::Chaos(cfg) => {
                self.chaos = ChaosController::new(last_known);
                self.chaos.start(cfg, now_ms, now_us, max_speed_level);
                self.supervisor.set_active_movement(MovementType::Chaos);
            }
        }
        Ok(())
    }

    fn vaet_is_active(&self) -> bool {
        matches!(self.supervisor.state(), SystemState::Running | SystemState::Paused)
            && self.supervisor.movement() == Some(MovementType::Vaet)
    }

    /// Stop whatever standalone or sequenced movement is currently active,
    /// if any (invariant 7, §3: a new standalone movement always implicitly
    /// stops a prior one).
    fn stop_active_movement(&mut self) -> Result<(), EngineError> {
        if matches!(self.supervisor.context(), ExecutionContext::Sequencer) {
            self.sequencer.stop();
        }
        self.supervisor.stop()
    }

    // ---- commands ----------------------------------------------------

    /// Handle one decoded command.
    pub fn handle_command(&mut self, cmd: Command) -> Result<(), EngineError> {
        if crate::command::requires_calibration(&cmd) && self.total_distance_mm <= 0.0 {
            // Auto-trigger homing instead of refusing outright; the command
            // itself is replayed once calibration succeeds, and dropped if
            // it fails (§7, "Not calibrated").
            if self.supervisor.state() != SystemState::Calibrating {
                self.supervisor.begin_calibration()?;
                self.calibrator = Calibrator::new();
                self.calibrator.start();
            }
            self.pending_after_calibration = Some(cmd);
            return Ok(());
        }
        // A repeated PURSUIT_MOVE while already pursuing is a target update
        // to the same movement, not a request to start a new one.
        let already_pursuing =
            matches!(cmd, Command::PursuitMove { .. }) && self.supervisor.movement() == Some(MovementType::Pursuit);
        if crate::command::starts_movement(&cmd)
            && !already_pursuing
            && matches!(self.supervisor.state(), SystemState::Running | SystemState::Paused)
        {
            self.stop_active_movement()?;
        }

        match cmd {
            Command::SyncTime { .. } => Ok(()),
            Command::GetStatus => Ok(()),

            Command::SetDistance { mm } => {
                let running = self.vaet_is_active();
                self.vaet.set_distance(mm, self.total_distance_mm, running);
                Ok(())
            }
            Command::SetStartPosition { mm } => {
                let running = self.vaet_is_active();
                self.vaet.set_start_position(mm, self.total_distance_mm, running);
                Ok(())
            }
            Command::SetSpeedForward { level } => {
                let running = self.vaet_is_active();
                self.vaet.set_speed_forward(level, running);
                Ok(())
            }
            Command::SetSpeedBackward { level } => {
                let running = self.vaet_is_active();
                self.vaet.set_speed_backward(level, running);
                Ok(())
            }
            Command::Start { distance_mm, level } => {
                let mut cfg = self.vaet.config();
                cfg.target_distance_mm = distance_mm;
                cfg.speed_forward = level;
                cfg.speed_backward = level;
                let last_known = self.last_known_step;
                self.vaet = VaetController::new(last_known, self.clock.now_us());
                self.vaet.start(cfg, self.vaet_zone_effect, self.total_distance_mm, self.cfg.steps_per_mm);
                self.supervisor.start_movement(MovementType::Vaet, ExecutionContext::Standalone)
            }
            Command::Stop => self.stop_active_movement(),
            Command::Pause => {
                let was_paused = self.supervisor.state() == SystemState::Paused;
                self.supervisor.toggle_pause()?;
                if was_paused {
                    // Resuming: rebase the oscillation phase clock so the
                    // elapsed pause time doesn't register as a jump in phase.
                    if self.supervisor.movement() == Some(MovementType::Oscillation) {
                        self.oscillation.rebase_phase_clock(self.clock.now_ms());
                    }
                } else {
                    self.stats.mark_saved();
                }
                Ok(())
            }

            Command::SetOscillation { config } => {
                config
                    .validate_amplitude(self.effective_max_distance_mm())
                    .map_err(EngineError::ConfigInvalid)?;
                self.osc_staged = config;
                Ok(())
            }
            Command::StartOscillation => {
                let last_known = self.last_known_step;
                self.oscillation = OscillationController::new(last_known);
                self.oscillation.start(self.osc_staged, self.clock.now_ms());
                self.supervisor.start_movement(MovementType::Oscillation, ExecutionContext::Standalone)
            }
            Command::StopOscillation => self.stop_active_movement(),

            Command::SetChaos { config } => {
                self.chaos_staged = config;
                Ok(())
            }
            Command::StartChaos => {
                if self.chaos_staged.enabled_patterns.is_empty() {
                    return Err(EngineError::ConfigInvalid("no chaos patterns enabled".into()));
                }
                let last_known = self.last_known_step;
                self.chaos = ChaosController::new(last_known);
                self.chaos.start(
                    self.chaos_staged.clone(),
                    self.clock.now_ms(),
                    self.clock.now_us(),
                    self.cfg.max_speed_level,
                );
                self.supervisor.start_movement(MovementType::Chaos, ExecutionContext::Standalone)
            }
            Command::StopChaos => self.stop_active_movement(),

            Command::SetCyclePause { target, config } => {
                match target {
                    CyclePauseTarget::Vaet => {
                        let running = self.vaet_is_active();
                        self.vaet.set_cycle_pause(config, running);
                    }
                    CyclePauseTarget::Oscillation => self.oscillation.set_cycle_pause(config),
                }
                Ok(())
            }
            Command::SetZoneEffect { config } => {
                self.vaet_zone_effect = config;
                if self.supervisor.movement() == Some(MovementType::Vaet) {
                    self.vaet.set_zone_effect(config);
                }
                Ok(())
            }

            Command::SeqAdd { line } => self.sequencer.add(line),
            Command::SeqUpdate { id, line } => self.sequencer.update(id, line),
            Command::SeqDelete { id } => self.sequencer.delete(id),
            Command::SeqMove { id, new_index } => self.sequencer.move_line(id, new_index),
            Command::SeqDuplicate { id } => self.sequencer.duplicate(id),
            Command::SeqClear => {
                self.sequencer.clear();
                Ok(())
            }
            Command::SeqImport { lines } => self.sequencer.import(&lines),
            Command::SeqExport => Ok(()), // caller reads back via `export_sequence`

            Command::SeqStart { loop_mode } => {
                self.sequencer.start(loop_mode)?;
                let movement = self
                    .sequencer
                    .current_line()
                    .map(|l| l.params.movement_type())
                    .ok_or_else(|| EngineError::ConfigInvalid("no active sequence line".into()))?;
                self.supervisor.start_movement(movement, ExecutionContext::Sequencer)?;
                self.activate_current_sequence_line()
            }
            Command::SeqStop => {
                self.sequencer.stop();
                self.supervisor.stop()
            }

            Command::PursuitMove { target_mm, max_level } => {
                if !already_pursuing {
                    let last_known = self.last_known_step;
                    self.pursuit = PursuitController::new(last_known);
                    self.supervisor.start_movement(MovementType::Pursuit, ExecutionContext::Standalone)?;
                }
                self.pursuit_max_level = max_level.min(self.cfg.max_speed_level);
                self.pursuit.set_target_mm(target_mm, self.cfg.steps_per_mm, self.min_step(), self.max_step());
                Ok(())
            }
            Command::ReturnToStart => {
                let last_known = self.last_known_step;
                self.pursuit = PursuitController::new(last_known);
                self.pursuit.set_target_step(0, i64::MIN, i64::MAX);
                self.recovering = true;
                Ok(())
            }
            Command::Calibrate => {
                self.supervisor.begin_calibration()?;
                self.calibrator = Calibrator::new();
                self.calibrator.start();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::HomingPhase;
    use crate::contacts::ContactSensors;
    use crate::motor::MotorDriver;
    use crate::sim::{SimClock, SimContact, SimDelay, SimPin};
    use std::rc::Rc;

    type TestMotor<'a> = MotorDriver<SimPin, SimPin, SimPin, SimDelay<'a>>;
    type TestContacts<'a> = ContactSensors<SimPin, SimPin, SimDelay<'a>>;

    struct Harness {
        clock: Rc<SimClock>,
        start: SimContact,
        end: SimContact,
    }

    fn harness() -> Harness {
        Harness {
            clock: Rc::new(SimClock::default()),
            start: SimContact::default(),
            end: SimContact::default(),
        }
    }

    // `SimClock`/`SimDelay` borrow the clock by reference, and `Engine` is
    // generic over any `MicrosClock`, so the test harness wraps the clock
    // cell in an `Rc` and implements `MicrosClock` for a thin handle type
    // that derefs into it, letting `Engine` own a `Clone`-able clock handle
    // while `SimDelay` instances elsewhere in the same test borrow the same
    // underlying cell.
    #[derive(Clone)]
    struct ClockHandle(Rc<SimClock>);
    impl MicrosClock for ClockHandle {
        fn now_us(&self) -> u64 {
            self.0.now_us()
        }
    }

    fn build_engine(h: &Harness) -> Engine<TestMotor<'_>, TestContacts<'_>, ClockHandle> {
        let motor = MotorDriver::init(
            SimPin::default(),
            SimPin::default(),
            SimPin::default(),
            SimDelay(&h.clock),
        )
        .unwrap();
        let contacts = ContactSensors::new(h.start.pin.clone(), h.end.pin.clone(), SimDelay(&h.clock));
        Engine::new(motor, contacts, ClockHandle(h.clock.clone()), EngineConfig::default())
    }

    fn tick_until_calibrated(engine: &mut Engine<TestMotor<'_>, TestContacts<'_>, ClockHandle>, h: &Harness) {
        for _ in 0..300_000 {
            if engine.last_known_step <= -500 && !matches!(engine.calibrator.phase(), HomingPhase::LeavingStart) {
                h.start.press();
            }
            if engine.last_known_step >= 2_000 && matches!(engine.calibrator.phase(), HomingPhase::MovingToEnd) {
                h.end.press();
            }
            h.clock.advance(50);
            engine.process();
            if matches!(engine.calibrator.phase(), HomingPhase::LeavingStart) {
                h.start.release();
            }
            if matches!(engine.calibrator.phase(), HomingPhase::LeavingEnd) {
                h.end.release();
            }
            if engine.state() != SystemState::Calibrating {
                break;
            }
        }
    }

    fn run_calibration(engine: &mut Engine<TestMotor<'_>, TestContacts<'_>, ClockHandle>, h: &Harness) {
        engine.handle_command(Command::Calibrate).unwrap();
        tick_until_calibrated(engine, h);
        assert_eq!(engine.state(), SystemState::Ready);
    }

    #[test]
    fn uncalibrated_start_auto_triggers_calibration_then_runs() {
        let h = harness();
        let mut engine = build_engine(&h);
        assert_eq!(engine.state(), SystemState::Init);

        engine.handle_command(Command::Start { distance_mm: 10.0, level: 5.0 }).unwrap();
        assert_eq!(engine.state(), SystemState::Calibrating);

        tick_until_calibrated(&mut engine, &h);
        assert_eq!(engine.state(), SystemState::Running);
        assert_eq!(engine.supervisor.movement(), Some(MovementType::Vaet));
    }

    #[test]
    fn calibrate_then_start_reaches_running() {
        let h = harness();
        let mut engine = build_engine(&h);
        run_calibration(&mut engine, &h);
        assert!(engine.total_distance_mm > 0.0);

        engine.handle_command(Command::Start { distance_mm: 5.0, level: 5.0 }).unwrap();
        assert_eq!(engine.state(), SystemState::Running);
        assert_eq!(engine.supervisor.movement(), Some(MovementType::Vaet));
    }

    #[test]
    fn start_chaos_with_no_enabled_patterns_is_refused() {
        let h = harness();
        let mut engine = build_engine(&h);
        run_calibration(&mut engine, &h);
        engine
            .handle_command(Command::SetChaos {
                config: crate::chaos::ChaosConfig {
                    enabled_patterns: crate::chaos::patterns::EnabledPatterns::empty(),
                    ..Default::default()
                },
            })
            .unwrap();
        let err = engine.handle_command(Command::StartChaos);
        assert!(matches!(err, Err(EngineError::ConfigInvalid(_))));
        assert_ne!(engine.supervisor.movement(), Some(MovementType::Chaos));
    }

    #[test]
    fn pause_saves_stats_immediately() {
        let h = harness();
        let mut engine = build_engine(&h);
        run_calibration(&mut engine, &h);
        engine
            .handle_command(Command::SetOscillation {
                config: OscillationConfig { center_mm: 5.0, amplitude_mm: 2.0, frequency_hz: 1.0, ..Default::default() },
            })
            .unwrap();
        engine.handle_command(Command::StartOscillation).unwrap();
        for _ in 0..20 {
            h.clock.advance(50);
            engine.process();
        }
        assert!(engine.stats.unsaved_steps() > 0, "some steps should be unsaved before pausing");

        engine.handle_command(Command::Pause).unwrap();
        assert_eq!(engine.state(), SystemState::Paused);
        assert_eq!(engine.stats.unsaved_steps(), 0, "pausing should save stats immediately");

        h.clock.advance(10_000);
        engine.handle_command(Command::Pause).unwrap();
        assert_eq!(engine.state(), SystemState::Running);
    }

    #[test]
    fn stop_returns_to_ready() {
        let h = harness();
        let mut engine = build_engine(&h);
        run_calibration(&mut engine, &h);
        engine.handle_command(Command::Start { distance_mm: 5.0, level: 5.0 }).unwrap();
        engine.handle_command(Command::Stop).unwrap();
        assert_eq!(engine.state(), SystemState::Ready);
    }

    #[test]
    fn sequencer_runs_two_lines_then_completes() {
        let h = harness();
        let mut engine = build_engine(&h);
        run_calibration(&mut engine, &h);

        let line = |id| crate::sequencer::SequenceLine {
            id,
            enabled: true,
            params: SequenceLineParams::Vaet(MotionConfig {
                start_position_mm: 0.0,
                target_distance_mm: 1.0,
                speed_forward: 20.0,
                speed_backward: 20.0,
                cycle_pause: CyclePauseConfig::default(),
            }),
            cycle_count: 1,
            pause_after_ms: 0,
        };
        engine.handle_command(Command::SeqAdd { line: line(1) }).unwrap();
        engine.handle_command(Command::SeqAdd { line: line(2) }).unwrap();
        engine.handle_command(Command::SeqStart { loop_mode: false }).unwrap();
        assert_eq!(engine.state(), SystemState::Running);

        for _ in 0..400_000 {
            h.clock.advance(50);
            engine.process();
            if engine.state() == SystemState::Ready {
                break;
            }
        }
        assert_eq!(engine.state(), SystemState::Ready, "sequence should complete and return to Ready");
    }

    #[test]
    fn safety_fault_during_motion_enters_error_and_recovers() {
        let h = harness();
        let mut engine = build_engine(&h);
        run_calibration(&mut engine, &h);
        engine.handle_command(Command::Start { distance_mm: 1000.0, level: 20.0 }).unwrap();

        h.end.press();
        for _ in 0..100_000 {
            h.clock.advance(50);
            engine.process();
            if engine.state() == SystemState::Error {
                break;
            }
        }
        assert_eq!(engine.state(), SystemState::Error);
        h.end.release();

        engine.handle_command(Command::ReturnToStart).unwrap();
        for _ in 0..100_000 {
            h.clock.advance(50);
            engine.process();
            if engine.state() == SystemState::Ready {
                break;
            }
        }
        assert_eq!(engine.state(), SystemState::Ready);
    }

    #[test]
    fn repeated_pursuit_move_does_not_restart_movement() {
        let h = harness();
        let mut engine = build_engine(&h);
        run_calibration(&mut engine, &h);

        engine.handle_command(Command::PursuitMove { target_mm: 5.0, max_level: 10.0 }).unwrap();
        assert_eq!(engine.state(), SystemState::Running);
        assert_eq!(engine.supervisor.movement(), Some(MovementType::Pursuit));

        // A second target update while already pursuing must not bounce
        // through Ready; it only changes where the controller is heading.
        engine.handle_command(Command::PursuitMove { target_mm: 8.0, max_level: 10.0 }).unwrap();
        assert_eq!(engine.state(), SystemState::Running);
        assert_eq!(engine.supervisor.movement(), Some(MovementType::Pursuit));
    }
}
