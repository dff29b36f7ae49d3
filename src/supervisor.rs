//! Dispatch and safety supervision: owns `SystemState`, the active
//! `MovementType`, and `ExecutionContext` and is the only thing allowed
//! to apply a [`SystemEvent`].
//!
//! Grounded on the teacher's `safety::stop::SafeStopExecutor`: a small
//! typed wrapper around a phase/state value with `trigger`/`tick`-shaped
//! methods, rather than the motion core reaching into global state
//! directly. Here the "phase" is the top-level `SystemState` machine of
//! `state.rs`.

use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::state::{self, ExecutionContext, MovementType, SystemEvent, SystemState, TransitionResult};

/// Owns the top-level state machine and the currently active movement.
pub struct Supervisor {
    state: SystemState,
    movement: Option<MovementType>,
    context: ExecutionContext,
}

impl Supervisor {
    /// Construct a supervisor in `Init`, with no active movement.
    pub fn new() -> Self {
        Self {
            state: SystemState::Init,
            movement: None,
            context: ExecutionContext::Standalone,
        }
    }

    /// Current top-level state.
    pub fn state(&self) -> SystemState {
        self.state
    }

    /// Currently active movement, if any.
    pub fn movement(&self) -> Option<MovementType> {
        self.movement
    }

    /// Who is driving the active movement.
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Whether a non-calibration controller may emit steps right now.
    pub fn allows_motion(&self) -> bool {
        state::allows_motion(self.state)
    }

    /// Whether the supervisor is in the sticky fault state.
    pub fn is_error(&self) -> bool {
        state::is_error(self.state)
    }

    fn apply(&mut self, event: SystemEvent) -> Result<SystemState, EngineError> {
        match state::handle_event(self.state, event) {
            TransitionResult::Ok(next) => {
                if next != self.state {
                    info!(from = ?self.state, to = ?next, ?event, "system state transition");
                }
                self.state = next;
                Ok(next)
            }
            TransitionResult::Rejected(reason) => {
                warn!(?event, state = ?self.state, reason, "rejected system event");
                Err(EngineError::Rejected(reason))
            }
        }
    }

    /// Enter `Calibrating`. Disables any other movement.
    pub fn begin_calibration(&mut self) -> Result<(), EngineError> {
        self.apply(SystemEvent::CalibrationStarted)?;
        self.movement = Some(MovementType::Calibration);
        self.context = ExecutionContext::Standalone;
        Ok(())
    }

    /// Calibration succeeded; return to `Ready`.
    pub fn calibration_complete(&mut self) -> Result<(), EngineError> {
        self.apply(SystemEvent::CalibrationComplete)?;
        self.movement = None;
        Ok(())
    }

    /// Calibration's watchdog expired without finding a contact.
    pub fn calibration_failed(&mut self) -> Result<(), EngineError> {
        self.apply(SystemEvent::CalibrationFailed)?;
        self.movement = None;
        error!("calibration failed: contact not found within watchdog");
        Ok(())
    }

    /// Start `movement` under `context`. The caller is responsible for
    /// stopping any previously-active movement first (invariant 7, §3) —
    /// this call only succeeds from `Ready`.
    pub fn start_movement(
        &mut self,
        movement: MovementType,
        context: ExecutionContext,
    ) -> Result<(), EngineError> {
        self.apply(SystemEvent::MotionStarted)?;
        self.movement = Some(movement);
        self.context = context;
        Ok(())
    }

    /// Switch which movement is active without touching `SystemState`, for
    /// the sequencer handing the motor off from one line to the next while
    /// staying `Running`.
    pub fn set_active_movement(&mut self, movement: MovementType) {
        self.movement = Some(movement);
    }

    /// Flip between `Running` and `Paused`.
    pub fn toggle_pause(&mut self) -> Result<(), EngineError> {
        let event = match self.state {
            SystemState::Running => SystemEvent::Paused,
            SystemState::Paused => SystemEvent::Resumed,
            _ => return Err(EngineError::Rejected("no active motion to pause")),
        };
        self.apply(event).map(|_| ())
    }

    /// Drop to `Ready`, clearing the active movement. Idempotent: calling
    /// this when nothing is running is a no-op, per the stop-is-idempotent
    /// propagation policy of §7.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !matches!(self.state, SystemState::Running | SystemState::Paused) {
            return Ok(());
        }
        self.apply(SystemEvent::Stopped)?;
        self.movement = None;
        self.context = ExecutionContext::Standalone;
        Ok(())
    }

    /// A limit contact fired during motion. Sticky `Error`; motor stays
    /// enabled, step emission halts.
    pub fn safety_fault(&mut self, detail: &str) {
        if self.apply(SystemEvent::SafetyFault).is_ok() {
            error!(detail, "safety fault: hard drift, motion halted");
        }
        self.movement = None;
    }

    /// `return_to_start` completed; clears a prior `Error`.
    pub fn recover_to_ready(&mut self) -> Result<(), EngineError> {
        self.apply(SystemEvent::RecoveredToReady)?;
        self.movement = None;
        self.context = ExecutionContext::Standalone;
        Ok(())
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_into_init_with_no_movement() {
        let sup = Supervisor::new();
        assert_eq!(sup.state(), SystemState::Init);
        assert_eq!(sup.movement(), None);
        assert!(!sup.allows_motion());
    }

    #[test]
    fn motion_is_rejected_before_calibration() {
        let mut sup = Supervisor::new();
        assert!(sup.start_movement(MovementType::Vaet, ExecutionContext::Standalone).is_err());
    }

    #[test]
    fn calibration_then_motion_round_trip() {
        let mut sup = Supervisor::new();
        sup.begin_calibration().unwrap();
        assert_eq!(sup.state(), SystemState::Calibrating);
        sup.calibration_complete().unwrap();
        assert_eq!(sup.state(), SystemState::Ready);

        sup.start_movement(MovementType::Vaet, ExecutionContext::Standalone).unwrap();
        assert_eq!(sup.state(), SystemState::Running);
        assert!(sup.allows_motion());
        assert_eq!(sup.movement(), Some(MovementType::Vaet));
    }

    #[test]
    fn pause_resume_cycle() {
        let mut sup = Supervisor::new();
        sup.begin_calibration().unwrap();
        sup.calibration_complete().unwrap();
        sup.start_movement(MovementType::Oscillation, ExecutionContext::Standalone).unwrap();

        sup.toggle_pause().unwrap();
        assert_eq!(sup.state(), SystemState::Paused);
        sup.toggle_pause().unwrap();
        assert_eq!(sup.state(), SystemState::Running);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut sup = Supervisor::new();
        sup.stop().unwrap();
        assert_eq!(sup.state(), SystemState::Init);
    }

    #[test]
    fn set_active_movement_does_not_touch_system_state() {
        let mut sup = Supervisor::new();
        sup.begin_calibration().unwrap();
        sup.calibration_complete().unwrap();
        sup.start_movement(MovementType::Vaet, ExecutionContext::Sequencer).unwrap();

        sup.set_active_movement(MovementType::Oscillation);
        assert_eq!(sup.state(), SystemState::Running);
        assert_eq!(sup.movement(), Some(MovementType::Oscillation));
    }

    #[test]
    fn safety_fault_sticks_until_recovery() {
        let mut sup = Supervisor::new();
        sup.begin_calibration().unwrap();
        sup.calibration_complete().unwrap();
        sup.start_movement(MovementType::Vaet, ExecutionContext::Standalone).unwrap();

        sup.safety_fault("end contact triggered");
        assert_eq!(sup.state(), SystemState::Error);
        assert!(sup.is_error());
        assert_eq!(sup.movement(), None);

        assert!(sup.start_movement(MovementType::Vaet, ExecutionContext::Standalone).is_err());
        sup.recover_to_ready().unwrap();
        assert_eq!(sup.state(), SystemState::Ready);
    }
}
