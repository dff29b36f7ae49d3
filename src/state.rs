//! Top-level system state machine.
//!
//! Mirrors the shape of the teacher's `state::machine::MachineStateMachine`:
//! an `Event` enum, a `TransitionResult` enum, and a `handle_event` match
//! table, but over the six states this engine actually has instead of the
//! teacher's machine/manual/service lifecycle.

use serde::{Deserialize, Serialize};

/// Global system state. `Error` is sticky: only an explicit recovery event
/// (`ReturnToStart` succeeding) clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    /// Powered on, not yet calibrated.
    Init,
    /// Running the homing routine.
    Calibrating,
    /// Calibrated and idle.
    Ready,
    /// A controller is authorized to emit steps.
    Running,
    /// Motion suspended, resumable.
    Paused,
    /// A safety fault or calibration failure occurred.
    Error,
}

/// Which motion family currently owns the motor, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    /// Back-and-forth traversal.
    Vaet,
    /// Waveform oscillation.
    Oscillation,
    /// Pseudo-random pattern scheduler.
    Chaos,
    /// Real-time target chasing.
    Pursuit,
    /// Homing routine.
    Calibration,
}

/// Who is driving the currently-active movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionContext {
    /// A user command started the current movement directly.
    Standalone,
    /// The sequencer is driving the current movement.
    Sequencer,
}

/// An event that can move [`SystemState`] between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// Calibration routine started.
    CalibrationStarted,
    /// Calibration routine completed successfully.
    CalibrationComplete,
    /// Calibration routine failed (contact not found within watchdog).
    CalibrationFailed,
    /// A movement command started a controller.
    MotionStarted,
    /// User or sequencer requested pause.
    Paused,
    /// User or sequencer requested resume.
    Resumed,
    /// User or sequencer requested stop.
    Stopped,
    /// A limit contact fired during motion (hard drift).
    SafetyFault,
    /// `return_to_start` completed, clearing a prior error.
    RecoveredToReady,
}

/// Outcome of a [`SystemEvent`] applied to a [`SystemState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition accepted; this is the new state.
    Ok(SystemState),
    /// Transition rejected in the current state, with a reason.
    Rejected(&'static str),
}

/// Apply `event` to `current`, returning the transition outcome without
/// mutating anything — callers apply the result themselves.
pub fn handle_event(current: SystemState, event: SystemEvent) -> TransitionResult {
    use SystemEvent as E;
    use SystemState as S;
    use TransitionResult::{Ok as T, Rejected};

    match (current, event) {
        (S::Init, E::CalibrationStarted) => T(S::Calibrating),
        (S::Ready, E::CalibrationStarted) => T(S::Calibrating),
        (S::Calibrating, E::CalibrationComplete) => T(S::Ready),
        (S::Calibrating, E::CalibrationFailed) => T(S::Error),

        (S::Ready, E::MotionStarted) => T(S::Running),
        (S::Running, E::Paused) => T(S::Paused),
        (S::Paused, E::Resumed) => T(S::Running),
        (S::Running, E::Stopped) => T(S::Ready),
        (S::Paused, E::Stopped) => T(S::Ready),

        (S::Running, E::SafetyFault) => T(S::Error),
        (S::Paused, E::SafetyFault) => T(S::Error),
        (S::Calibrating, E::SafetyFault) => T(S::Error),

        (S::Error, E::CalibrationStarted) => T(S::Calibrating),
        (S::Error, E::RecoveredToReady) => T(S::Ready),

        (S::Init, E::MotionStarted) => Rejected("axis is not calibrated"),
        (_, E::SafetyFault) => Rejected("no active motion to fault"),
        (_, _) => Rejected("event not valid in current state"),
    }
}

/// `true` if `state` permits step emission by a non-calibration controller.
pub const fn allows_motion(state: SystemState) -> bool {
    matches!(state, SystemState::Running)
}

/// `true` if `state` is the sticky fault state.
pub const fn is_error(state: SystemState) -> bool {
    matches!(state, SystemState::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_to_ready_via_calibration() {
        assert_eq!(
            handle_event(SystemState::Init, SystemEvent::CalibrationStarted),
            TransitionResult::Ok(SystemState::Calibrating)
        );
        assert_eq!(
            handle_event(SystemState::Calibrating, SystemEvent::CalibrationComplete),
            TransitionResult::Ok(SystemState::Ready)
        );
    }

    #[test]
    fn calibration_failure_enters_error() {
        assert_eq!(
            handle_event(SystemState::Calibrating, SystemEvent::CalibrationFailed),
            TransitionResult::Ok(SystemState::Error)
        );
    }

    #[test]
    fn motion_requires_ready() {
        assert_eq!(
            handle_event(SystemState::Init, SystemEvent::MotionStarted),
            TransitionResult::Rejected("axis is not calibrated")
        );
        assert_eq!(
            handle_event(SystemState::Ready, SystemEvent::MotionStarted),
            TransitionResult::Ok(SystemState::Running)
        );
    }

    #[test]
    fn pause_resume_round_trip() {
        assert_eq!(
            handle_event(SystemState::Running, SystemEvent::Paused),
            TransitionResult::Ok(SystemState::Paused)
        );
        assert_eq!(
            handle_event(SystemState::Paused, SystemEvent::Resumed),
            TransitionResult::Ok(SystemState::Running)
        );
    }

    #[test]
    fn stop_from_running_or_paused_goes_ready() {
        assert_eq!(
            handle_event(SystemState::Running, SystemEvent::Stopped),
            TransitionResult::Ok(SystemState::Ready)
        );
        assert_eq!(
            handle_event(SystemState::Paused, SystemEvent::Stopped),
            TransitionResult::Ok(SystemState::Ready)
        );
    }

    #[test]
    fn safety_fault_is_sticky_until_recovery() {
        assert_eq!(
            handle_event(SystemState::Running, SystemEvent::SafetyFault),
            TransitionResult::Ok(SystemState::Error)
        );
        assert_eq!(
            handle_event(SystemState::Error, SystemEvent::MotionStarted),
            TransitionResult::Rejected("event not valid in current state")
        );
        assert_eq!(
            handle_event(SystemState::Error, SystemEvent::RecoveredToReady),
            TransitionResult::Ok(SystemState::Ready)
        );
    }

    #[test]
    fn error_state_can_recalibrate_directly() {
        assert_eq!(
            handle_event(SystemState::Error, SystemEvent::CalibrationStarted),
            TransitionResult::Ok(SystemState::Calibrating)
        );
    }

    #[test]
    fn safety_fault_rejected_outside_active_states() {
        assert_eq!(
            handle_event(SystemState::Ready, SystemEvent::SafetyFault),
            TransitionResult::Rejected("no active motion to fault")
        );
    }

    #[test]
    fn allows_motion_only_when_running() {
        assert!(allows_motion(SystemState::Running));
        assert!(!allows_motion(SystemState::Paused));
        assert!(!allows_motion(SystemState::Calibrating));
    }

    #[test]
    fn is_error_recognizes_only_error_state() {
        assert!(is_error(SystemState::Error));
        assert!(!is_error(SystemState::Ready));
    }
}
