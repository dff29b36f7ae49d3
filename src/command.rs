//! Command interface: the typed surface the platform's socket-protocol
//! decoder hands off to [`crate::engine::Engine::handle_command`].
//!
//! One variant per row of the command tag table, payload as named
//! fields — the same shape the teacher's `command::arbitration` module
//! uses to turn wire bytes into `AxisCommand`, except here the enum
//! itself is the whole translation (there is no raw byte union upstream
//! of this crate; framing is out of scope, §1).

use crate::chaos::ChaosConfig;
use crate::oscillation::OscillationConfig;
use crate::sequencer::SequenceLine;
use crate::vaet::{CyclePauseConfig, ZoneEffectConfig};

/// Which mode a `SET_CYCLE_PAUSE` command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePauseTarget {
    Vaet,
    Oscillation,
}

/// A decoded command, ready for [`crate::engine::Engine::handle_command`].
#[derive(Debug, Clone)]
pub enum Command {
    /// `SYNC_TIME`: forwarded to the platform clock, not handled here.
    SyncTime { epoch_ms: u64 },
    /// `GET_STATUS`: triggers one telemetry snapshot.
    GetStatus,
    /// `SET_DISTANCE`.
    SetDistance { mm: f64 },
    /// `SET_START_POSITION`.
    SetStartPosition { mm: f64 },
    /// `SET_SPEED_FORWARD`.
    SetSpeedForward { level: f64 },
    /// `SET_SPEED_BACKWARD`.
    SetSpeedBackward { level: f64 },
    /// `START`: begin a VAET run.
    Start { distance_mm: f64, level: f64 },
    /// `STOP`: supervisor stop.
    Stop,
    /// `PAUSE`: supervisor toggle-pause.
    Pause,
    /// `SET_OSCILLATION`: stage a full oscillation config.
    SetOscillation { config: OscillationConfig },
    /// `START_OSCILLATION`.
    StartOscillation,
    /// `STOP_OSCILLATION`.
    StopOscillation,
    /// `SET_CHAOS`: stage a full chaos config.
    SetChaos { config: ChaosConfig },
    /// `START_CHAOS`.
    StartChaos,
    /// `STOP_CHAOS`.
    StopChaos,
    /// `SET_CYCLE_PAUSE`: update the cycle pause for VAET or oscillation.
    SetCyclePause {
        target: CyclePauseTarget,
        config: CyclePauseConfig,
    },
    /// `SET_ZONE_EFFECT`.
    SetZoneEffect { config: ZoneEffectConfig },
    /// `SEQ_ADD`.
    SeqAdd { line: SequenceLine },
    /// `SEQ_UPDATE`.
    SeqUpdate { id: u32, line: SequenceLine },
    /// `SEQ_DELETE`.
    SeqDelete { id: u32 },
    /// `SEQ_MOVE`.
    SeqMove { id: u32, new_index: usize },
    /// `SEQ_DUPLICATE`.
    SeqDuplicate { id: u32 },
    /// `SEQ_CLEAR`.
    SeqClear,
    /// `SEQ_IMPORT`.
    SeqImport { lines: Vec<SequenceLine> },
    /// `SEQ_EXPORT`: the handler responds out-of-band with `Engine::export_sequence`.
    SeqExport,
    /// `SEQ_START`.
    SeqStart { loop_mode: bool },
    /// `SEQ_STOP`.
    SeqStop,
    /// `PURSUIT_MOVE`.
    PursuitMove { target_mm: f64, max_level: f64 },
    /// `RETURN_TO_START`.
    ReturnToStart,
    /// `CALIBRATE`.
    Calibrate,
}

/// Whether `cmd` needs a known travel length before it can run. If issued
/// while `total_distance_mm == 0`, the engine auto-triggers calibration and
/// replays `cmd` once it succeeds, dropping it if calibration fails (§7,
/// "Not calibrated").
pub const fn requires_calibration(cmd: &Command) -> bool {
    matches!(
        cmd,
        Command::Start { .. }
            | Command::StartOscillation
            | Command::StartChaos
            | Command::SeqStart { .. }
            | Command::PursuitMove { .. }
            | Command::ReturnToStart
    )
}

/// Whether `cmd` begins a standalone movement, which implicitly stops
/// any sequence in progress (invariant 7, §3).
pub const fn starts_movement(cmd: &Command) -> bool {
    matches!(
        cmd,
        Command::Start { .. } | Command::StartOscillation | Command::StartChaos | Command::PursuitMove { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_starting_commands_require_calibration() {
        assert!(requires_calibration(&Command::Start { distance_mm: 10.0, level: 5.0 }));
        assert!(requires_calibration(&Command::StartOscillation));
        assert!(!requires_calibration(&Command::GetStatus));
        assert!(!requires_calibration(&Command::Stop));
    }

    #[test]
    fn starts_movement_flags_only_mode_starts() {
        assert!(starts_movement(&Command::Start { distance_mm: 10.0, level: 5.0 }));
        assert!(starts_movement(&Command::PursuitMove { target_mm: 1.0, max_level: 5.0 }));
        assert!(!starts_movement(&Command::SeqStart { loop_mode: false }));
        assert!(!starts_movement(&Command::Stop));
    }
}
