//! Sequence Executor: a line-by-line program runner chaining VAET,
//! oscillation, and chaos moves into a scripted show.
//!
//! The program itself is pre-sized (`heapless::Vec`) per the "fixed-size
//! state, no dynamic allocation on the motion path" redesign note; the
//! sequencer only tracks *which* line is active and *when* to advance —
//! actually starting/stopping the underlying controller is the
//! supervisor's job, driven by the events this module returns.

use heapless::Vec as HVec;
use serde::{Deserialize, Serialize};

use crate::chaos::ChaosConfig;
use crate::error::EngineError;
use crate::oscillation::OscillationConfig;
use crate::state::MovementType;
use crate::vaet::MotionConfig;

/// Compile-time cap on program length.
pub const MAX_SEQUENCE_LINES: usize = 32;

/// Mode-specific parameters for one sequence line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SequenceLineParams {
    Vaet(MotionConfig),
    Oscillation(OscillationConfig),
    Chaos(ChaosConfig),
}

impl SequenceLineParams {
    /// Movement type this line will run as.
    pub fn movement_type(&self) -> MovementType {
        match self {
            SequenceLineParams::Vaet(_) => MovementType::Vaet,
            SequenceLineParams::Oscillation(_) => MovementType::Oscillation,
            SequenceLineParams::Chaos(_) => MovementType::Chaos,
        }
    }
}

/// One line of a sequence program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceLine {
    /// Stable identifier, independent of position in the program.
    pub id: u32,
    /// Lines with `enabled = false` are skipped during playback.
    pub enabled: bool,
    /// Movement-specific parameters.
    pub params: SequenceLineParams,
    /// Number of cycles to run this line before advancing.
    pub cycle_count: u32,
    /// Pause inserted after the line's last cycle, before the next line starts.
    pub pause_after_ms: u64,
}

/// Live playback state of the sequencer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SequenceExecutionState {
    pub is_running: bool,
    pub is_loop_mode: bool,
    pub current_line_index: usize,
    pub current_cycle_in_line: u32,
    pub is_waiting_pause: bool,
    pub pause_end_time_ms: u64,
    pub loop_count: u32,
}

/// Outcome of [`Sequencer::on_cycle_complete`] / [`Sequencer::poll_pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerEvent {
    /// Nothing to report.
    None,
    /// The active line has more cycles to run; re-invoke it.
    RepeatLine,
    /// The line finished its cycles and a post-line pause is running.
    Pausing,
    /// Playback moved to a new line index.
    AdvancedTo(usize),
    /// Playback wrapped back to the first enabled line.
    Looped,
    /// The program finished (not looping) and the sequencer stopped.
    ProgramComplete,
}

/// Line-by-line program runner.
pub struct Sequencer {
    lines: HVec<SequenceLine, MAX_SEQUENCE_LINES>,
    state: SequenceExecutionState,
}

impl Sequencer {
    /// Construct an empty, stopped sequencer.
    pub fn new() -> Self {
        Self {
            lines: HVec::new(),
            state: SequenceExecutionState::default(),
        }
    }

    /// Current playback state.
    pub fn state(&self) -> SequenceExecutionState {
        self.state
    }

    /// The line currently selected for playback, if running.
    pub fn current_line(&self) -> Option<&SequenceLine> {
        if self.state.is_running {
            self.lines.get(self.state.current_line_index)
        } else {
            None
        }
    }

    /// Append a line to the program.
    pub fn add(&mut self, line: SequenceLine) -> Result<(), EngineError> {
        self.lines
            .push(line)
            .map_err(|_| EngineError::ConfigInvalid("sequence program full".into()))
    }

    /// Replace the line with the given `id`.
    pub fn update(&mut self, id: u32, line: SequenceLine) -> Result<(), EngineError> {
        let slot = self.find_mut(id)?;
        *slot = line;
        Ok(())
    }

    /// Remove the line with the given `id`.
    pub fn delete(&mut self, id: u32) -> Result<(), EngineError> {
        let idx = self.find_index(id)?;
        self.lines.remove(idx);
        Ok(())
    }

    /// Move the line with the given `id` to `new_index`.
    pub fn move_line(&mut self, id: u32, new_index: usize) -> Result<(), EngineError> {
        let idx = self.find_index(id)?;
        if new_index >= self.lines.len() {
            return Err(EngineError::ConfigInvalid("move index out of range".into()));
        }
        let line = self.lines.remove(idx);
        self.lines
            .insert(new_index, line)
            .map_err(|_| EngineError::ConfigInvalid("sequence program full".into()))
    }

    /// Duplicate the line with the given `id`, inserting the copy right after it.
    pub fn duplicate(&mut self, id: u32) -> Result<(), EngineError> {
        let idx = self.find_index(id)?;
        let mut copy = self.lines[idx].clone();
        copy.id = self.lines.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        self.lines
            .insert(idx + 1, copy)
            .map_err(|_| EngineError::ConfigInvalid("sequence program full".into()))
    }

    /// Remove every line and stop playback.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.stop();
    }

    /// Replace the whole program.
    pub fn import(&mut self, lines: &[SequenceLine]) -> Result<(), EngineError> {
        if lines.len() > MAX_SEQUENCE_LINES {
            return Err(EngineError::ConfigInvalid("import exceeds sequence line cap".into()));
        }
        let mut imported = HVec::new();
        for line in lines {
            imported
                .push(line.clone())
                .map_err(|_| EngineError::ConfigInvalid("sequence program full".into()))?;
        }
        self.lines = imported;
        self.stop();
        Ok(())
    }

    /// The current program, in order.
    pub fn export(&self) -> &[SequenceLine] {
        &self.lines
    }

    /// Begin playback at the first enabled line.
    pub fn start(&mut self, loop_mode: bool) -> Result<(), EngineError> {
        let idx = self
            .next_enabled_index(0)
            .ok_or_else(|| EngineError::ConfigInvalid("sequence program has no enabled lines".into()))?;
        self.state = SequenceExecutionState {
            is_running: true,
            is_loop_mode: loop_mode,
            current_line_index: idx,
            current_cycle_in_line: 0,
            is_waiting_pause: false,
            pause_end_time_ms: 0,
            loop_count: 0,
        };
        Ok(())
    }

    /// Stop playback and reset execution state.
    pub fn stop(&mut self) {
        self.state = SequenceExecutionState::default();
    }

    /// Notify the sequencer that the active controller reported one
    /// completed cycle.
    pub fn on_cycle_complete(&mut self, now_ms: u64) -> SequencerEvent {
        if !self.state.is_running {
            return SequencerEvent::None;
        }
        let Some(line) = self.lines.get(self.state.current_line_index) else {
            return self.finish_program();
        };
        self.state.current_cycle_in_line += 1;
        if self.state.current_cycle_in_line < line.cycle_count.max(1) {
            return SequencerEvent::RepeatLine;
        }
        if line.pause_after_ms > 0 {
            self.state.is_waiting_pause = true;
            self.state.pause_end_time_ms = now_ms + line.pause_after_ms;
            return SequencerEvent::Pausing;
        }
        self.advance_line()
    }

    /// Drive the post-line pause timer; call every tick while
    /// [`SequenceExecutionState::is_waiting_pause`] is set.
    pub fn poll_pause(&mut self, now_ms: u64) -> SequencerEvent {
        if !self.state.is_waiting_pause || now_ms < self.state.pause_end_time_ms {
            return SequencerEvent::None;
        }
        self.state.is_waiting_pause = false;
        self.advance_line()
    }

    fn advance_line(&mut self) -> SequencerEvent {
        self.state.current_cycle_in_line = 0;
        match self.next_enabled_index(self.state.current_line_index + 1) {
            Some(idx) => {
                self.state.current_line_index = idx;
                SequencerEvent::AdvancedTo(idx)
            }
            None => match self.state.is_loop_mode.then(|| self.next_enabled_index(0)).flatten() {
                Some(idx) => {
                    self.state.current_line_index = idx;
                    self.state.loop_count += 1;
                    SequencerEvent::Looped
                }
                None => self.finish_program(),
            },
        }
    }

    fn finish_program(&mut self) -> SequencerEvent {
        self.stop();
        SequencerEvent::ProgramComplete
    }

    fn next_enabled_index(&self, from: usize) -> Option<usize> {
        (from..self.lines.len()).find(|&i| self.lines[i].enabled)
    }

    fn find_index(&self, id: u32) -> Result<usize, EngineError> {
        self.lines
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| EngineError::ConfigInvalid(format!("no sequence line with id {id}")))
    }

    fn find_mut(&mut self, id: u32) -> Result<&mut SequenceLine, EngineError> {
        self.lines
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| EngineError::ConfigInvalid(format!("no sequence line with id {id}")))
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
