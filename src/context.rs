//! Per-tick context bundle passed into every controller's `process()`.
//!
//! Every controller (`vaet`, `oscillation`, `chaos`, `pursuit`) needs the
//! same four things each tick — a step sink, a drift sensor, the clock, and
//! the platform constants — so they share one context type instead of each
//! threading four separate parameters through their `process` signatures.

use crate::config::EngineConfig;
use crate::contacts::DriftSensor;
use crate::motor::StepSink;

/// Bundles the per-tick dependencies a controller needs to advance motion
/// and check safety, without the controller knowing the concrete pin types.
pub struct MotionContext<'a, M: StepSink, C: DriftSensor> {
    /// The motor driver, abstracted to "can step in a direction".
    pub motor: &'a mut M,
    /// The limit-contact sensors, abstracted to "can check hard drift".
    pub contacts: &'a mut C,
    /// Current time, microseconds.
    pub now_us: u64,
    /// Current time, milliseconds (coarser clock used for pause timers).
    pub now_ms: u64,
    /// Platform constants.
    pub cfg: &'a EngineConfig,
    /// Lower bound of legal `current_step` (usually `0`).
    pub min_step: i64,
    /// Upper bound of legal `current_step`.
    pub max_step: i64,
}

impl<'a, M: StepSink, C: DriftSensor> MotionContext<'a, M, C> {
    /// Construct a context for one tick.
    pub fn new(
        motor: &'a mut M,
        contacts: &'a mut C,
        now_us: u64,
        now_ms: u64,
        cfg: &'a EngineConfig,
        min_step: i64,
        max_step: i64,
    ) -> Self {
        Self {
            motor,
            contacts,
            now_us,
            now_ms,
            cfg,
            min_step,
            max_step,
        }
    }

    /// Hard-drift test-zone width in steps, derived from the configured
    /// millimeter width.
    pub fn hard_drift_test_zone_steps(&self) -> i64 {
        (self.cfg.hard_drift_test_zone_mm * self.cfg.steps_per_mm).round() as i64
    }
}
