//! Platform-constant configuration: loaded once at boot, validated, then
//! treated as immutable for the life of the process.
//!
//! Shaped after the teacher's `config.rs` parse-then-validate two-step
//! (`load_config` → `validate_*`), simplified to the single flat table this
//! engine needs instead of the teacher's multi-axis/coupling-graph schema.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Platform constants referenced throughout §4.3's motion math and the
/// safety checks of §4.10.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps emitted per millimeter of travel.
    pub steps_per_mm: f64,
    /// Maximum user-facing speed level.
    pub max_speed_level: f64,
    /// Peak linear speed the oscillation controller may request, mm/s.
    pub osc_max_speed_mms: f64,
    /// Upper bound on the chaos controller's step delay, microseconds.
    pub chaos_max_step_delay_us: u32,
    /// Empirical compensation factor removing fixed per-step overhead.
    pub speed_compensation_factor: f64,
    /// Measured time to execute one step pulse, microseconds.
    pub step_execution_time_us: f64,
    /// Width of the zone near each physical limit where hard-drift contact
    /// checks are active, in millimeters.
    pub hard_drift_test_zone_mm: f64,
    /// Steps to back off from a contact after it releases during homing.
    pub safety_offset_steps: i64,
    /// Soft-drift correction buffer, in steps, beyond a logical limit.
    pub soft_drift_buffer_steps: i64,
    /// Step-count threshold under which the carriage is considered "at start".
    pub was_at_start_threshold_steps: i64,
    /// Fraction (0.0..=1.0) of `total_distance_mm` usable as effective travel.
    pub limit_percent: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            steps_per_mm: 100.0,
            max_speed_level: 20.0,
            osc_max_speed_mms: 500.0,
            chaos_max_step_delay_us: 10_000,
            speed_compensation_factor: 1.0,
            step_execution_time_us: 50.0,
            hard_drift_test_zone_mm: 20.0,
            safety_offset_steps: 50,
            soft_drift_buffer_steps: 20,
            was_at_start_threshold_steps: 10,
            limit_percent: 0.98,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML string without validating.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load and validate from a file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        let cfg = Self::from_toml_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Semantic validation beyond what TOML parsing alone can check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps_per_mm <= 0.0 {
            return Err(ConfigError::ValidationError(
                "steps_per_mm must be > 0".into(),
            ));
        }
        if self.max_speed_level <= 0.0 {
            return Err(ConfigError::ValidationError(
                "max_speed_level must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.limit_percent) {
            return Err(ConfigError::ValidationError(
                "limit_percent must be within [0.0, 1.0]".into(),
            ));
        }
        if self.soft_drift_buffer_steps < 0 || self.safety_offset_steps < 0 {
            return Err(ConfigError::ValidationError(
                "drift/offset step counts must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
