//! Error types returned across the command/config surface.
//!
//! The motion core itself never returns `Result` from its step routines —
//! failures there degrade directly to [`crate::state::SystemState::Error`].
//! `EngineError` is the type returned by fallible command handlers and
//! `ConfigError` by configuration loading, mirroring the split the teacher
//! keeps between `HalError` (derive-based) and the top-level config loader
//! (hand-rolled `Display`).

use thiserror::Error;

/// Errors surfaced to the command originator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A parameter was out of range for the current configuration.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A movement command was received before the axis has a known travel length.
    #[error("axis is not calibrated")]
    NotCalibrated,

    /// The shared-state mutex could not be acquired within its timeout.
    #[error("resource busy, retry")]
    ResourceConflict,

    /// A limit contact fired during motion; the axis is now in `Error` state.
    #[error("safety fault: {0}")]
    SafetyFault(String),

    /// Homing did not find a contact within its watchdog step budget.
    #[error("calibration failed: {0}")]
    CalibrationFailed(String),

    /// The command does not apply to the engine's current state.
    #[error("rejected: {0}")]
    Rejected(&'static str),
}

/// Errors produced while loading or validating [`crate::config::EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The TOML document failed semantic validation.
    #[error("invalid config: {0}")]
    ValidationError(String),

    /// The config file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    IoError {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_messages_are_human_readable() {
        assert_eq!(
            EngineError::NotCalibrated.to_string(),
            "axis is not calibrated"
        );
        assert!(EngineError::ConfigInvalid("amplitude too large".into())
            .to_string()
            .contains("amplitude too large"));
        assert!(EngineError::SafetyFault("end contact".into())
            .to_string()
            .contains("end contact"));
    }

    #[test]
    fn config_error_wraps_validation_message() {
        let err = ConfigError::ValidationError("steps_per_mm must be > 0".into());
        assert!(err.to_string().contains("steps_per_mm"));
    }
}
