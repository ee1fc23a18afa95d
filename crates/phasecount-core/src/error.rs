//! Core error types for phasecount-core.
//!
//! Configuration and duplicate-id errors are raised synchronously, before any
//! scheduling begins. Faults raised by callbacks during a run never surface
//! here: they are contained to the run and reported as
//! [`Event::CountdownFaulted`](crate::events::Event::CountdownFaulted).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for phasecount-core.
#[derive(Error, Debug)]
pub enum CountdownError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A live, uncancelled run is already registered under this id
    #[error("Countdown '{id}' is already running")]
    DuplicateRun { id: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A duration given as a signed second count was negative
    #[error("Negative duration for '{field}': {seconds}s")]
    NegativeDuration { field: String, seconds: i64 },

    /// Durations are whole seconds; sub-second parts are rejected
    #[error("Duration for '{field}' is not a whole number of seconds: {millis}ms")]
    FractionalSeconds { field: String, millis: u128 },

    /// Two alert thresholds share the same remaining-time value
    #[error("Duplicate alert threshold at {seconds}s")]
    DuplicateThreshold { seconds: u64 },

    /// A countdown needs at least one phase
    #[error("Countdown '{id}' has no phases")]
    NoPhases { id: String },

    /// No preset with this name exists in the configuration
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Dotted key does not name a configuration field
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CountdownError
pub type Result<T, E = CountdownError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_run_message_names_id() {
        let err = CountdownError::DuplicateRun {
            id: "arena".into(),
        };
        assert_eq!(err.to_string(), "Countdown 'arena' is already running");
    }

    #[test]
    fn config_error_converts_into_countdown_error() {
        let err: CountdownError = ConfigError::NoPhases { id: "x".into() }.into();
        assert!(matches!(err, CountdownError::Config(ConfigError::NoPhases { .. })));
    }
}
