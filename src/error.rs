//! Error types for botmods
//!
//! This module defines the error taxonomy used throughout the crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Two layers exist:
//! - [`ManifestError`]: why a single `plugin.json` was rejected. Fatal to that
//!   plugin only; the host logs it and keeps loading others.
//! - [`BotmodsError`]: the crate-wide error for I/O, configuration, settings
//!   and lifecycle failures.

use thiserror::Error;

/// Reasons a plugin manifest fails validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// A required field is absent. Holds the dotted path of the field.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// Two commands in one manifest share the same token.
    #[error("duplicate command '{0}'")]
    DuplicateCommand(String),

    /// A command token does not match `[a-z0-9_]+`.
    #[error("invalid command token '{0}': must match [a-z0-9_]+")]
    InvalidCommandToken(String),

    /// A setting declares a `type` outside string/choice/int/bool.
    #[error("setting '{key}' has unknown type '{kind}'")]
    UnknownSettingType { key: String, kind: String },

    /// A setting default does not satisfy its type or constraints.
    #[error("setting '{key}' has an invalid default: {reason}")]
    InvalidDefault { key: String, reason: String },

    /// A setting declares malformed or inconsistent numeric bounds.
    #[error("setting '{key}' has invalid bounds: {reason}")]
    InvalidBounds { key: String, reason: String },

    /// A field is present but has the wrong shape.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

/// The primary error type for botmods operations.
#[derive(Error, Debug)]
pub enum BotmodsError {
    /// Configuration and registration errors (bad config, name conflicts, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A manifest failed validation
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Setting lookups, updates and activation-time requirement checks
    #[error("Settings error: {0}")]
    Settings(String),

    /// Plugin lifecycle or handler failures
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Resource not found (plugins, commands, settings files, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A privileged command was invoked by a non-admin user
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for botmods operations.
pub type Result<T> = std::result::Result<T, BotmodsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BotmodsError::Config("duplicate plugin".to_string());
        assert_eq!(err.to_string(), "Configuration error: duplicate plugin");
    }

    #[test]
    fn test_manifest_error_display() {
        let err = ManifestError::MissingField("name".to_string());
        assert_eq!(err.to_string(), "missing required field 'name'");

        let err = ManifestError::InvalidDefault {
            key: "units".to_string(),
            reason: "'kelvin' is not one of the options".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "setting 'units' has an invalid default: 'kelvin' is not one of the options"
        );
    }

    #[test]
    fn test_error_from_manifest() {
        let err: BotmodsError = ManifestError::DuplicateCommand("weather".to_string()).into();
        assert!(matches!(
            err,
            BotmodsError::Manifest(ManifestError::DuplicateCommand(_))
        ));
        assert_eq!(err.to_string(), "Manifest error: duplicate command 'weather'");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BotmodsError = io_err.into();
        assert!(matches!(err, BotmodsError::Io(_)));
    }

    #[test]
    fn test_unauthorized_display() {
        let err = BotmodsError::Unauthorized("command 'reload' is admin-only".to_string());
        assert_eq!(
            err.to_string(),
            "Unauthorized: command 'reload' is admin-only"
        );
    }
}
