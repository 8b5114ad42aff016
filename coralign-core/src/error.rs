//! Error types for the coralign core library.
//!
//! Uses `thiserror` for public API error types. Resolution failures are split
//! into configuration errors (missing or contradictory settings) and conflict
//! errors (strict-mode mismatches against a template).

use serde_json::Value;
use std::path::PathBuf;

/// Top-level error type for the coralign core library.
#[derive(Debug, thiserror::Error)]
pub enum CoralignError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while assembling or validating settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Must manually specify {field} for this setup")]
    MissingField { field: String },

    #[error("Incompatible settings: {message}")]
    Incompatible { message: String },

    #[error("No {kind} preset named '{name}'")]
    UnknownPreset { kind: String, name: String },

    #[error("Field '{field}' must be an option group, found {found}")]
    TypeMismatch { field: String, found: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Settings file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl ConfigError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::Incompatible {
            message: message.into(),
        }
    }

    pub fn unknown_preset(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownPreset {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// A strict-mode mismatch between an already-set value and a template value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Argument {} must be set to {expected}", display_key(.key, .sub_key.as_deref()))]
pub struct ConflictError {
    pub key: String,
    pub sub_key: Option<String>,
    pub expected: Value,
}

fn display_key(key: &str, sub_key: Option<&str>) -> String {
    match sub_key {
        Some(sub) => format!("{key}[{sub}]"),
        None => key.to_string(),
    }
}

/// A type alias for results using the top-level `CoralignError`.
pub type Result<T> = std::result::Result<T, CoralignError>;
