//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating pipeline configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid value for '{field}': {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Conflicting settings: {0}")]
    Conflict(String),

    #[error("Unknown select field '{field}' (not present in store schema)")]
    UnknownField { field: String },

    #[error("Failed to load configuration from {source_name}: {message}")]
    LoadFailed {
        source_name: String,
        message: String,
    },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn load_failed(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::LoadFailed {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
