//! Configuration Error Types
//!
//! Error handling for property loading and validation. Every variant is fatal at
//! startup; messages name the offending property so the operator can fix the file.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// The property source could not be assembled (bad syntax, unreadable file)
    #[error("Failed to load property source '{source_name}': {error}")]
    PropertySource { source_name: String, error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Type mismatch for configuration field
    #[error("Type mismatch for field {field}: {error}")]
    TypeMismatch { field: String, error: String },

    /// Database configuration errors
    #[error("Database configuration error: {error}")]
    DatabaseConfigError { error: String },
}

impl ConfigurationError {
    /// Create a configuration file not found error
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    /// Create a property source error
    pub fn property_source<S: Into<String>, E: std::fmt::Display>(source_name: S, error: E) -> Self {
        Self::PropertySource {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    /// Create a missing required field error
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch<F: Into<String>, E: std::fmt::Display>(field: F, error: E) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            error: error.to_string(),
        }
    }

    /// Create a database configuration error
    pub fn database_config_error<E: std::fmt::Display>(error: E) -> Self {
        Self::DatabaseConfigError {
            error: error.to_string(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;
