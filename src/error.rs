//! Error types for application startup.
//!
//! Every failure while wiring the application is fatal: the process either
//! finishes bootstrap with all singletons constructed or it does not start.

use crate::config::ConfigurationError;
use crate::database::migrations::MigrationError;
use crate::persistence::DataAccessError;
use crate::views::ViewError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebappError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("Persistence unit error: {0}")]
    Persistence(String),
    #[error("Schema validation failed, missing tables: {}", missing_tables.join(", "))]
    SchemaValidation { missing_tables: Vec<String> },
    #[error("Server error: {0}")]
    Server(String),
}

impl WebappError {
    /// Create a persistence unit error with context
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Which startup phase an error belongs to, for structured logging
    pub fn phase(&self) -> &'static str {
        match self {
            WebappError::Configuration(_) => "configuration",
            WebappError::Migration(_) => "migration",
            WebappError::DataAccess(_)
            | WebappError::Persistence(_)
            | WebappError::SchemaValidation { .. } => "persistence",
            WebappError::View(_) => "views",
            WebappError::Server(_) => "server",
        }
    }
}

impl From<std::io::Error> for WebappError {
    fn from(err: std::io::Error) -> Self {
        WebappError::Server(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WebappError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_validation_message_lists_tables() {
        let err = WebappError::SchemaValidation {
            missing_tables: vec!["accounts".to_string(), "orders".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Schema validation failed, missing tables: accounts, orders"
        );
        assert_eq!(err.phase(), "persistence");
    }

    #[test]
    fn test_configuration_errors_are_transparent() {
        let err: WebappError = ConfigurationError::missing_required_field(
            "database.driver",
            "connection descriptor",
        )
        .into();
        assert_eq!(err.phase(), "configuration");
        assert!(err.to_string().contains("database.driver"));
    }
}
