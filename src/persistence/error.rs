//! Persistence exception translation.
//!
//! Driver errors are classified by SQLSTATE into a small, driver-independent
//! taxonomy so that callers can match on what went wrong instead of on codes.

use crate::database::PgErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error("Entity not found")]
    NotFound,

    #[error("Duplicate key violates unique constraint {}: {message}", constraint.as_deref().unwrap_or("<unknown>"))]
    DuplicateKey {
        constraint: Option<String>,
        message: String,
    },

    #[error("Foreign key constraint {} violated: {message}", constraint.as_deref().unwrap_or("<unknown>"))]
    ForeignKeyViolation {
        constraint: Option<String>,
        message: String,
    },

    #[error("Data integrity violation ({code}): {message}")]
    IntegrityViolation { code: String, message: String },

    #[error("Concurrency failure ({code}): {message}")]
    ConcurrencyFailure { code: String, message: String },

    #[error("Query canceled: {0}")]
    QueryCanceled(String),

    #[error("Database connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Timed out acquiring a database connection")]
    Timeout,

    #[error("Invalid entity mapping: {0}")]
    InvalidMapping(String),

    #[error("Database error ({code}): {message}")]
    Database { code: String, message: String },

    #[error("Data access error: {0}")]
    Other(String),
}

impl DataAccessError {
    /// Whether re-running the same work could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataAccessError::ConcurrencyFailure { .. }
                | DataAccessError::ConnectionFailure(_)
                | DataAccessError::Timeout
        )
    }
}

impl From<sqlx::Error> for DataAccessError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataAccessError::NotFound,
            sqlx::Error::Database(db_error) => {
                let message = db_error.message().to_string();
                let constraint = db_error.constraint().map(str::to_string);
                let Some(code) = db_error.code().map(|c| c.into_owned()) else {
                    return DataAccessError::Other(message);
                };

                if PgErrorCode::is_unique_violation(&code) {
                    DataAccessError::DuplicateKey {
                        constraint,
                        message,
                    }
                } else if PgErrorCode::is_foreign_key_violation(&code) {
                    DataAccessError::ForeignKeyViolation {
                        constraint,
                        message,
                    }
                } else if PgErrorCode::is_integrity_constraint_violation(&code) {
                    DataAccessError::IntegrityViolation { code, message }
                } else if PgErrorCode::is_concurrency_failure(&code) {
                    DataAccessError::ConcurrencyFailure { code, message }
                } else if code == PgErrorCode::QUERY_CANCELED {
                    DataAccessError::QueryCanceled(message)
                } else if PgErrorCode::is_connection_failure(&code) {
                    DataAccessError::ConnectionFailure(message)
                } else {
                    DataAccessError::Database { code, message }
                }
            }
            sqlx::Error::PoolTimedOut => DataAccessError::Timeout,
            err @ (sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)) => {
                DataAccessError::ConnectionFailure(err.to_string())
            }
            err @ (sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }) => {
                DataAccessError::InvalidMapping(err.to_string())
            }
            other => DataAccessError::Other(other.to_string()),
        }
    }
}

pub type DataAccessResult<T> = Result<T, DataAccessError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::fmt;

    #[derive(Debug)]
    struct StubDatabaseError {
        code: &'static str,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for StubDatabaseError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "stub error {}", self.code)
        }
    }

    impl std::error::Error for StubDatabaseError {}

    impl DatabaseError for StubDatabaseError {
        fn message(&self) -> &str {
            "stub message"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn translate(code: &'static str, constraint: Option<&'static str>) -> DataAccessError {
        sqlx::Error::Database(Box::new(StubDatabaseError { code, constraint })).into()
    }

    #[test]
    fn test_unique_violation_keeps_constraint() {
        match translate("23505", Some("accounts_email_key")) {
            DataAccessError::DuplicateKey { constraint, .. } => {
                assert_eq!(constraint.as_deref(), Some("accounts_email_key"));
            }
            other => panic!("unexpected translation: {other:?}"),
        }
    }

    #[test]
    fn test_sqlstate_classes() {
        assert!(matches!(
            translate("23503", None),
            DataAccessError::ForeignKeyViolation { .. }
        ));
        assert!(matches!(
            translate("23502", None),
            DataAccessError::IntegrityViolation { .. }
        ));
        assert!(matches!(
            translate("40P01", None),
            DataAccessError::ConcurrencyFailure { .. }
        ));
        assert!(matches!(
            translate("57014", None),
            DataAccessError::QueryCanceled(_)
        ));
        assert!(matches!(
            translate("08006", None),
            DataAccessError::ConnectionFailure(_)
        ));
        assert!(matches!(
            translate("42P01", None),
            DataAccessError::Database { ref code, .. } if code == "42P01"
        ));
    }

    #[test]
    fn test_driver_level_errors() {
        assert!(matches!(
            DataAccessError::from(sqlx::Error::RowNotFound),
            DataAccessError::NotFound
        ));
        assert!(matches!(
            DataAccessError::from(sqlx::Error::PoolTimedOut),
            DataAccessError::Timeout
        ));
        assert!(matches!(
            DataAccessError::from(sqlx::Error::PoolClosed),
            DataAccessError::ConnectionFailure(_)
        ));
        assert!(matches!(
            DataAccessError::from(sqlx::Error::ColumnNotFound("email".to_string())),
            DataAccessError::InvalidMapping(_)
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(translate("40001", None).is_transient());
        assert!(DataAccessError::Timeout.is_transient());
        assert!(!translate("23505", None).is_transient());
        assert!(!DataAccessError::NotFound.is_transient());
    }
}
