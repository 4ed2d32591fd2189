//! # Database Operations
//!
//! Connection description and schema migration for the application database.
//!
//! - [`connection`] - Connection descriptor built from `database.*` properties
//! - [`migrations`] - Versioned migration runner with baseline support
//! - [`error_codes`] - PostgreSQL SQLSTATE codes used for error translation

pub mod connection;
pub mod error_codes;
pub mod migrations;

pub use connection::{ConnectionDescriptor, DriverKind};
pub use error_codes::PgErrorCode;
pub use migrations::{
    MigrationError, MigrationReport, MigrationResult, SchemaMigrator, ScriptMigrator,
};

/// Whether `name` is a plain lowercase SQL identifier that is safe to
/// interpolate into a statement.
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    valid_start
        && name.len() <= 63
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_identifiers() {
        assert!(is_plain_identifier("schema_history"));
        assert!(is_plain_identifier("_history2"));
        for bad in ["", "Schema", "1history", "history; DROP TABLE x", "a-b", "\"x\""] {
            assert!(!is_plain_identifier(bad), "accepted '{bad}'");
        }
        assert!(!is_plain_identifier(&"a".repeat(64)));
    }
}
