//! PostgreSQL SQLSTATE codes recognised by the persistence exception translator.
//!
//! SQLSTATE codes are five characters: a two character class followed by a
//! three character condition. Full list:
//! <https://www.postgresql.org/docs/current/errcodes-appendix.html>

/// PostgreSQL SQLSTATE error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    // Class 08: Connection Exception
    pub const CONNECTION_EXCEPTION_CLASS: &'static str = "08";

    // Class 23: Integrity Constraint Violation
    pub const FOREIGN_KEY_VIOLATION: &'static str = "23503";
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    // Class 40: Transaction Rollback
    pub const SERIALIZATION_FAILURE: &'static str = "40001";
    pub const DEADLOCK_DETECTED: &'static str = "40P01";

    // Class 57: Operator Intervention
    /// Raised for `statement_timeout` as well as explicit cancellation
    pub const QUERY_CANCELED: &'static str = "57014";
    pub const ADMIN_SHUTDOWN: &'static str = "57P01";
    pub const CANNOT_CONNECT_NOW: &'static str = "57P03";

    #[inline]
    pub fn is_unique_violation(code: &str) -> bool {
        code == Self::UNIQUE_VIOLATION
    }

    #[inline]
    pub fn is_foreign_key_violation(code: &str) -> bool {
        code == Self::FOREIGN_KEY_VIOLATION
    }

    #[inline]
    pub fn is_integrity_constraint_violation(code: &str) -> bool {
        code.starts_with("23")
    }

    /// Serialization failures and deadlocks; the transaction may succeed if re-run
    #[inline]
    pub fn is_concurrency_failure(code: &str) -> bool {
        code == Self::SERIALIZATION_FAILURE || code == Self::DEADLOCK_DETECTED
    }

    /// The server could not be reached or dropped the session
    #[inline]
    pub fn is_connection_failure(code: &str) -> bool {
        code.starts_with(Self::CONNECTION_EXCEPTION_CLASS)
            || code == Self::ADMIN_SHUTDOWN
            || code == Self::CANNOT_CONNECT_NOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_constraint_class() {
        assert!(PgErrorCode::is_integrity_constraint_violation("23505"));
        assert!(PgErrorCode::is_integrity_constraint_violation("23514"));
        assert!(!PgErrorCode::is_integrity_constraint_violation("42P01"));
    }

    #[test]
    fn test_connection_failures() {
        assert!(PgErrorCode::is_connection_failure("08006"));
        assert!(PgErrorCode::is_connection_failure("08001"));
        assert!(PgErrorCode::is_connection_failure("57P01"));
        assert!(!PgErrorCode::is_connection_failure("57014"));
    }

    #[test]
    fn test_concurrency_failures() {
        assert!(PgErrorCode::is_concurrency_failure("40001"));
        assert!(PgErrorCode::is_concurrency_failure("40P01"));
        assert!(!PgErrorCode::is_concurrency_failure("23505"));
    }
}
