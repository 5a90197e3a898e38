//! Database error types.

use thiserror::Error;

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The physical database could not be opened
    #[error("Failed to open database: {0}")]
    Open(String),

    /// Programmer error in a schema declaration or schema operation.
    ///
    /// Top-level callers treat this as unrecoverable.
    #[error("Schema contract violation: {0}")]
    SchemaContractViolation(String),

    /// A value could not be converted to a field's declared type
    #[error("Cannot convert {found} to {expected}")]
    Conversion { expected: String, found: String },

    /// Malformed query, such as a placeholder/argument count mismatch
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The worker thread has exited and can no longer service requests
    #[error("Database worker thread has gone away")]
    WorkerGone,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaContractViolation(msg.into())
    }

    pub(crate) fn conversion(expected: impl ToString, found: impl ToString) -> Self {
        Self::Conversion {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Whether the error represents a defective schema declaration rather
    /// than a runtime condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SchemaContractViolation(_))
    }
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_schema_violations_are_fatal() {
        assert!(DatabaseError::schema("no PK").is_fatal());
        assert!(!DatabaseError::Migration("x".into()).is_fatal());
        assert!(!DatabaseError::WorkerGone.is_fatal());
    }

    #[test]
    fn test_conversion_message() {
        let err = DatabaseError::conversion("Int", "String(\"abc\")");
        assert_eq!(err.to_string(), "Cannot convert String(\"abc\") to Int");
    }
}
