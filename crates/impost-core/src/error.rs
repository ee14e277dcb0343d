//! Error types for impost-core

use thiserror::Error;

/// Result type alias for impost operations
pub type Result<T> = std::result::Result<T, ImpostError>;

/// Typed errors for every impost operation.
///
/// Native engine statuses never cross the public boundary raw; they are
/// translated into this taxonomy at the point of the call.
#[derive(Error, Debug)]
pub enum ImpostError {
    /// The requested database, message, or filename does not exist
    #[error("not found")]
    NotFound,

    /// A mutating operation was attempted on a read-only database
    #[error("database opened read-only")]
    ReadOnly,

    /// The message id is already present in the database
    #[error("duplicate message id: {0}")]
    DuplicateMessageId(String),

    /// The on-disk schema predates the current version; run `upgrade`
    #[error("database schema requires an upgrade")]
    UpgradeRequired,

    /// The native engine ran out of memory
    #[error("engine out of memory")]
    OutOfMemory,

    /// The handle was closed before this operation
    #[error("database is closed")]
    Closed,

    /// No usable database path could be resolved from the given
    /// path/config/profile inputs
    #[error("config resolution failed: {0}")]
    ConfigResolution(String),

    /// IO error outside the engine (reading mail files, backups)
    #[error("IO error: {0}")]
    Io(String),

    /// Any other native engine failure, carrying its diagnostic text
    #[error("database error: {0}")]
    Database(String),
}

impl ImpostError {
    /// Translate a native engine status into the typed taxonomy.
    ///
    /// Row-less query results map to [`ImpostError::NotFound`]; engine
    /// result codes map by their primary code; everything else becomes
    /// [`ImpostError::Database`] with the engine's diagnostic string.
    pub(crate) fn from_native(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => ImpostError::NotFound,
            rusqlite::Error::SqliteFailure(native, message) => {
                let text = message.unwrap_or_else(|| native.to_string());
                match native.code {
                    rusqlite::ErrorCode::ReadOnly => ImpostError::ReadOnly,
                    rusqlite::ErrorCode::OutOfMemory => ImpostError::OutOfMemory,
                    rusqlite::ErrorCode::ConstraintViolation => {
                        ImpostError::DuplicateMessageId(text)
                    }
                    rusqlite::ErrorCode::NotFound | rusqlite::ErrorCode::CannotOpen => {
                        ImpostError::NotFound
                    }
                    _ => ImpostError::Database(text),
                }
            }
            other => ImpostError::Database(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ImpostError {
    fn from(err: std::io::Error) -> Self {
        ImpostError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: i32, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            Some(message.to_string()),
        )
    }

    #[test]
    fn test_no_rows_is_not_found() {
        assert!(matches!(
            ImpostError::from_native(rusqlite::Error::QueryReturnedNoRows),
            ImpostError::NotFound
        ));
    }

    #[test]
    fn test_readonly_code() {
        let err = ImpostError::from_native(failure(rusqlite::ffi::SQLITE_READONLY, "readonly"));
        assert!(matches!(err, ImpostError::ReadOnly));
    }

    #[test]
    fn test_constraint_is_duplicate() {
        let err = ImpostError::from_native(failure(
            rusqlite::ffi::SQLITE_CONSTRAINT,
            "UNIQUE constraint failed: messages.message_id",
        ));
        assert!(matches!(err, ImpostError::DuplicateMessageId(_)));
    }

    #[test]
    fn test_generic_failure_carries_text() {
        let err = ImpostError::from_native(failure(rusqlite::ffi::SQLITE_CORRUPT, "malformed"));
        match err {
            ImpostError::Database(text) => assert!(text.contains("malformed")),
            other => panic!("expected Database, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_memory_code() {
        let err = ImpostError::from_native(failure(rusqlite::ffi::SQLITE_NOMEM, "out of memory"));
        assert!(matches!(err, ImpostError::OutOfMemory));
    }
}
