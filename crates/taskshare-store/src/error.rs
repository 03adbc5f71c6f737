//! Error types for the store module.
//!
//! Only genuine storage faults are errors. Domain outcomes such as a
//! duplicate request or a full grant list are reported through the result
//! enums in [`crate::traits`].

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store is temporarily unable to serve the call; retrying may succeed.
    #[error("store busy: {0}")]
    Busy(String),

    /// A stored value could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A directory insert collided with an existing row.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A lock guarding in-process state was poisoned by a panic.
    #[error("store lock poisoned")]
    Poisoned,

    /// The blocking worker running a SQLite call panicked or was cancelled.
    #[error("store worker failed: {0}")]
    Worker(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the caller may retry the same call.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Busy(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<taskshare_core::CoreError> for StoreError {
    fn from(e: taskshare_core::CoreError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Busy("spawn_blocking".into()).is_transient());

        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StoreError::Database(busy).is_transient());

        assert!(!StoreError::InvalidData("x".into()).is_transient());
        assert!(!StoreError::Poisoned.is_transient());
    }
}
