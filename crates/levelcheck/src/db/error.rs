//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobId;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// An update addressed a record that does not exist.
    #[error("Job record {0} not found")]
    NotFound(JobId),

    /// The record changed since the caller read it.
    #[error("Job record {id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict { id: JobId, expected: i64, actual: i64 },

    /// The update would move the record's status backward.
    #[error("Job record {id} cannot move from '{from}' to '{to}'")]
    StatusRegression { id: JobId, from: String, to: String },

    /// The record violates a field/status consistency rule.
    #[error("Job record {id} is inconsistent: {reason}")]
    InvalidRecord { id: JobId, reason: String },

    /// A stored row could not be decoded.
    #[error("Stored row is invalid: {0}")]
    InvalidRow(String),
}

impl DatabaseError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlite(_)
                | DatabaseError::Io { .. }
                | DatabaseError::LockPoisoned
                | DatabaseError::VersionConflict { .. }
        )
    }
}
