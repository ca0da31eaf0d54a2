//! Error types for the store module.

use chorepoints_core::{KidId, TaskId};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A ledger operation referenced a kid that does not exist.
    #[error("no such kid: {0}")]
    MissingKid(KidId),

    /// A completion commit referenced a task that does not exist.
    #[error("no such task: {0}")]
    MissingTask(TaskId),

    /// An unconditional append would have driven a balance negative.
    #[error("append would make balance of kid {kid_id} negative")]
    NegativeBalance { kid_id: KidId },

    /// A row in storage failed to decode.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the store was poisoned.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// A blocking task could not be joined.
    #[error("blocking task failed: {0}")]
    Blocking(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
