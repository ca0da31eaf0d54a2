//! Error types for the chorepoints core.

use thiserror::Error;

/// Errors raised while constructing or transitioning domain values.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("malformed id: {0}")]
    MalformedId(String),

    #[error("task points must be non-negative, got {0}")]
    NegativeTaskPoints(i64),

    #[error("reward cost must be non-negative, got {0}")]
    NegativeRewardCost(i64),

    #[error("{kind:?} transaction has incoherent delta {delta}")]
    IncoherentDelta {
        kind: crate::ledger::TransactionKind,
        delta: i64,
    },

    #[error("note exceeds maximum length of {max} bytes")]
    NoteTooLong { max: usize },

    #[error("username must be non-empty")]
    EmptyUsername,

    #[error("display name must be non-empty")]
    EmptyDisplayName,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, DomainError>;
