//! Error types for the auth layer.

use chorepoints_core::KidId;
use thiserror::Error;

/// Errors raised by session issuance, token verification, and policy checks.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong password. Deliberately one variant for
    /// both, so callers cannot probe which usernames exist.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed, tampered, or expired token.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but the principal's role is not allowed here.
    #[error("forbidden")]
    Forbidden,

    /// The kid does not exist or is not owned by the caller. One variant
    /// for both, so ownership failures do not leak existence.
    #[error("unknown kid: {0}")]
    UnknownKid(KidId),

    /// The request is missing a required field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The password hasher itself failed (not a mismatch).
    #[error("credential hashing failed: {0}")]
    Hashing(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
