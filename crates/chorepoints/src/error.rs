//! Error types for the service layer.

use chorepoints_auth::AuthError;
use chorepoints_core::DomainError;
use chorepoints_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the service workflows.
///
/// This is the complete user-visible taxonomy; [`ServiceError::code`] and
/// [`ServiceError::status`] give each kind its stable wire form.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Domain validation failed (bad points, bad cost, overlong note, ...).
    #[error("invalid input: {0}")]
    Domain(#[from] DomainError),

    /// Authorization failed (credentials, token, role, or ownership).
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The addressed entity does not exist (or is not visible to the
    /// caller, which must look identical).
    #[error("not found")]
    NotFound,

    /// The balance check inside a spend failed. Nothing was written.
    #[error("insufficient points: balance {balance}, needed {needed}")]
    InsufficientPoints { balance: i64, needed: i64 },

    /// Registration with a username that is already in use.
    #[error("username already taken")]
    UsernameTaken,

    /// Storage or commit failure. Details are logged, not surfaced.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Internal(e.to_string())
    }
}

impl ServiceError {
    /// Stable machine-readable code for the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Domain(_) => "bad_request",
            ServiceError::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            ServiceError::Auth(AuthError::Unauthorized) => "unauthorized",
            ServiceError::Auth(AuthError::Forbidden) => "forbidden",
            ServiceError::Auth(AuthError::UnknownKid(_)) => "unknown_kid",
            ServiceError::Auth(AuthError::BadRequest(_)) => "bad_request",
            ServiceError::Auth(AuthError::Hashing(_)) => "internal",
            ServiceError::NotFound => "not_found",
            ServiceError::InsufficientPoints { .. } => "insufficient_points",
            ServiceError::UsernameTaken => "username_taken",
            ServiceError::Internal(_) => "internal",
        }
    }

    /// Suggested HTTP status for the code.
    pub fn status(&self) -> u16 {
        match self.code() {
            "invalid_credentials" | "unauthorized" => 401,
            "forbidden" => 403,
            "unknown_kid" | "not_found" => 404,
            "bad_request" => 400,
            "insufficient_points" | "username_taken" => 409,
            _ => 500,
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chorepoints_core::KidId;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            ServiceError::Auth(AuthError::UnknownKid(KidId::ZERO)).code(),
            "unknown_kid"
        );
        assert_eq!(
            ServiceError::InsufficientPoints {
                balance: 10,
                needed: 80
            }
            .code(),
            "insufficient_points"
        );
        assert_eq!(ServiceError::NotFound.status(), 404);
        assert_eq!(
            ServiceError::Auth(AuthError::UnknownKid(KidId::ZERO)).status(),
            404
        );
    }
}
