//! Password hashing and verification using Argon2.
//!
//! Uses the argon2id variant with default parameters. Hashes are stored in
//! PHC string format, salt included.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{AuthError, Result};

/// A syntactically valid hash that matches no password.
///
/// Login verifies against this when the username is unknown, so the unknown
/// and wrong-password paths do the same amount of work.
pub const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Hash a password with a fresh random salt.
///
/// Returns the PHC-formatted string that includes the salt and parameters.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Verify a password against a stored hash.
///
/// Returns `Ok(true)` on a match. An unparseable hash is a hasher failure,
/// not a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
