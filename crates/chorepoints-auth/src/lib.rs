//! # chorepoints-auth
//!
//! Session tokens, typed principals, and credential hashing.
//!
//! Tokens are self-contained: CBOR claims signed with the deployment's
//! Ed25519 key and hex-encoded. Verification is pure given the verifying
//! key, so this crate needs no storage. The ownership-aware authorization
//! gate lives in the `chorepoints` crate, next to the store it consults.

pub mod error;
pub mod password;
pub mod principal;
pub mod token;

pub use error::{AuthError, Result};
pub use password::{hash_password, verify_password, DUMMY_HASH};
pub use principal::{require_role, Principal, Role};
pub use token::{
    IssuerKeypair, SessionClaims, SessionToken, TokenSigner, TokenVerifier,
    DEFAULT_SESSION_TTL_MS, SIGN_DOMAIN,
};
