//! Self-contained signed session tokens.
//!
//! A token is a CBOR claims bundle signed with Ed25519 under a domain
//! separation prefix, hex-encoded for transport. There is no server-side
//! session table: a token that verifies and has not expired is accepted.
//! There is also no revocation; removing a kid does not invalidate kid
//! tokens already in the wild before they expire.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use chorepoints_core::{KidId, ParentId};

use crate::error::{AuthError, Result};
use crate::principal::{Principal, Role};

/// Domain separation prefix for token signatures.
pub const SIGN_DOMAIN: &[u8] = b"chorepoints/session-sig/v1";

/// Default session lifetime: 8 hours.
pub const DEFAULT_SESSION_TTL_MS: i64 = 8 * 60 * 60 * 1000;

/// The signing identity of a deployment.
///
/// Wraps ed25519-dalek's SigningKey. One keypair signs every session token
/// the deployment issues.
#[derive(Clone)]
pub struct IssuerKeypair {
    signing_key: SigningKey,
}

impl IssuerKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The verifying half, for handing to a [`TokenVerifier`].
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl fmt::Debug for IssuerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IssuerKeypair({})",
            &hex::encode(self.verifying_key().to_bytes())[..16]
        )
    }
}

/// The claims carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub role: Role,
    pub parent_id: ParentId,
    /// Present iff `role == Kid`.
    pub kid_id: Option<KidId>,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl SessionClaims {
    /// Claims for a parent session.
    pub fn parent(parent_id: ParentId, now: i64, ttl_ms: i64) -> Self {
        Self {
            role: Role::Parent,
            parent_id,
            kid_id: None,
            issued_at: now,
            expires_at: now + ttl_ms,
        }
    }

    /// Claims for a kid session, bound to the owning parent.
    pub fn kid(kid_id: KidId, parent_id: ParentId, now: i64, ttl_ms: i64) -> Self {
        Self {
            role: Role::Kid,
            parent_id,
            kid_id: Some(kid_id),
            issued_at: now,
            expires_at: now + ttl_ms,
        }
    }

    /// Whether the claims have expired at the given time.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Resolve into a typed principal. Kid claims without a kid id are
    /// malformed and rejected.
    pub fn into_principal(self) -> Result<Principal> {
        match self.role {
            Role::Parent => Ok(Principal::Parent {
                parent_id: self.parent_id,
            }),
            Role::Kid => {
                let kid_id = self.kid_id.ok_or(AuthError::Unauthorized)?;
                Ok(Principal::Kid {
                    kid_id,
                    parent_id: self.parent_id,
                })
            }
        }
    }

    /// Serialize to CBOR bytes.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }
}

/// The signed wire envelope: claims bytes plus their signature.
#[derive(Serialize, Deserialize)]
struct TokenEnvelope {
    claims: Vec<u8>,
    signature: Vec<u8>,
}

/// An opaque bearer token string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    /// The wire form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Signs claims into tokens.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    keypair: IssuerKeypair,
}

impl TokenSigner {
    /// Create a signer from the deployment keypair.
    pub fn new(keypair: IssuerKeypair) -> Self {
        Self { keypair }
    }

    /// A verifier for tokens this signer issues.
    pub fn verifier(&self) -> TokenVerifier {
        TokenVerifier {
            verifying_key: self.keypair.verifying_key(),
        }
    }

    /// Sign claims into a transportable token.
    pub fn sign(&self, claims: &SessionClaims) -> SessionToken {
        let claims_bytes = claims.to_bytes();

        let mut message = Vec::with_capacity(SIGN_DOMAIN.len() + claims_bytes.len());
        message.extend_from_slice(SIGN_DOMAIN);
        message.extend_from_slice(&claims_bytes);
        let signature = self.keypair.sign(&message);

        let envelope = TokenEnvelope {
            claims: claims_bytes,
            signature: signature.to_bytes().to_vec(),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&envelope, &mut buf).expect("CBOR serialization failed");

        SessionToken(hex::encode(buf))
    }
}

/// Verifies tokens back into claims.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    verifying_key: VerifyingKey,
}

impl TokenVerifier {
    /// Create a verifier from a raw verifying key.
    pub fn new(verifying_key: VerifyingKey) -> Self {
        Self { verifying_key }
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Every failure mode - bad hex, bad CBOR, bad signature, expiry -
    /// collapses to `Unauthorized`; the caller learns nothing about which.
    pub fn verify(&self, token: &SessionToken, now: i64) -> Result<SessionClaims> {
        let raw = hex::decode(&token.0).map_err(|_| AuthError::Unauthorized)?;
        let envelope: TokenEnvelope =
            ciborium::from_reader(raw.as_slice()).map_err(|_| AuthError::Unauthorized)?;

        let signature = Signature::from_slice(&envelope.signature)
            .map_err(|_| AuthError::Unauthorized)?;

        let mut message = Vec::with_capacity(SIGN_DOMAIN.len() + envelope.claims.len());
        message.extend_from_slice(SIGN_DOMAIN);
        message.extend_from_slice(&envelope.claims);
        self.verifying_key
            .verify(&message, &signature)
            .map_err(|_| AuthError::Unauthorized)?;

        let claims: SessionClaims =
            ciborium::from_reader(envelope.claims.as_slice()).map_err(|_| AuthError::Unauthorized)?;

        if claims.is_expired(now) {
            return Err(AuthError::Unauthorized);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(IssuerKeypair::from_seed(&[0x42; 32]))
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = signer();
        let claims = SessionClaims::parent(ParentId::from_bytes([1; 16]), 1000, DEFAULT_SESSION_TTL_MS);
        let token = signer.sign(&claims);

        let verified = signer.verifier().verify(&token, 2000).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(
            verified.into_principal().unwrap(),
            Principal::Parent {
                parent_id: ParentId::from_bytes([1; 16])
            }
        );
    }

    #[test]
    fn test_kid_claims_resolve_with_family() {
        let signer = signer();
        let claims = SessionClaims::kid(
            KidId::from_bytes([3; 16]),
            ParentId::from_bytes([1; 16]),
            1000,
            DEFAULT_SESSION_TTL_MS,
        );
        let token = signer.sign(&claims);

        let principal = signer
            .verifier()
            .verify(&token, 2000)
            .unwrap()
            .into_principal()
            .unwrap();
        assert_eq!(
            principal,
            Principal::Kid {
                kid_id: KidId::from_bytes([3; 16]),
                parent_id: ParentId::from_bytes([1; 16]),
            }
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = signer();
        let claims = SessionClaims::parent(ParentId::ZERO, 1000, 500);
        let token = signer.sign(&claims);

        assert!(signer.verifier().verify(&token, 1499).is_ok());
        assert!(matches!(
            signer.verifier().verify(&token, 1500),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = signer();
        let claims = SessionClaims::parent(ParentId::ZERO, 1000, DEFAULT_SESSION_TTL_MS);
        let token = signer.sign(&claims);

        // Flip one hex digit.
        let mut s = token.0.clone();
        let i = s.len() / 2;
        let flipped = if &s[i..=i] == "0" { "1" } else { "0" };
        s.replace_range(i..=i, flipped);

        assert!(matches!(
            signer.verifier().verify(&SessionToken(s), 2000),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = signer();
        let other = TokenSigner::new(IssuerKeypair::from_seed(&[0x43; 32]));
        let claims = SessionClaims::parent(ParentId::ZERO, 1000, DEFAULT_SESSION_TTL_MS);
        let token = signer.sign(&claims);

        assert!(other.verifier().verify(&token, 2000).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_any_claims_roundtrip(
            parent_raw in proptest::array::uniform16(0u8..),
            kid_raw in proptest::option::of(proptest::array::uniform16(0u8..)),
            issued in 0i64..4_102_444_800_000,
            ttl in 1i64..1_000_000_000,
        ) {
            let signer = signer();
            let parent_id = ParentId::from_bytes(parent_raw);
            let claims = match kid_raw {
                Some(kid_raw) => {
                    SessionClaims::kid(KidId::from_bytes(kid_raw), parent_id, issued, ttl)
                }
                None => SessionClaims::parent(parent_id, issued, ttl),
            };

            let token = signer.sign(&claims);
            let verified = signer.verifier().verify(&token, issued).unwrap();
            proptest::prop_assert_eq!(verified, claims);
        }
    }

    #[test]
    fn test_garbage_tokens_rejected() {
        let verifier = signer().verifier();
        for garbage in ["", "zz", "deadbeef", "6162636465"] {
            assert!(matches!(
                verifier.verify(&SessionToken(garbage.to_string()), 0),
                Err(AuthError::Unauthorized)
            ));
        }
    }
}
