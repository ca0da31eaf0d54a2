//! The authorization gate.
//!
//! Every workflow starts here: a bearer token becomes a typed
//! [`Principal`], and any kid-scoped request goes through
//! [`AuthorizationGate::resolve_effective_kid`] - the single chokepoint that
//! keeps one family out of another's data.

use std::sync::Arc;

use chorepoints_auth::{AuthError, Principal, SessionToken, TokenVerifier};
use chorepoints_core::KidId;
use chorepoints_store::Store;

use crate::error::Result;

/// Resolves tokens to principals and enforces ownership scoping.
pub struct AuthorizationGate<S> {
    store: Arc<S>,
    verifier: TokenVerifier,
}

impl<S: Store> AuthorizationGate<S> {
    /// Create a gate over the given store and token verifier.
    pub fn new(store: Arc<S>, verifier: TokenVerifier) -> Self {
        Self { store, verifier }
    }

    /// Verify a token and build the typed principal.
    ///
    /// The raw claims are dropped here; downstream code only ever sees the
    /// [`Principal`].
    pub fn resolve_principal(&self, token: &SessionToken) -> Result<Principal> {
        let claims = self.verifier.verify(token, now_millis())?;
        Ok(claims.into_principal()?)
    }

    /// Resolve which kid a request operates on.
    ///
    /// - A Kid principal always acts on itself; any requested id is ignored.
    /// - A Parent principal must name a kid (`BadRequest` otherwise) and
    ///   must own it (`UnknownKid` otherwise - whether the kid belongs to
    ///   someone else or does not exist at all).
    pub async fn resolve_effective_kid(
        &self,
        principal: &Principal,
        requested_kid_id: Option<KidId>,
    ) -> Result<KidId> {
        match principal {
            Principal::Kid { kid_id, .. } => Ok(*kid_id),
            Principal::Parent { parent_id } => {
                let requested = requested_kid_id
                    .ok_or_else(|| AuthError::BadRequest("kid id is required".into()))?;

                match self.store.kid_owner(&requested).await? {
                    Some(owner) if owner == *parent_id => Ok(requested),
                    _ => Err(AuthError::UnknownKid(requested).into()),
                }
            }
        }
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorepoints_auth::{IssuerKeypair, TokenSigner};
    use chorepoints_core::{Kid, Parent, ParentId};
    use chorepoints_store::MemoryStore;

    use crate::error::ServiceError;

    async fn gate_with_family() -> (AuthorizationGate<MemoryStore>, ParentId, KidId) {
        let store = Arc::new(MemoryStore::new());
        let parent = Parent::new("jo", "$argon2id$stub", "Jo", 0).unwrap();
        store.insert_parent(&parent).await.unwrap();
        let kid = Kid::new(parent.id, "Sam", 0).unwrap();
        store.insert_kid(&kid).await.unwrap();

        let signer = TokenSigner::new(IssuerKeypair::from_seed(&[7; 32]));
        let gate = AuthorizationGate::new(store, signer.verifier());
        (gate, parent.id, kid.id)
    }

    #[tokio::test]
    async fn test_kid_principal_ignores_requested_id() {
        let (gate, parent_id, kid_id) = gate_with_family().await;
        let principal = Principal::Kid { kid_id, parent_id };

        let other = KidId::generate();
        let resolved = gate
            .resolve_effective_kid(&principal, Some(other))
            .await
            .unwrap();
        assert_eq!(resolved, kid_id);
    }

    #[tokio::test]
    async fn test_parent_must_name_a_kid() {
        let (gate, parent_id, _) = gate_with_family().await;
        let principal = Principal::Parent { parent_id };

        let err = gate.resolve_effective_kid(&principal, None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Auth(AuthError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_kid_is_unknown() {
        let (gate, _, kid_id) = gate_with_family().await;
        let stranger = Principal::Parent {
            parent_id: ParentId::generate(),
        };

        let err = gate
            .resolve_effective_kid(&stranger, Some(kid_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Auth(AuthError::UnknownKid(_))));

        // A kid that does not exist at all looks exactly the same.
        let missing = KidId::generate();
        let err = gate
            .resolve_effective_kid(&stranger, Some(missing))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Auth(AuthError::UnknownKid(_))));
    }

    #[tokio::test]
    async fn test_owner_resolves_own_kid() {
        let (gate, parent_id, kid_id) = gate_with_family().await;
        let principal = Principal::Parent { parent_id };

        let resolved = gate
            .resolve_effective_kid(&principal, Some(kid_id))
            .await
            .unwrap();
        assert_eq!(resolved, kid_id);
    }
}
