//! Test fixtures and helpers.
//!
//! Common setup code for integration and property tests: an in-memory
//! service with a deterministic signing key, and seeded families.

use chorepoints::{Service, ServiceConfig};
use chorepoints_auth::{IssuerKeypair, Principal, SessionToken};
use chorepoints_core::{Kid, Reward, Task};
use chorepoints_store::MemoryStore;

/// A service over an in-memory store, plus the issuer keypair seed used.
pub struct TestFixture {
    pub service: Service<MemoryStore>,
}

impl TestFixture {
    /// Create a fixture with a random issuer keypair.
    pub fn new() -> Self {
        Self {
            service: Service::new(
                MemoryStore::new(),
                IssuerKeypair::generate(),
                ServiceConfig::default(),
            ),
        }
    }

    /// Create with a deterministic issuer keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            service: Service::new(
                MemoryStore::new(),
                IssuerKeypair::from_seed(&seed),
                ServiceConfig::default(),
            ),
        }
    }

    /// Register a parent with one kid and both principals resolved.
    pub async fn register_family(&self, username: &str) -> Family {
        let service = &self.service;
        service
            .register_parent(username, FIXTURE_PASSWORD, "The Parent")
            .await
            .expect("register fixture parent");
        let parent_token = service
            .login(username, FIXTURE_PASSWORD)
            .await
            .expect("login fixture parent");
        let parent = service
            .resolve_principal(&parent_token)
            .expect("resolve fixture parent");

        let kid = service
            .create_kid(&parent, "Fixture Kid")
            .await
            .expect("create fixture kid");
        let grant = service
            .issue_kid_session(&parent_token, kid.id)
            .await
            .expect("issue fixture kid session");
        let kid_principal = service
            .resolve_principal(&grant.token)
            .expect("resolve fixture kid");

        Family {
            parent,
            parent_token,
            kid,
            kid_token: grant.token,
            kid_principal,
        }
    }

    /// Create a pending task for the family's kid.
    pub async fn seed_task(&self, family: &Family, title: &str, points: i64) -> Task {
        self.service
            .create_task(&family.parent, family.kid.id, title, points)
            .await
            .expect("seed task")
    }

    /// Create a reward in the catalog.
    pub async fn seed_reward(&self, family: &Family, title: &str, cost: i64) -> Reward {
        self.service
            .create_reward(&family.parent, title, cost)
            .await
            .expect("seed reward")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The password every fixture parent registers with.
pub const FIXTURE_PASSWORD: &str = "fixture-password-with-length";

/// One seeded family: a parent, their token, and one kid with a session.
pub struct Family {
    pub parent: Principal,
    pub parent_token: SessionToken,
    pub kid: Kid,
    pub kid_token: SessionToken,
    pub kid_principal: Principal,
}

/// Create multiple independent families on one fixture.
pub async fn multi_family(fixture: &TestFixture, count: usize) -> Vec<Family> {
    let mut families = Vec::with_capacity(count);
    for i in 0..count {
        families.push(fixture.register_family(&format!("family-{}", i)).await);
    }
    families
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_family_is_usable() {
        let fixture = TestFixture::new();
        let family = fixture.register_family("fixture").await;

        let task = fixture.seed_task(&family, "Brush Teeth", 50).await;
        fixture
            .service
            .complete_task(&family.kid_principal, task.id, None)
            .await
            .unwrap();

        let balance = fixture
            .service
            .balance(&family.parent, Some(family.kid.id))
            .await
            .unwrap();
        assert_eq!(balance, 50);
    }

    #[tokio::test]
    async fn test_multi_family_is_isolated() {
        let fixture = TestFixture::new();
        let families = multi_family(&fixture, 3).await;

        // Each family has distinct principals and kids.
        assert_ne!(families[0].kid.id, families[1].kid.id);
        assert_ne!(families[1].parent, families[2].parent);

        // Cross-family access is refused.
        let err = fixture
            .service
            .balance(&families[0].parent, Some(families[1].kid.id))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unknown_kid");
    }
}
