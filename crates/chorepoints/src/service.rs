//! The chorepoints service: every workflow behind one API.
//!
//! The service owns the store, the token signer, and the authorization
//! gate. Every operation follows the same order: resolve the principal,
//! scope to an effective kid where one is involved, then run the mutation
//! as a single atomic store commit. Balances are never touched except
//! through the ledger append primitives.

use std::sync::Arc;

use tracing::{info, warn};

use chorepoints_auth::{
    hash_password, require_role, verify_password, AuthError, IssuerKeypair, Principal, Role,
    SessionClaims, SessionToken, TokenSigner, DEFAULT_SESSION_TTL_MS, DUMMY_HASH,
};
use chorepoints_core::{
    Kid, KidId, Parent, PointTransaction, Redemption, RedemptionId, Reward, RewardId, Task, TaskId,
    TransactionDraft, TransactionKind,
};
use chorepoints_store::{
    BalanceAudit, CompletionOutcome, HistoryPage, ParentInsert, SpendOutcome, Store,
};

use crate::error::{Result, ServiceError};
use crate::gate::AuthorizationGate;

/// Configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Session token lifetime in milliseconds.
    pub session_ttl_ms: i64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
        }
    }
}

/// A kid session handed back to the parent who requested it.
#[derive(Debug, Clone)]
pub struct KidSessionGrant {
    pub token: SessionToken,
    pub kid_id: KidId,
    pub display_name: String,
}

/// The main service struct.
///
/// Generic over the storage backend; one instance serves all families.
pub struct Service<S: Store> {
    store: Arc<S>,
    signer: TokenSigner,
    gate: AuthorizationGate<S>,
    config: ServiceConfig,
}

impl<S: Store> Service<S> {
    /// Create a new service instance.
    pub fn new(store: S, keypair: IssuerKeypair, config: ServiceConfig) -> Self {
        let store = Arc::new(store);
        let signer = TokenSigner::new(keypair);
        let gate = AuthorizationGate::new(Arc::clone(&store), signer.verifier());
        Self {
            store,
            signer,
            gate,
            config,
        }
    }

    /// The storage backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The authorization gate.
    pub fn gate(&self) -> &AuthorizationGate<S> {
        &self.gate
    }

    /// Resolve a bearer token into a typed principal.
    pub fn resolve_principal(&self, token: &SessionToken) -> Result<Principal> {
        self.gate.resolve_principal(token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a parent account.
    pub async fn register_parent(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Parent> {
        let credential_hash = hash_password(password)?;
        let parent = Parent::new(username, credential_hash, display_name, now_millis())?;

        match self.store.insert_parent(&parent).await? {
            ParentInsert::Inserted => {
                info!(parent = %parent.id, "parent registered");
                Ok(parent)
            }
            ParentInsert::UsernameTaken => Err(ServiceError::UsernameTaken),
        }
    }

    /// Verify a parent credential and mint a session token.
    ///
    /// Unknown username and wrong password are the same error, and both
    /// paths run one argon2 verification.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionToken> {
        match self.store.get_parent_by_username(username).await? {
            Some(parent) => {
                if verify_password(password, &parent.credential_hash)? {
                    let claims =
                        SessionClaims::parent(parent.id, now_millis(), self.config.session_ttl_ms);
                    info!(parent = %parent.id, "parent session issued");
                    Ok(self.signer.sign(&claims))
                } else {
                    warn!(username, "login rejected");
                    Err(AuthError::InvalidCredentials.into())
                }
            }
            None => {
                let _ = verify_password(password, DUMMY_HASH)?;
                warn!(username, "login rejected");
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }

    /// Mint a kid-scoped token on a parent's behalf.
    ///
    /// The caller must be a Parent principal (`Unauthorized` otherwise) that
    /// owns the kid (`UnknownKid` otherwise). The issued token stays valid
    /// until it expires; there is no revocation.
    pub async fn issue_kid_session(
        &self,
        caller_token: &SessionToken,
        kid_id: KidId,
    ) -> Result<KidSessionGrant> {
        let principal = self.gate.resolve_principal(caller_token)?;
        let parent_id = match principal {
            Principal::Parent { parent_id } => parent_id,
            Principal::Kid { .. } => return Err(AuthError::Unauthorized.into()),
        };

        match self.store.kid_owner(&kid_id).await? {
            Some(owner) if owner == parent_id => {}
            _ => return Err(AuthError::UnknownKid(kid_id).into()),
        }
        let kid = self
            .store
            .get_kid(&kid_id)
            .await?
            .ok_or(AuthError::UnknownKid(kid_id))?;

        let claims =
            SessionClaims::kid(kid_id, parent_id, now_millis(), self.config.session_ttl_ms);
        info!(parent = %parent_id, kid = %kid_id, "kid session issued");

        Ok(KidSessionGrant {
            token: self.signer.sign(&claims),
            kid_id,
            display_name: kid.display_name,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Kids
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a kid in the caller's family.
    pub async fn create_kid(&self, principal: &Principal, display_name: &str) -> Result<Kid> {
        require_role(principal, &[Role::Parent])?;

        let kid = Kid::new(principal.parent_id(), display_name, now_millis())?;
        self.store.insert_kid(&kid).await?;
        info!(parent = %kid.parent_id, kid = %kid.id, "kid created");
        Ok(kid)
    }

    /// List the caller's kids.
    pub async fn list_kids(&self, principal: &Principal) -> Result<Vec<Kid>> {
        require_role(principal, &[Role::Parent])?;
        Ok(self.store.list_kids(&principal.parent_id()).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────────────────────────────────────

    /// Assign a task to one of the caller's kids.
    pub async fn create_task(
        &self,
        principal: &Principal,
        kid_id: KidId,
        title: &str,
        points: i64,
    ) -> Result<Task> {
        require_role(principal, &[Role::Parent])?;
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, Some(kid_id))
            .await?;

        let task = Task::new(kid_id, principal.parent_id(), title, points, now_millis())?;
        self.store.insert_task(&task).await?;
        info!(kid = %kid_id, task = %task.id, points, "task created");
        Ok(task)
    }

    /// List tasks for the effective kid.
    pub async fn list_tasks(
        &self,
        principal: &Principal,
        requested_kid_id: Option<KidId>,
    ) -> Result<Vec<Task>> {
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, requested_kid_id)
            .await?;
        Ok(self.store.list_tasks(&kid_id).await?)
    }

    /// Complete a task and award its points, exactly once.
    ///
    /// Callable by the assigned kid, or by the owning parent on the kid's
    /// behalf. Completing an already-complete task returns it unchanged.
    pub async fn complete_task(
        &self,
        principal: &Principal,
        task_id: TaskId,
        requested_kid_id: Option<KidId>,
    ) -> Result<Task> {
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, requested_kid_id)
            .await?;

        let task = self
            .store
            .get_task(&task_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        if task.kid_id != kid_id {
            // A task assigned to someone else's kid is indistinguishable
            // from a task that does not exist.
            return Err(ServiceError::NotFound);
        }

        if task.is_complete() {
            return Ok(task);
        }

        let draft = TransactionDraft::earn_for_task(
            kid_id,
            task.id,
            task.points,
            format!("Completed task: {}", task.title),
        )?;

        match self
            .store
            .commit_task_completion(&task.id, now_millis(), draft)
            .await?
        {
            CompletionOutcome::Completed { task, transaction } => {
                info!(kid = %kid_id, task = %task.id, delta = transaction.delta, "task completed");
                Ok(task)
            }
            // Lost a race against a concurrent completion; the award
            // happened exactly once over there.
            CompletionOutcome::AlreadyComplete(task) => Ok(task),
        }
    }

    /// Delete a task. The ledger keeps any Earn it caused, with the task
    /// reference nulled.
    pub async fn delete_task(&self, principal: &Principal, task_id: TaskId) -> Result<()> {
        require_role(principal, &[Role::Parent])?;

        let task = self
            .store
            .get_task(&task_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        // Another family's task must look exactly like a missing one.
        if self
            .gate
            .resolve_effective_kid(principal, Some(task.kid_id))
            .await
            .is_err()
        {
            return Err(ServiceError::NotFound);
        }

        if self.store.delete_task(&task_id).await? {
            info!(task = %task_id, "task deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rewards
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a reward to the global catalog.
    pub async fn create_reward(
        &self,
        principal: &Principal,
        title: &str,
        cost: i64,
    ) -> Result<Reward> {
        require_role(principal, &[Role::Parent])?;

        let reward = Reward::new(title, cost, now_millis())?;
        self.store.insert_reward(&reward).await?;
        info!(reward = %reward.id, cost, "reward created");
        Ok(reward)
    }

    /// List the reward catalog. Any authenticated principal may browse.
    pub async fn list_rewards(&self, _principal: &Principal) -> Result<Vec<Reward>> {
        Ok(self.store.list_rewards().await?)
    }

    /// Delete a reward. Existing redemptions keep their snapshot of it.
    pub async fn delete_reward(&self, principal: &Principal, reward_id: RewardId) -> Result<()> {
        require_role(principal, &[Role::Parent])?;

        if self.store.delete_reward(&reward_id).await? {
            info!(reward = %reward_id, "reward deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Redemptions
    // ─────────────────────────────────────────────────────────────────────────

    /// Redeem a reward for the calling kid.
    ///
    /// Self-service only: a Parent principal gets `BadRequest` from the
    /// gate, because no kid id is passed through. The balance check and the
    /// Spend append are one atomic unit, so concurrent redemptions for the
    /// same kid cannot both succeed past the balance.
    pub async fn redeem(&self, principal: &Principal, reward_id: RewardId) -> Result<Redemption> {
        let kid_id = self.gate.resolve_effective_kid(principal, None).await?;

        let reward = self
            .store
            .get_reward(&reward_id)
            .await?
            .ok_or(ServiceError::NotFound)?;

        let redemption = Redemption::new(kid_id, &reward, now_millis());
        let draft = TransactionDraft::spend_for_redemption(
            kid_id,
            redemption.id,
            reward.cost,
            format!("Redeemed reward: {}", reward.title),
        )?;

        match self.store.commit_redemption(&redemption, draft).await? {
            SpendOutcome::Applied(transaction) => {
                info!(
                    kid = %kid_id,
                    reward = %reward.id,
                    delta = transaction.delta,
                    "reward redeemed"
                );
                Ok(redemption)
            }
            SpendOutcome::InsufficientBalance { balance } => {
                warn!(kid = %kid_id, reward = %reward.id, balance, cost = reward.cost, "redemption rejected");
                Err(ServiceError::InsufficientPoints {
                    balance,
                    needed: reward.cost,
                })
            }
        }
    }

    /// List redemptions for the effective kid.
    pub async fn list_redemptions(
        &self,
        principal: &Principal,
        requested_kid_id: Option<KidId>,
    ) -> Result<Vec<Redemption>> {
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, requested_kid_id)
            .await?;
        Ok(self.store.list_redemptions(&kid_id).await?)
    }

    /// Delete a redemption record. The Spend it caused stays on the ledger
    /// with its reference nulled.
    pub async fn delete_redemption(
        &self,
        principal: &Principal,
        redemption_id: RedemptionId,
    ) -> Result<()> {
        require_role(principal, &[Role::Parent])?;

        let redemption = self
            .store
            .get_redemption(&redemption_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        // Another family's redemption must look exactly like a missing one.
        if self
            .gate
            .resolve_effective_kid(principal, Some(redemption.kid_id))
            .await
            .is_err()
        {
            return Err(ServiceError::NotFound);
        }

        if self.store.delete_redemption(&redemption_id).await? {
            info!(redemption = %redemption_id, "redemption deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Read the effective kid's balance. O(1) on the materialized field.
    pub async fn balance(
        &self,
        principal: &Principal,
        requested_kid_id: Option<KidId>,
    ) -> Result<i64> {
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, requested_kid_id)
            .await?;
        Ok(self.store.get_balance(&kid_id).await?)
    }

    /// Read a page of the effective kid's history, newest first.
    pub async fn history(
        &self,
        principal: &Principal,
        requested_kid_id: Option<KidId>,
        page: HistoryPage,
    ) -> Result<Vec<PointTransaction>> {
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, requested_kid_id)
            .await?;
        Ok(self.store.get_history(&kid_id, &page).await?)
    }

    /// Manually adjust a kid's points.
    ///
    /// Parent-only. A negative adjustment goes through the guarded append,
    /// so it can never drive the balance below zero.
    pub async fn adjust_points(
        &self,
        principal: &Principal,
        kid_id: KidId,
        delta: i64,
        note: &str,
    ) -> Result<PointTransaction> {
        require_role(principal, &[Role::Parent])?;
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, Some(kid_id))
            .await?;

        let draft = TransactionDraft::new(kid_id, TransactionKind::Adjust, delta, note)?;

        if delta < 0 {
            match self
                .store
                .append_transaction_if_balance_at_least(-delta, draft)
                .await?
            {
                SpendOutcome::Applied(tx) => {
                    info!(kid = %kid_id, delta, "points adjusted");
                    Ok(tx)
                }
                SpendOutcome::InsufficientBalance { balance } => {
                    Err(ServiceError::InsufficientPoints {
                        balance,
                        needed: -delta,
                    })
                }
            }
        } else {
            let tx = self.store.append_transaction(draft).await?;
            info!(kid = %kid_id, delta, "points adjusted");
            Ok(tx)
        }
    }

    /// Recompute the effective kid's balance from the ledger and compare
    /// against the materialized field.
    pub async fn audit_balance(
        &self,
        principal: &Principal,
        requested_kid_id: Option<KidId>,
    ) -> Result<BalanceAudit> {
        let kid_id = self
            .gate
            .resolve_effective_kid(principal, requested_kid_id)
            .await?;
        Ok(self.store.audit_balance(&kid_id).await?)
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
