//! Store trait: the abstract interface for chorepoints persistence.
//!
//! This trait allows the workflows to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chorepoints_core::{
    Kid, KidId, Parent, ParentId, PointTransaction, Redemption, RedemptionId, Reward, RewardId,
    Task, TaskId, TransactionDraft,
};

use crate::error::Result;

/// Result of inserting a parent account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentInsert {
    /// Account was created.
    Inserted,
    /// Another account already holds this username.
    UsernameTaken,
}

/// Result of a guarded (check-and-append) ledger write.
#[derive(Debug, Clone, PartialEq)]
pub enum SpendOutcome {
    /// The balance check passed and the append committed.
    Applied(PointTransaction),
    /// The balance check failed; nothing was written.
    InsufficientBalance {
        /// The balance observed inside the atomic unit.
        balance: i64,
    },
}

/// Result of a task-completion commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The task transitioned and the award committed with it.
    Completed {
        task: Task,
        transaction: PointTransaction,
    },
    /// The task was already complete; nothing was written.
    AlreadyComplete(Task),
}

/// The materialized balance next to its recomputation from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAudit {
    pub kid_id: KidId,
    /// The O(1) field on the kid row.
    pub materialized: i64,
    /// `sum(delta)` over the kid's transactions.
    pub recomputed: i64,
}

impl BalanceAudit {
    /// Whether the ledger and the materialized balance agree.
    pub fn is_consistent(&self) -> bool {
        self.materialized == self.recomputed
    }
}

/// Cursor into a kid's time-descending history.
///
/// Carries the sort key of the last row already seen, so paging restarts
/// exactly after it even while new rows are being appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    pub created_at: i64,
    pub transaction_id: chorepoints_core::TransactionId,
}

/// One page of a kid's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    /// Maximum rows to return.
    pub limit: usize,
    /// Resume strictly after this cursor, or from the newest row if `None`.
    pub before: Option<HistoryCursor>,
}

impl HistoryPage {
    /// Default page size.
    pub const DEFAULT_LIMIT: usize = 50;

    /// The first page.
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            before: None,
        }
    }

    /// A page resuming after the given row.
    pub fn after(tx: &PointTransaction, limit: usize) -> Self {
        Self {
            limit,
            before: Some(HistoryCursor {
                created_at: tx.created_at,
                transaction_id: tx.id,
            }),
        }
    }
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}

/// The Store trait: async interface for chorepoints persistence.
///
/// # Design Notes
///
/// - **One privileged write path**: balances move only through
///   [`Store::append_transaction`], the guarded
///   [`Store::append_transaction_if_balance_at_least`], and the two commit
///   methods that wrap them. Everything else is plain CRUD.
/// - **Per-kid mutual exclusion**: implementations must make every
///   check-and-append on the same kid mutually exclusive with any other
///   append for that kid. The in-memory store holds its writer lock across
///   the whole operation; the SQLite store runs it inside one database
///   transaction on a serialized connection.
/// - **All-or-nothing commits**: [`Store::commit_task_completion`] and
///   [`Store::commit_redemption`] persist their row mutation and ledger
///   append in one atomic unit. A failure anywhere leaves no trace.
/// - **Soft references on delete**: deleting a task, reward, or redemption
///   nulls the reference fields on dependent rows; it never deletes or edits
///   a ledger entry.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Parent Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a parent account. Usernames are unique.
    async fn insert_parent(&self, parent: &Parent) -> Result<ParentInsert>;

    /// Get a parent by id.
    async fn get_parent(&self, id: &ParentId) -> Result<Option<Parent>>;

    /// Get a parent by username (login path).
    async fn get_parent_by_username(&self, username: &str) -> Result<Option<Parent>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Kid Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a kid.
    async fn insert_kid(&self, kid: &Kid) -> Result<()>;

    /// Get a kid by id.
    async fn get_kid(&self, id: &KidId) -> Result<Option<Kid>>;

    /// List a parent's kids.
    async fn list_kids(&self, parent_id: &ParentId) -> Result<Vec<Kid>>;

    /// The ownership index: which parent owns this kid, if the kid exists.
    async fn kid_owner(&self, id: &KidId) -> Result<Option<ParentId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Task Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a task.
    async fn insert_task(&self, task: &Task) -> Result<()>;

    /// Get a task by id.
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>>;

    /// List a kid's tasks, newest first.
    async fn list_tasks(&self, kid_id: &KidId) -> Result<Vec<Task>>;

    /// Delete a task, nulling `task_ref` on dependent transactions.
    ///
    /// Returns `true` if a row was deleted.
    async fn delete_task(&self, id: &TaskId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reward Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a reward.
    async fn insert_reward(&self, reward: &Reward) -> Result<()>;

    /// Get a reward by id.
    async fn get_reward(&self, id: &RewardId) -> Result<Option<Reward>>;

    /// List the reward catalog.
    async fn list_rewards(&self) -> Result<Vec<Reward>>;

    /// Delete a reward, nulling `reward_id` on dependent redemptions.
    ///
    /// Returns `true` if a row was deleted.
    async fn delete_reward(&self, id: &RewardId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Redemption Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a redemption by id.
    async fn get_redemption(&self, id: &RedemptionId) -> Result<Option<Redemption>>;

    /// List a kid's redemptions, newest first.
    async fn list_redemptions(&self, kid_id: &KidId) -> Result<Vec<Redemption>>;

    /// Delete a redemption, nulling `redemption_ref` on the dependent
    /// transaction. The Spend delta and note survive.
    ///
    /// Returns `true` if a row was deleted.
    async fn delete_redemption(&self, id: &RedemptionId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Read the materialized balance. O(1); never recomputed by summation.
    async fn get_balance(&self, kid_id: &KidId) -> Result<i64>;

    /// Read a page of the kid's history, time-descending.
    async fn get_history(&self, kid_id: &KidId, page: &HistoryPage)
        -> Result<Vec<PointTransaction>>;

    /// Append a ledger entry and move the materialized balance, atomically.
    ///
    /// Fails [`crate::StoreError::NegativeBalance`] rather than persist a
    /// negative balance; callers that expect to subtract must use the
    /// guarded variant.
    async fn append_transaction(&self, draft: TransactionDraft) -> Result<PointTransaction>;

    /// Check `balance >= min_balance` and append, as one atomic unit.
    ///
    /// This is the primitive that makes concurrent spends safe: the check
    /// and the append are indivisible, so two racing spends cannot both
    /// observe a sufficient balance.
    async fn append_transaction_if_balance_at_least(
        &self,
        min_balance: i64,
        draft: TransactionDraft,
    ) -> Result<SpendOutcome>;

    // ─────────────────────────────────────────────────────────────────────────
    // Workflow Commits
    // ─────────────────────────────────────────────────────────────────────────

    /// Transition a task to Complete and append its Earn, atomically.
    ///
    /// The state check runs inside the atomic unit, so racing completions of
    /// the same task award at most once; the loser sees
    /// [`CompletionOutcome::AlreadyComplete`].
    async fn commit_task_completion(
        &self,
        task_id: &TaskId,
        completed_at: i64,
        draft: TransactionDraft,
    ) -> Result<CompletionOutcome>;

    /// Insert a redemption and its guarded Spend, atomically.
    ///
    /// On an insufficient balance nothing is written, the redemption
    /// included.
    async fn commit_redemption(
        &self,
        redemption: &Redemption,
        draft: TransactionDraft,
    ) -> Result<SpendOutcome>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Recompute a kid's balance from the ledger and compare it against the
    /// materialized field. A consistency check, not a read path.
    async fn audit_balance(&self, kid_id: &KidId) -> Result<BalanceAudit>;
}
