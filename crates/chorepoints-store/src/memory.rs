//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite but
//! keeps everything in memory with no persistence. The writer lock is held
//! for the full duration of every ledger write, which is what serializes
//! concurrent check-and-appends.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use chorepoints_core::{
    Kid, KidId, Parent, ParentId, PointTransaction, Redemption, RedemptionId, Reward, RewardId,
    Task, TaskId, TransactionDraft, TransactionId,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    BalanceAudit, CompletionOutcome, HistoryPage, ParentInsert, SpendOutcome, Store,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    parents: HashMap<ParentId, Parent>,
    usernames: HashMap<String, ParentId>,
    kids: HashMap<KidId, Kid>,
    tasks: HashMap<TaskId, Task>,
    rewards: HashMap<RewardId, Reward>,
    redemptions: HashMap<RedemptionId, Redemption>,
    transactions: HashMap<TransactionId, PointTransaction>,
    /// Append-order transaction ids per kid.
    ledger: HashMap<KidId, Vec<TransactionId>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    /// Append a ledger entry and move the balance. Caller holds the writer
    /// lock, so the read-then-write here is atomic.
    fn append(&mut self, draft: TransactionDraft, now: i64) -> Result<PointTransaction> {
        let kid = self
            .kids
            .get_mut(&draft.kid_id)
            .ok_or(StoreError::MissingKid(draft.kid_id))?;

        let next = kid.points_balance + draft.delta;
        if next < 0 {
            return Err(StoreError::NegativeBalance {
                kid_id: draft.kid_id,
            });
        }
        kid.points_balance = next;

        let tx = draft.into_transaction(now);
        self.ledger.entry(tx.kid_id).or_default().push(tx.id);
        self.transactions.insert(tx.id, tx.clone());

        debug!(kid = %tx.kid_id, delta = tx.delta, balance = next, "ledger append");
        Ok(tx)
    }

    fn balance_of(&self, kid_id: &KidId) -> Result<i64> {
        self.kids
            .get(kid_id)
            .map(|k| k.points_balance)
            .ok_or(StoreError::MissingKid(*kid_id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_parent(&self, parent: &Parent) -> Result<ParentInsert> {
        let mut inner = self.write()?;
        if inner.usernames.contains_key(&parent.username) {
            return Ok(ParentInsert::UsernameTaken);
        }
        inner.usernames.insert(parent.username.clone(), parent.id);
        inner.parents.insert(parent.id, parent.clone());
        Ok(ParentInsert::Inserted)
    }

    async fn get_parent(&self, id: &ParentId) -> Result<Option<Parent>> {
        Ok(self.read()?.parents.get(id).cloned())
    }

    async fn get_parent_by_username(&self, username: &str) -> Result<Option<Parent>> {
        let inner = self.read()?;
        Ok(inner
            .usernames
            .get(username)
            .and_then(|id| inner.parents.get(id))
            .cloned())
    }

    async fn insert_kid(&self, kid: &Kid) -> Result<()> {
        self.write()?.kids.insert(kid.id, kid.clone());
        Ok(())
    }

    async fn get_kid(&self, id: &KidId) -> Result<Option<Kid>> {
        Ok(self.read()?.kids.get(id).cloned())
    }

    async fn list_kids(&self, parent_id: &ParentId) -> Result<Vec<Kid>> {
        let inner = self.read()?;
        let mut kids: Vec<Kid> = inner
            .kids
            .values()
            .filter(|k| k.parent_id == *parent_id)
            .cloned()
            .collect();
        kids.sort_by_key(|k| (k.created_at, k.id));
        Ok(kids)
    }

    async fn kid_owner(&self, id: &KidId) -> Result<Option<ParentId>> {
        Ok(self.read()?.kids.get(id).map(|k| k.parent_id))
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        self.write()?.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.read()?.tasks.get(id).cloned())
    }

    async fn list_tasks(&self, kid_id: &KidId) -> Result<Vec<Task>> {
        let inner = self.read()?;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.kid_id == *kid_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| std::cmp::Reverse((t.created_at, t.id)));
        Ok(tasks)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<bool> {
        let mut inner = self.write()?;
        let existed = inner.tasks.remove(id).is_some();
        if existed {
            for tx in inner.transactions.values_mut() {
                if tx.task_ref == Some(*id) {
                    tx.task_ref = None;
                }
            }
        }
        Ok(existed)
    }

    async fn insert_reward(&self, reward: &Reward) -> Result<()> {
        self.write()?.rewards.insert(reward.id, reward.clone());
        Ok(())
    }

    async fn get_reward(&self, id: &RewardId) -> Result<Option<Reward>> {
        Ok(self.read()?.rewards.get(id).cloned())
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>> {
        let mut rewards: Vec<Reward> = self.read()?.rewards.values().cloned().collect();
        rewards.sort_by_key(|r| (r.created_at, r.id));
        Ok(rewards)
    }

    async fn delete_reward(&self, id: &RewardId) -> Result<bool> {
        let mut inner = self.write()?;
        let existed = inner.rewards.remove(id).is_some();
        if existed {
            for redemption in inner.redemptions.values_mut() {
                if redemption.reward_id == Some(*id) {
                    redemption.reward_id = None;
                }
            }
        }
        Ok(existed)
    }

    async fn get_redemption(&self, id: &RedemptionId) -> Result<Option<Redemption>> {
        Ok(self.read()?.redemptions.get(id).cloned())
    }

    async fn list_redemptions(&self, kid_id: &KidId) -> Result<Vec<Redemption>> {
        let inner = self.read()?;
        let mut rows: Vec<Redemption> = inner
            .redemptions
            .values()
            .filter(|r| r.kid_id == *kid_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse((r.redeemed_at, r.id)));
        Ok(rows)
    }

    async fn delete_redemption(&self, id: &RedemptionId) -> Result<bool> {
        let mut inner = self.write()?;
        let existed = inner.redemptions.remove(id).is_some();
        if existed {
            for tx in inner.transactions.values_mut() {
                if tx.redemption_ref == Some(*id) {
                    tx.redemption_ref = None;
                }
            }
        }
        Ok(existed)
    }

    async fn get_balance(&self, kid_id: &KidId) -> Result<i64> {
        self.read()?.balance_of(kid_id)
    }

    async fn get_history(
        &self,
        kid_id: &KidId,
        page: &HistoryPage,
    ) -> Result<Vec<PointTransaction>> {
        let inner = self.read()?;

        let mut rows: Vec<PointTransaction> = inner
            .ledger
            .get(kid_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.transactions.get(id))
            .cloned()
            .collect();
        rows.sort_by_key(|tx| std::cmp::Reverse((tx.created_at, tx.id)));

        let rows = rows
            .into_iter()
            .filter(|tx| match &page.before {
                None => true,
                Some(cursor) => {
                    (tx.created_at, tx.id) < (cursor.created_at, cursor.transaction_id)
                }
            })
            .take(page.limit)
            .collect();

        Ok(rows)
    }

    async fn append_transaction(&self, draft: TransactionDraft) -> Result<PointTransaction> {
        self.write()?.append(draft, now_millis())
    }

    async fn append_transaction_if_balance_at_least(
        &self,
        min_balance: i64,
        draft: TransactionDraft,
    ) -> Result<SpendOutcome> {
        let mut inner = self.write()?;

        let balance = inner.balance_of(&draft.kid_id)?;
        if balance < min_balance {
            return Ok(SpendOutcome::InsufficientBalance { balance });
        }

        let tx = inner.append(draft, now_millis())?;
        Ok(SpendOutcome::Applied(tx))
    }

    async fn commit_task_completion(
        &self,
        task_id: &TaskId,
        completed_at: i64,
        draft: TransactionDraft,
    ) -> Result<CompletionOutcome> {
        let mut inner = self.write()?;

        let mut task = inner
            .tasks
            .get(task_id)
            .cloned()
            .ok_or(StoreError::MissingTask(*task_id))?;

        if task.is_complete() {
            return Ok(CompletionOutcome::AlreadyComplete(task));
        }

        // Append first: it is the only step that can fail. The task row
        // update after it cannot, so the pair commits as a unit under the
        // writer lock.
        let transaction = inner.append(draft, now_millis())?;
        task.complete(completed_at);
        inner.tasks.insert(task.id, task.clone());

        Ok(CompletionOutcome::Completed { task, transaction })
    }

    async fn commit_redemption(
        &self,
        redemption: &Redemption,
        draft: TransactionDraft,
    ) -> Result<SpendOutcome> {
        let mut inner = self.write()?;

        let balance = inner.balance_of(&draft.kid_id)?;
        if balance < redemption.cost {
            return Ok(SpendOutcome::InsufficientBalance { balance });
        }

        let tx = inner.append(draft, now_millis())?;
        inner.redemptions.insert(redemption.id, redemption.clone());

        Ok(SpendOutcome::Applied(tx))
    }

    async fn audit_balance(&self, kid_id: &KidId) -> Result<BalanceAudit> {
        let inner = self.read()?;

        let materialized = inner.balance_of(kid_id)?;
        let recomputed = inner
            .ledger
            .get(kid_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.transactions.get(id))
            .map(|tx| tx.delta)
            .sum();

        Ok(BalanceAudit {
            kid_id: *kid_id,
            materialized,
            recomputed,
        })
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
    use chorepoints_core::TransactionKind;

    async fn seeded_kid(store: &MemoryStore) -> Kid {
        let parent = Parent::new("jo", "$argon2id$stub", "Jo", 0).unwrap();
        store.insert_parent(&parent).await.unwrap();
        let kid = Kid::new(parent.id, "Sam", 0).unwrap();
        store.insert_kid(&kid).await.unwrap();
        kid
    }

    #[tokio::test]
    async fn test_append_moves_balance() {
        let store = MemoryStore::new();
        let kid = seeded_kid(&store).await;

        let draft = TransactionDraft::new(kid.id, TransactionKind::Earn, 50, "chores").unwrap();
        store.append_transaction(draft).await.unwrap();

        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 50);
        let audit = store.audit_balance(&kid.id).await.unwrap();
        assert!(audit.is_consistent());
    }

    #[tokio::test]
    async fn test_unconditional_append_refuses_negative_balance() {
        let store = MemoryStore::new();
        let kid = seeded_kid(&store).await;

        let draft = TransactionDraft::new(kid.id, TransactionKind::Adjust, -10, "oops").unwrap();
        let err = store.append_transaction(draft).await.unwrap_err();
        assert!(matches!(err, StoreError::NegativeBalance { .. }));
        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_guarded_append_reports_balance() {
        let store = MemoryStore::new();
        let kid = seeded_kid(&store).await;

        let draft =
            TransactionDraft::new(kid.id, TransactionKind::Spend, -80, "too costly").unwrap();
        let outcome = store
            .append_transaction_if_balance_at_least(80, draft)
            .await
            .unwrap();
        assert_eq!(outcome, SpendOutcome::InsufficientBalance { balance: 0 });
        // Nothing written.
        let history = store
            .get_history(&kid.id, &HistoryPage::default())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_history_pages_restart_after_cursor() {
        let store = MemoryStore::new();
        let kid = seeded_kid(&store).await;

        for i in 0..5 {
            let draft =
                TransactionDraft::new(kid.id, TransactionKind::Earn, i, format!("t{}", i)).unwrap();
            store.append_transaction(draft).await.unwrap();
        }

        let first = store
            .get_history(&kid.id, &HistoryPage::first(2))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = store
            .get_history(&kid.id, &HistoryPage::after(&first[1], 10))
            .await
            .unwrap();
        assert_eq!(second.len(), 3);

        // No row appears in both pages.
        for tx in &second {
            assert!(first.iter().all(|f| f.id != tx.id));
        }
    }

    #[tokio::test]
    async fn test_delete_task_nulls_reference_only() {
        let store = MemoryStore::new();
        let kid = seeded_kid(&store).await;
        let task = Task::new(kid.id, kid.parent_id, "Brush Teeth", 50, 0).unwrap();
        store.insert_task(&task).await.unwrap();

        let draft =
            TransactionDraft::earn_for_task(kid.id, task.id, 50, "Completed task: Brush Teeth")
                .unwrap();
        store
            .commit_task_completion(&task.id, 100, draft)
            .await
            .unwrap();

        assert!(store.delete_task(&task.id).await.unwrap());

        let history = store
            .get_history(&kid.id, &HistoryPage::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].task_ref, None);
        assert_eq!(history[0].delta, 50);
        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 50);
    }
}
