//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for chorepoints. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking. The
//! connection is serialized behind a mutex, and every multi-effect write
//! runs inside a single database transaction, which together give the
//! per-kid check-and-append atomicity the ledger requires.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use chorepoints_core::{
    Kid, KidId, Parent, ParentId, PointTransaction, Redemption, RedemptionId, Reward, RewardId,
    Task, TaskId, TaskState, TransactionDraft, TransactionId, TransactionKind,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    BalanceAudit, CompletionOutcome, HistoryPage, ParentInsert, SpendOutcome, Store,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking to
/// avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn blob16(bytes: Vec<u8>, col: &str) -> rusqlite::Result<[u8; 16]> {
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, col.to_string(), rusqlite::types::Type::Blob)
    })
}

fn opt_blob16(bytes: Option<Vec<u8>>, col: &str) -> rusqlite::Result<Option<[u8; 16]>> {
    bytes.map(|b| blob16(b, col)).transpose()
}

fn row_to_parent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Parent> {
    Ok(Parent {
        id: ParentId::from_bytes(blob16(row.get("parent_id")?, "parent_id")?),
        username: row.get("username")?,
        credential_hash: row.get("credential_hash")?,
        display_name: row.get("display_name")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_kid(row: &rusqlite::Row<'_>) -> rusqlite::Result<Kid> {
    Ok(Kid {
        id: KidId::from_bytes(blob16(row.get("kid_id")?, "kid_id")?),
        parent_id: ParentId::from_bytes(blob16(row.get("parent_id")?, "parent_id")?),
        display_name: row.get("display_name")?,
        points_balance: row.get("points_balance")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let state_raw: u8 = row.get("state")?;
    let state = TaskState::from_u8(state_raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, "state".to_string(), rusqlite::types::Type::Integer)
    })?;

    Ok(Task {
        id: TaskId::from_bytes(blob16(row.get("task_id")?, "task_id")?),
        kid_id: KidId::from_bytes(blob16(row.get("kid_id")?, "kid_id")?),
        created_by: ParentId::from_bytes(blob16(row.get("created_by")?, "created_by")?),
        title: row.get("title")?,
        points: row.get("points")?,
        state,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_reward(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reward> {
    Ok(Reward {
        id: RewardId::from_bytes(blob16(row.get("reward_id")?, "reward_id")?),
        title: row.get("title")?,
        cost: row.get("cost")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_redemption(row: &rusqlite::Row<'_>) -> rusqlite::Result<Redemption> {
    Ok(Redemption {
        id: RedemptionId::from_bytes(blob16(row.get("redemption_id")?, "redemption_id")?),
        kid_id: KidId::from_bytes(blob16(row.get("kid_id")?, "kid_id")?),
        reward_id: opt_blob16(row.get("reward_id")?, "reward_id")?.map(RewardId::from_bytes),
        reward_title: row.get("reward_title")?,
        cost: row.get("cost")?,
        redeemed_at: row.get("redeemed_at")?,
    })
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<PointTransaction> {
    let kind_raw: u8 = row.get("kind")?;
    let kind = TransactionKind::from_u8(kind_raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, "kind".to_string(), rusqlite::types::Type::Integer)
    })?;

    Ok(PointTransaction {
        id: TransactionId::from_bytes(blob16(row.get("transaction_id")?, "transaction_id")?),
        kid_id: KidId::from_bytes(blob16(row.get("kid_id")?, "kid_id")?),
        kind,
        delta: row.get("delta")?,
        task_ref: opt_blob16(row.get("task_id")?, "task_id")?.map(TaskId::from_bytes),
        redemption_ref: opt_blob16(row.get("redemption_id")?, "redemption_id")?
            .map(RedemptionId::from_bytes),
        note: row.get("note")?,
        created_at: row.get("created_at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Write primitives (run inside a database transaction)
// ─────────────────────────────────────────────────────────────────────────────

/// Read the balance inside the given transaction.
fn balance_in_tx(tx: &rusqlite::Transaction<'_>, kid_id: &KidId) -> Result<i64> {
    tx.query_row(
        "SELECT points_balance FROM kids WHERE kid_id = ?1",
        params![kid_id.as_bytes().as_slice()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(StoreError::MissingKid(*kid_id))
}

/// Insert a ledger row and move the balance, inside the given transaction.
fn append_in_tx(
    tx: &rusqlite::Transaction<'_>,
    draft: TransactionDraft,
    now: i64,
) -> Result<PointTransaction> {
    let balance = balance_in_tx(tx, &draft.kid_id)?;
    let next = balance + draft.delta;
    if next < 0 {
        return Err(StoreError::NegativeBalance {
            kid_id: draft.kid_id,
        });
    }

    let rec = draft.into_transaction(now);
    tx.execute(
        "INSERT INTO point_transactions (
            transaction_id, kid_id, kind, delta, task_id, redemption_id, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            rec.id.as_bytes().as_slice(),
            rec.kid_id.as_bytes().as_slice(),
            rec.kind.to_u8(),
            rec.delta,
            rec.task_ref.as_ref().map(|id| id.as_bytes().as_slice()),
            rec.redemption_ref.as_ref().map(|id| id.as_bytes().as_slice()),
            &rec.note,
            rec.created_at,
        ],
    )?;
    tx.execute(
        "UPDATE kids SET points_balance = ?2 WHERE kid_id = ?1",
        params![rec.kid_id.as_bytes().as_slice(), next],
    )?;

    debug!(kid = %rec.kid_id, delta = rec.delta, balance = next, "ledger append");
    Ok(rec)
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_parent(&self, parent: &Parent) -> Result<ParentInsert> {
        let parent = parent.clone();
        self.with_conn(move |conn| {
            let taken: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM parents WHERE username = ?1",
                    params![&parent.username],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Ok(ParentInsert::UsernameTaken);
            }

            conn.execute(
                "INSERT INTO parents (parent_id, username, credential_hash, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    parent.id.as_bytes().as_slice(),
                    &parent.username,
                    &parent.credential_hash,
                    &parent.display_name,
                    parent.created_at,
                ],
            )?;
            Ok(ParentInsert::Inserted)
        })
        .await
    }

    async fn get_parent(&self, id: &ParentId) -> Result<Option<Parent>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT parent_id, username, credential_hash, display_name, created_at
                 FROM parents WHERE parent_id = ?1",
                params![id.as_bytes().as_slice()],
                row_to_parent,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_parent_by_username(&self, username: &str) -> Result<Option<Parent>> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT parent_id, username, credential_hash, display_name, created_at
                 FROM parents WHERE username = ?1",
                params![&username],
                row_to_parent,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn insert_kid(&self, kid: &Kid) -> Result<()> {
        let kid = kid.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kids (kid_id, parent_id, display_name, points_balance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    kid.id.as_bytes().as_slice(),
                    kid.parent_id.as_bytes().as_slice(),
                    &kid.display_name,
                    kid.points_balance,
                    kid.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_kid(&self, id: &KidId) -> Result<Option<Kid>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT kid_id, parent_id, display_name, points_balance, created_at
                 FROM kids WHERE kid_id = ?1",
                params![id.as_bytes().as_slice()],
                row_to_kid,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_kids(&self, parent_id: &ParentId) -> Result<Vec<Kid>> {
        let parent_id = *parent_id;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT kid_id, parent_id, display_name, points_balance, created_at
                 FROM kids WHERE parent_id = ?1
                 ORDER BY created_at, kid_id",
            )?;
            let kids = stmt
                .query_map(params![parent_id.as_bytes().as_slice()], row_to_kid)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(kids)
        })
        .await
    }

    async fn kid_owner(&self, id: &KidId) -> Result<Option<ParentId>> {
        let id = *id;
        self.with_conn(move |conn| {
            let owner: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT parent_id FROM kids WHERE kid_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            owner
                .map(|b| blob16(b, "parent_id").map(ParentId::from_bytes))
                .transpose()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (task_id, kid_id, created_by, title, points, state, completed_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.id.as_bytes().as_slice(),
                    task.kid_id.as_bytes().as_slice(),
                    task.created_by.as_bytes().as_slice(),
                    &task.title,
                    task.points,
                    task.state.to_u8(),
                    task.completed_at,
                    task.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT task_id, kid_id, created_by, title, points, state, completed_at, created_at
                 FROM tasks WHERE task_id = ?1",
                params![id.as_bytes().as_slice()],
                row_to_task,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_tasks(&self, kid_id: &KidId) -> Result<Vec<Task>> {
        let kid_id = *kid_id;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT task_id, kid_id, created_by, title, points, state, completed_at, created_at
                 FROM tasks WHERE kid_id = ?1
                 ORDER BY created_at DESC, task_id DESC",
            )?;
            let tasks = stmt
                .query_map(params![kid_id.as_bytes().as_slice()], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
        .await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<bool> {
        let id = *id;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE point_transactions SET task_id = NULL WHERE task_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            let deleted = tx.execute(
                "DELETE FROM tasks WHERE task_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_reward(&self, reward: &Reward) -> Result<()> {
        let reward = reward.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO rewards (reward_id, title, cost, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    reward.id.as_bytes().as_slice(),
                    &reward.title,
                    reward.cost,
                    reward.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_reward(&self, id: &RewardId) -> Result<Option<Reward>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT reward_id, title, cost, created_at FROM rewards WHERE reward_id = ?1",
                params![id.as_bytes().as_slice()],
                row_to_reward,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT reward_id, title, cost, created_at FROM rewards
                 ORDER BY created_at, reward_id",
            )?;
            let rewards = stmt
                .query_map([], row_to_reward)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rewards)
        })
        .await
    }

    async fn delete_reward(&self, id: &RewardId) -> Result<bool> {
        let id = *id;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE redemptions SET reward_id = NULL WHERE reward_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            let deleted = tx.execute(
                "DELETE FROM rewards WHERE reward_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn get_redemption(&self, id: &RedemptionId) -> Result<Option<Redemption>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT redemption_id, kid_id, reward_id, reward_title, cost, redeemed_at
                 FROM redemptions WHERE redemption_id = ?1",
                params![id.as_bytes().as_slice()],
                row_to_redemption,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_redemptions(&self, kid_id: &KidId) -> Result<Vec<Redemption>> {
        let kid_id = *kid_id;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT redemption_id, kid_id, reward_id, reward_title, cost, redeemed_at
                 FROM redemptions WHERE kid_id = ?1
                 ORDER BY redeemed_at DESC, redemption_id DESC",
            )?;
            let rows = stmt
                .query_map(params![kid_id.as_bytes().as_slice()], row_to_redemption)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn delete_redemption(&self, id: &RedemptionId) -> Result<bool> {
        let id = *id;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE point_transactions SET redemption_id = NULL WHERE redemption_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            let deleted = tx.execute(
                "DELETE FROM redemptions WHERE redemption_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn get_balance(&self, kid_id: &KidId) -> Result<i64> {
        let kid_id = *kid_id;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT points_balance FROM kids WHERE kid_id = ?1",
                params![kid_id.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::MissingKid(kid_id))
        })
        .await
    }

    async fn get_history(
        &self,
        kid_id: &KidId,
        page: &HistoryPage,
    ) -> Result<Vec<PointTransaction>> {
        let kid_id = *kid_id;
        let page = *page;
        self.with_conn(move |conn| {
            let rows = if let Some(cursor) = page.before {
                let mut stmt = conn.prepare(
                    "SELECT transaction_id, kid_id, kind, delta, task_id, redemption_id, note, created_at
                     FROM point_transactions
                     WHERE kid_id = ?1
                       AND (created_at < ?2
                            OR (created_at = ?2 AND transaction_id < ?3))
                     ORDER BY created_at DESC, transaction_id DESC
                     LIMIT ?4",
                )?;
                let out = stmt
                    .query_map(
                        params![
                            kid_id.as_bytes().as_slice(),
                            cursor.created_at,
                            cursor.transaction_id.as_bytes().as_slice(),
                            page.limit as i64,
                        ],
                        row_to_transaction,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out
            } else {
                let mut stmt = conn.prepare(
                    "SELECT transaction_id, kid_id, kind, delta, task_id, redemption_id, note, created_at
                     FROM point_transactions
                     WHERE kid_id = ?1
                     ORDER BY created_at DESC, transaction_id DESC
                     LIMIT ?2",
                )?;
                let out = stmt
                    .query_map(
                        params![kid_id.as_bytes().as_slice(), page.limit as i64],
                        row_to_transaction,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out
            };
            Ok(rows)
        })
        .await
    }

    async fn append_transaction(&self, draft: TransactionDraft) -> Result<PointTransaction> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let rec = append_in_tx(&tx, draft, now_millis())?;
            tx.commit()?;
            Ok(rec)
        })
        .await
    }

    async fn append_transaction_if_balance_at_least(
        &self,
        min_balance: i64,
        draft: TransactionDraft,
    ) -> Result<SpendOutcome> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let balance = balance_in_tx(&tx, &draft.kid_id)?;
            if balance < min_balance {
                // Transaction dropped here; nothing was written anyway.
                return Ok(SpendOutcome::InsufficientBalance { balance });
            }

            let rec = append_in_tx(&tx, draft, now_millis())?;
            tx.commit()?;
            Ok(SpendOutcome::Applied(rec))
        })
        .await
    }

    async fn commit_task_completion(
        &self,
        task_id: &TaskId,
        completed_at: i64,
        draft: TransactionDraft,
    ) -> Result<CompletionOutcome> {
        let task_id = *task_id;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let mut task = tx
                .query_row(
                    "SELECT task_id, kid_id, created_by, title, points, state, completed_at, created_at
                     FROM tasks WHERE task_id = ?1",
                    params![task_id.as_bytes().as_slice()],
                    row_to_task,
                )
                .optional()?
                .ok_or(StoreError::MissingTask(task_id))?;

            if task.is_complete() {
                return Ok(CompletionOutcome::AlreadyComplete(task));
            }

            let transaction = append_in_tx(&tx, draft, now_millis())?;

            task.complete(completed_at);
            tx.execute(
                "UPDATE tasks SET state = ?2, completed_at = ?3 WHERE task_id = ?1",
                params![
                    task_id.as_bytes().as_slice(),
                    task.state.to_u8(),
                    task.completed_at,
                ],
            )?;

            tx.commit()?;
            Ok(CompletionOutcome::Completed { task, transaction })
        })
        .await
    }

    async fn commit_redemption(
        &self,
        redemption: &Redemption,
        draft: TransactionDraft,
    ) -> Result<SpendOutcome> {
        let redemption = redemption.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let balance = balance_in_tx(&tx, &draft.kid_id)?;
            if balance < redemption.cost {
                return Ok(SpendOutcome::InsufficientBalance { balance });
            }

            let rec = append_in_tx(&tx, draft, now_millis())?;

            tx.execute(
                "INSERT INTO redemptions (redemption_id, kid_id, reward_id, reward_title, cost, redeemed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    redemption.id.as_bytes().as_slice(),
                    redemption.kid_id.as_bytes().as_slice(),
                    redemption.reward_id.as_ref().map(|id| id.as_bytes().as_slice()),
                    &redemption.reward_title,
                    redemption.cost,
                    redemption.redeemed_at,
                ],
            )?;

            tx.commit()?;
            Ok(SpendOutcome::Applied(rec))
        })
        .await
    }

    async fn audit_balance(&self, kid_id: &KidId) -> Result<BalanceAudit> {
        let kid_id = *kid_id;
        self.with_conn(move |conn| {
            let materialized: i64 = conn
                .query_row(
                    "SELECT points_balance FROM kids WHERE kid_id = ?1",
                    params![kid_id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::MissingKid(kid_id))?;

            let recomputed: i64 = conn.query_row(
                "SELECT COALESCE(SUM(delta), 0) FROM point_transactions WHERE kid_id = ?1",
                params![kid_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;

            Ok(BalanceAudit {
                kid_id,
                materialized,
                recomputed,
            })
        })
        .await
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

    async fn seeded_kid(store: &SqliteStore) -> Kid {
        let parent = Parent::new("jo", "$argon2id$stub", "Jo", 0).unwrap();
        store.insert_parent(&parent).await.unwrap();
        let kid = Kid::new(parent.id, "Sam", 0).unwrap();
        store.insert_kid(&kid).await.unwrap();
        kid
    }

    #[tokio::test]
    async fn test_parent_roundtrip_and_username_uniqueness() {
        let store = SqliteStore::open_memory().unwrap();
        let parent = Parent::new("jo", "$argon2id$stub", "Jo", 5).unwrap();

        let r1 = store.insert_parent(&parent).await.unwrap();
        assert_eq!(r1, ParentInsert::Inserted);

        let other = Parent::new("jo", "$argon2id$other", "Jo 2", 6).unwrap();
        let r2 = store.insert_parent(&other).await.unwrap();
        assert_eq!(r2, ParentInsert::UsernameTaken);

        let loaded = store.get_parent_by_username("jo").await.unwrap().unwrap();
        assert_eq!(loaded, parent);
    }

    #[tokio::test]
    async fn test_append_and_audit() {
        let store = SqliteStore::open_memory().unwrap();
        let kid = seeded_kid(&store).await;

        let draft = TransactionDraft::new(kid.id, TransactionKind::Earn, 50, "chores").unwrap();
        store.append_transaction(draft).await.unwrap();

        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 50);
        let audit = store.audit_balance(&kid.id).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.recomputed, 50);
    }

    #[tokio::test]
    async fn test_guarded_append_writes_nothing_on_insufficient() {
        let store = SqliteStore::open_memory().unwrap();
        let kid = seeded_kid(&store).await;

        let draft = TransactionDraft::new(kid.id, TransactionKind::Spend, -80, "denied").unwrap();
        let outcome = store
            .append_transaction_if_balance_at_least(80, draft)
            .await
            .unwrap();
        assert_eq!(outcome, SpendOutcome::InsufficientBalance { balance: 0 });

        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 0);
        let history = store
            .get_history(&kid.id, &HistoryPage::default())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_completion_commit_is_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let kid = seeded_kid(&store).await;
        let task = Task::new(kid.id, kid.parent_id, "Brush Teeth", 50, 0).unwrap();
        store.insert_task(&task).await.unwrap();

        let draft =
            TransactionDraft::earn_for_task(kid.id, task.id, 50, "Completed task: Brush Teeth")
                .unwrap();
        let first = store
            .commit_task_completion(&task.id, 100, draft.clone())
            .await
            .unwrap();
        assert!(matches!(first, CompletionOutcome::Completed { .. }));

        let second = store
            .commit_task_completion(&task.id, 200, draft)
            .await
            .unwrap();
        match second {
            CompletionOutcome::AlreadyComplete(task) => {
                assert_eq!(task.completed_at, Some(100));
            }
            other => panic!("expected AlreadyComplete, got {:?}", other),
        }

        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 50);
        let history = store
            .get_history(&kid.id, &HistoryPage::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_redemption_commit_writes_both_rows() {
        let store = SqliteStore::open_memory().unwrap();
        let kid = seeded_kid(&store).await;

        let earn = TransactionDraft::new(kid.id, TransactionKind::Earn, 50, "seed").unwrap();
        store.append_transaction(earn).await.unwrap();

        let reward = Reward::new("Ice Cream", 30, 0).unwrap();
        store.insert_reward(&reward).await.unwrap();

        let redemption = Redemption::new(kid.id, &reward, 500);
        let draft = TransactionDraft::spend_for_redemption(
            kid.id,
            redemption.id,
            reward.cost,
            "Redeemed reward: Ice Cream",
        )
        .unwrap();

        let outcome = store.commit_redemption(&redemption, draft).await.unwrap();
        let tx = match outcome {
            SpendOutcome::Applied(tx) => tx,
            other => panic!("expected Applied, got {:?}", other),
        };
        assert_eq!(tx.delta, -30);
        assert_eq!(tx.redemption_ref, Some(redemption.id));

        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 20);
        let stored = store.get_redemption(&redemption.id).await.unwrap().unwrap();
        assert_eq!(stored, redemption);
    }

    #[tokio::test]
    async fn test_history_cursor_pages() {
        let store = SqliteStore::open_memory().unwrap();
        let kid = seeded_kid(&store).await;

        for i in 0..5i64 {
            let draft =
                TransactionDraft::new(kid.id, TransactionKind::Earn, i, format!("t{}", i)).unwrap();
            store.append_transaction(draft).await.unwrap();
        }

        let first = store
            .get_history(&kid.id, &HistoryPage::first(2))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let rest = store
            .get_history(&kid.id, &HistoryPage::after(&first[1], 10))
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
        for tx in &rest {
            assert!(first.iter().all(|f| f.id != tx.id));
        }
    }

    #[tokio::test]
    async fn test_delete_reward_nulls_redemption_reference() {
        let store = SqliteStore::open_memory().unwrap();
        let kid = seeded_kid(&store).await;

        let earn = TransactionDraft::new(kid.id, TransactionKind::Earn, 50, "seed").unwrap();
        store.append_transaction(earn).await.unwrap();

        let reward = Reward::new("Ice Cream", 30, 0).unwrap();
        store.insert_reward(&reward).await.unwrap();
        let redemption = Redemption::new(kid.id, &reward, 500);
        let draft = TransactionDraft::spend_for_redemption(kid.id, redemption.id, 30, "r").unwrap();
        store.commit_redemption(&redemption, draft).await.unwrap();

        assert!(store.delete_reward(&reward.id).await.unwrap());

        let stored = store.get_redemption(&redemption.id).await.unwrap().unwrap();
        assert_eq!(stored.reward_id, None);
        assert_eq!(stored.cost, 30);
        // The ledger row and balance are untouched.
        assert_eq!(store.get_balance(&kid.id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let kid = seeded_kid(&store).await;
            let draft = TransactionDraft::new(kid.id, TransactionKind::Earn, 7, "x").unwrap();
            store.append_transaction(draft).await.unwrap();
        }

        // Reopen and verify persistence.
        let store = SqliteStore::open(&path).unwrap();
        let parent = store.get_parent_by_username("jo").await.unwrap().unwrap();
        let kids = store.list_kids(&parent.id).await.unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].points_balance, 7);
    }
}
