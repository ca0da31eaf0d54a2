//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL batch
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Parent accounts
        CREATE TABLE parents (
            parent_id BLOB PRIMARY KEY,       -- 16 bytes
            username TEXT NOT NULL UNIQUE,
            credential_hash TEXT NOT NULL,    -- PHC-format argon2id string
            display_name TEXT NOT NULL,
            created_at INTEGER NOT NULL       -- Unix ms
        );

        -- Kids, with the materialized balance
        CREATE TABLE kids (
            kid_id BLOB PRIMARY KEY,          -- 16 bytes
            parent_id BLOB NOT NULL REFERENCES parents(parent_id),
            display_name TEXT NOT NULL,
            points_balance INTEGER NOT NULL DEFAULT 0
                CHECK (points_balance >= 0),  -- backstop; the guarded append is the real gate
            created_at INTEGER NOT NULL
        );

        -- Tasks
        CREATE TABLE tasks (
            task_id BLOB PRIMARY KEY,
            kid_id BLOB NOT NULL,
            created_by BLOB NOT NULL,
            title TEXT NOT NULL,
            points INTEGER NOT NULL CHECK (points >= 0),
            state INTEGER NOT NULL DEFAULT 0, -- 0=pending, 1=complete
            completed_at INTEGER,
            created_at INTEGER NOT NULL
        );

        -- Reward catalog (global)
        CREATE TABLE rewards (
            reward_id BLOB PRIMARY KEY,
            title TEXT NOT NULL,
            cost INTEGER NOT NULL CHECK (cost >= 0),
            created_at INTEGER NOT NULL
        );

        -- Redemptions. reward_id is a soft reference, nulled if the reward
        -- is deleted; the title and cost are snapshotted at redemption time.
        CREATE TABLE redemptions (
            redemption_id BLOB PRIMARY KEY,
            kid_id BLOB NOT NULL,
            reward_id BLOB,
            reward_title TEXT NOT NULL,
            cost INTEGER NOT NULL,
            redeemed_at INTEGER NOT NULL
        );

        -- The ledger. Rows are append-only; task_id and redemption_id are
        -- soft references, nulled when their target is deleted.
        CREATE TABLE point_transactions (
            transaction_id BLOB PRIMARY KEY,
            kid_id BLOB NOT NULL,
            kind INTEGER NOT NULL,            -- 0=earn, 1=spend, 2=adjust
            delta INTEGER NOT NULL,
            task_id BLOB,
            redemption_id BLOB,
            note TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Indexes for common queries
        CREATE INDEX idx_transactions_kid_created ON point_transactions(kid_id, created_at);
        CREATE INDEX idx_kids_parent ON kids(parent_id);
        CREATE INDEX idx_tasks_kid ON tasks(kid_id);
        CREATE INDEX idx_redemptions_kid ON redemptions(kid_id);
        "#,
    )?;

    Ok(())
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

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"parents".to_string()));
        assert!(tables.contains(&"kids".to_string()));
        assert!(tables.contains(&"tasks".to_string()));
        assert!(tables.contains(&"rewards".to_string()));
        assert!(tables.contains(&"redemptions".to_string()));
        assert!(tables.contains(&"point_transactions".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_balance_backstop_rejects_negative() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO parents (parent_id, username, credential_hash, display_name, created_at)
             VALUES (?1, 'p', 'h', 'P', 0)",
            rusqlite::params![[0u8; 16].as_slice()],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO kids (kid_id, parent_id, display_name, points_balance, created_at)
             VALUES (?1, ?2, 'K', -1, 0)",
            rusqlite::params![[1u8; 16].as_slice(), [0u8; 16].as_slice()],
        );
        assert!(result.is_err());
    }
}
