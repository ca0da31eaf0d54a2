//! # chorepoints-store
//!
//! Storage abstraction for chorepoints: the async [`Store`] trait, the
//! SQLite implementation (primary), and an in-memory twin for tests.
//!
//! The contract that matters lives on the ledger methods: balances move only
//! through atomic appends, the guarded check-and-append is indivisible per
//! kid, and the two workflow commits (task completion, redemption) are
//! all-or-nothing.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    BalanceAudit, CompletionOutcome, HistoryCursor, HistoryPage, ParentInsert, SpendOutcome, Store,
};
