//! # chorepoints-core
//!
//! Pure domain types for chorepoints: principals' entities, tasks, rewards,
//! and the point ledger.
//!
//! This crate contains no I/O, no storage, no tokens. It is plain data with
//! the two state rules that matter enforced at construction time:
//!
//! - a Task completes one way, idempotently;
//! - a ledger entry's kind and delta sign are coherent (Earn >= 0,
//!   Spend < 0, Adjust either).
//!
//! Balances are materialized on [`Kid`] but only the store layer may move
//! them, and only together with a [`PointTransaction`] append.

pub mod entity;
pub mod error;
pub mod ledger;
pub mod task;
pub mod types;

pub use entity::{Kid, Parent, Redemption, Reward};
pub use error::{DomainError, Result};
pub use ledger::{PointTransaction, TransactionDraft, TransactionKind, MAX_NOTE_LEN};
pub use task::{Completion, Task, TaskState};
pub use types::{KidId, ParentId, RedemptionId, RewardId, TaskId, TransactionId};
