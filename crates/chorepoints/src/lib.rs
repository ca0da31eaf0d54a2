//! # chorepoints
//!
//! The chorepoints service: a multi-family chore-and-allowance core.
//!
//! ## Overview
//!
//! Parents assign point-valued tasks to kids; kids complete tasks to earn
//! points and spend them on rewards. Every point movement is an entry in an
//! append-only ledger, and each kid's materialized balance is always equal
//! to the sum of their ledger deltas.
//!
//! ## Key guarantees
//!
//! - **Exactly-once awards**: completing a task twice awards once.
//! - **No negative balances**: spends are a single atomic check-and-append,
//!   so racing redemptions cannot both pass the balance check.
//! - **Tenant isolation**: every kid-scoped request funnels through one
//!   ownership chokepoint; another family's kid is indistinguishable from a
//!   kid that does not exist.
//! - **Audit-preserving deletes**: removing a task, reward, or redemption
//!   nulls references on ledger rows but never the rows themselves.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chorepoints::{Service, ServiceConfig};
//! use chorepoints::auth::IssuerKeypair;
//! use chorepoints::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("family.db").unwrap();
//!     let service = Service::new(store, IssuerKeypair::generate(), ServiceConfig::default());
//!
//!     let parent = service
//!         .register_parent("jo", "hunter2-but-better", "Jo")
//!         .await
//!         .unwrap();
//!     let token = service.login("jo", "hunter2-but-better").await.unwrap();
//!     let principal = service.resolve_principal(&token).unwrap();
//!
//!     let kid = service.create_kid(&principal, "Sam").await.unwrap();
//!     let task = service
//!         .create_task(&principal, kid.id, "Brush Teeth", 50)
//!         .await
//!         .unwrap();
//!     service
//!         .complete_task(&principal, task.id, Some(kid.id))
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `chorepoints::core` - domain types (Task, Reward, PointTransaction, ...)
//! - `chorepoints::store` - storage abstraction, SQLite and in-memory
//! - `chorepoints::auth` - tokens, principals, credential hashing

pub mod error;
pub mod gate;
pub mod service;

// Re-export component crates
pub use chorepoints_auth as auth;
pub use chorepoints_core as core;
pub use chorepoints_store as store;

// Re-export main types for convenience
pub use error::{Result, ServiceError};
pub use gate::AuthorizationGate;
pub use service::{KidSessionGrant, Service, ServiceConfig};

// Re-export commonly used component types
pub use chorepoints_auth::{IssuerKeypair, Principal, Role, SessionToken};
pub use chorepoints_core::{
    Kid, KidId, Parent, ParentId, PointTransaction, Redemption, RedemptionId, Reward, RewardId,
    Task, TaskId, TaskState, TransactionDraft, TransactionId, TransactionKind,
};
pub use chorepoints_store::{
    BalanceAudit, HistoryCursor, HistoryPage, MemoryStore, SpendOutcome, SqliteStore, Store,
};
