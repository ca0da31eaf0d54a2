//! # chorepoints-testkit
//!
//! Testing utilities for chorepoints: seeded in-memory fixtures, proptest
//! generators for ledger scripts, and a tracing hook for noisy test runs.

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_family, Family, TestFixture, FIXTURE_PASSWORD};
pub use generators::{arb_ledger_op, arb_ledger_script, arb_transaction_kind, LedgerOp};

/// Install a fmt subscriber so tests emit tracing output when asked.
///
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
