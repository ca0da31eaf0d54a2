//! Proptest generators for ledger scripts.
//!
//! A script is a sequence of operations against one kid's ledger. Property
//! tests replay scripts through the service and check that the balance
//! invariant holds after every step.

use proptest::prelude::*;

use chorepoints_core::TransactionKind;

/// One step of a ledger script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    /// Create a task worth `points` and complete it.
    Earn { points: i64 },
    /// A manual parent adjustment; may be refused when negative.
    Adjust { delta: i64 },
    /// Create a reward costing `cost` and try to redeem it; may be refused.
    TrySpend { cost: i64 },
}

/// Strategy for one ledger operation.
pub fn arb_ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (0i64..200).prop_map(|points| LedgerOp::Earn { points }),
        (-150i64..150).prop_map(|delta| LedgerOp::Adjust { delta }),
        (0i64..250).prop_map(|cost| LedgerOp::TrySpend { cost }),
    ]
}

/// Strategy for a whole script.
pub fn arb_ledger_script(max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    prop::collection::vec(arb_ledger_op(), 0..max_len)
}

/// Strategy for a transaction kind.
pub fn arb_transaction_kind() -> impl Strategy<Value = TransactionKind> {
    prop_oneof![
        Just(TransactionKind::Earn),
        Just(TransactionKind::Spend),
        Just(TransactionKind::Adjust),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_ops_stay_in_range(op in arb_ledger_op()) {
            match op {
                LedgerOp::Earn { points } => prop_assert!((0..200).contains(&points)),
                LedgerOp::Adjust { delta } => prop_assert!((-150..150).contains(&delta)),
                LedgerOp::TrySpend { cost } => prop_assert!((0..250).contains(&cost)),
            }
        }
    }
}
