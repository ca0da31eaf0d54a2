//! The point ledger: immutable transaction entries.
//!
//! A [`PointTransaction`] is never edited after commit. Task and redemption
//! references are soft: deleting the referenced row nulls the reference but
//! the delta and note survive, so the balance invariant keeps holding.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::types::{KidId, RedemptionId, TaskId, TransactionId};

/// Maximum length of a transaction note in bytes.
pub const MAX_NOTE_LEN: usize = 512;

/// Why points moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Points awarded for completing a task. Delta is non-negative.
    Earn,
    /// Points spent on a redemption. Delta is non-positive (a free
    /// reward still writes its Spend row).
    Spend,
    /// Manual correction by a parent. Delta may be either sign.
    Adjust,
}

impl TransactionKind {
    /// Encode for storage.
    pub fn to_u8(self) -> u8 {
        match self {
            TransactionKind::Earn => 0,
            TransactionKind::Spend => 1,
            TransactionKind::Adjust => 2,
        }
    }

    /// Decode from storage.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TransactionKind::Earn),
            1 => Some(TransactionKind::Spend),
            2 => Some(TransactionKind::Adjust),
            _ => None,
        }
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: TransactionId,
    pub kid_id: KidId,
    pub kind: TransactionKind,
    pub delta: i64,
    /// Soft reference to the task that caused an Earn.
    pub task_ref: Option<TaskId>,
    /// Soft reference to the redemption that caused a Spend.
    pub redemption_ref: Option<RedemptionId>,
    pub note: String,
    pub created_at: i64,
}

/// A validated, not-yet-committed ledger entry.
///
/// Construction checks kind/delta coherence so a store never has to: an Earn
/// cannot subtract, a Spend cannot add. The draft carries everything except
/// the commit timestamp, which the store assigns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub kid_id: KidId,
    pub kind: TransactionKind,
    pub delta: i64,
    pub task_ref: Option<TaskId>,
    pub redemption_ref: Option<RedemptionId>,
    pub note: String,
}

impl TransactionDraft {
    /// Build a draft, enforcing sign coherence and note length.
    pub fn new(
        kid_id: KidId,
        kind: TransactionKind,
        delta: i64,
        note: impl Into<String>,
    ) -> Result<Self> {
        let coherent = match kind {
            TransactionKind::Earn => delta >= 0,
            TransactionKind::Spend => delta <= 0,
            TransactionKind::Adjust => true,
        };
        if !coherent {
            return Err(DomainError::IncoherentDelta { kind, delta });
        }
        let note = note.into();
        if note.len() > MAX_NOTE_LEN {
            return Err(DomainError::NoteTooLong { max: MAX_NOTE_LEN });
        }
        Ok(Self {
            kid_id,
            kind,
            delta,
            task_ref: None,
            redemption_ref: None,
            note,
        })
    }

    /// An Earn caused by a task.
    pub fn earn_for_task(kid_id: KidId, task_id: TaskId, points: i64, note: impl Into<String>) -> Result<Self> {
        let mut draft = Self::new(kid_id, TransactionKind::Earn, points, note)?;
        draft.task_ref = Some(task_id);
        Ok(draft)
    }

    /// A Spend caused by a redemption.
    pub fn spend_for_redemption(
        kid_id: KidId,
        redemption_id: RedemptionId,
        cost: i64,
        note: impl Into<String>,
    ) -> Result<Self> {
        let mut draft = Self::new(kid_id, TransactionKind::Spend, -cost, note)?;
        draft.redemption_ref = Some(redemption_id);
        Ok(draft)
    }

    /// Materialize into a committed transaction with a fresh id.
    pub fn into_transaction(self, now: i64) -> PointTransaction {
        PointTransaction {
            id: TransactionId::generate(),
            kid_id: self.kid_id,
            kind: self.kind,
            delta: self.delta,
            task_ref: self.task_ref,
            redemption_ref: self.redemption_ref,
            note: self.note,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_earn_rejects_negative_delta() {
        let result = TransactionDraft::new(KidId::ZERO, TransactionKind::Earn, -10, "x");
        assert!(matches!(result, Err(DomainError::IncoherentDelta { .. })));
    }

    #[test]
    fn test_spend_never_adds() {
        assert!(TransactionDraft::new(KidId::ZERO, TransactionKind::Spend, 1, "x").is_err());
        assert!(TransactionDraft::new(KidId::ZERO, TransactionKind::Spend, 0, "x").is_ok());
        assert!(TransactionDraft::new(KidId::ZERO, TransactionKind::Spend, -1, "x").is_ok());
    }

    #[test]
    fn test_adjust_takes_either_sign() {
        assert!(TransactionDraft::new(KidId::ZERO, TransactionKind::Adjust, -10, "x").is_ok());
        assert!(TransactionDraft::new(KidId::ZERO, TransactionKind::Adjust, 10, "x").is_ok());
    }

    #[test]
    fn test_note_length_cap() {
        let long = "x".repeat(MAX_NOTE_LEN + 1);
        assert!(TransactionDraft::new(KidId::ZERO, TransactionKind::Adjust, 0, long).is_err());
    }

    #[test]
    fn test_spend_for_redemption_negates_cost() {
        let draft =
            TransactionDraft::spend_for_redemption(KidId::ZERO, RedemptionId::ZERO, 30, "Ice Cream")
                .unwrap();
        assert_eq!(draft.delta, -30);
        assert_eq!(draft.redemption_ref, Some(RedemptionId::ZERO));
    }

    #[test]
    fn test_kind_storage_roundtrip() {
        for kind in [
            TransactionKind::Earn,
            TransactionKind::Spend,
            TransactionKind::Adjust,
        ] {
            assert_eq!(TransactionKind::from_u8(kind.to_u8()), Some(kind));
        }
        assert_eq!(TransactionKind::from_u8(9), None);
    }

    #[test]
    fn test_kind_serializes_by_name() {
        assert_eq!(
            serde_json::to_string(&TransactionKind::Earn).unwrap(),
            "\"Earn\""
        );
        let kind: TransactionKind = serde_json::from_str("\"Spend\"").unwrap();
        assert_eq!(kind, TransactionKind::Spend);
    }

    proptest! {
        #[test]
        fn prop_draft_never_breaks_sign_rules(delta in -1000i64..1000, kind_raw in 0u8..3) {
            let kind = TransactionKind::from_u8(kind_raw).unwrap();
            if let Ok(draft) = TransactionDraft::new(KidId::ZERO, kind, delta, "p") {
                match draft.kind {
                    TransactionKind::Earn => prop_assert!(draft.delta >= 0),
                    TransactionKind::Spend => prop_assert!(draft.delta <= 0),
                    TransactionKind::Adjust => {}
                }
            }
        }
    }
}
