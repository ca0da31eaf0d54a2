//! Parent, Kid, Reward, and Redemption records.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::types::{KidId, ParentId, RedemptionId, RewardId};

/// A parent account. The credential hash is a PHC-format string produced by
/// the auth layer; this crate treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub id: ParentId,
    pub username: String,
    pub credential_hash: String,
    pub display_name: String,
    pub created_at: i64,
}

impl Parent {
    /// Create a new parent record with a fresh id.
    pub fn new(
        username: impl Into<String>,
        credential_hash: impl Into<String>,
        display_name: impl Into<String>,
        now: i64,
    ) -> Result<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(DomainError::EmptyUsername);
        }
        Ok(Self {
            id: ParentId::generate(),
            username,
            credential_hash: credential_hash.into(),
            display_name: display_name.into(),
            created_at: now,
        })
    }
}

/// A kid. Belongs to exactly one parent and carries the materialized point
/// balance. The balance is only ever moved by the ledger append primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kid {
    pub id: KidId,
    pub parent_id: ParentId,
    pub display_name: String,
    pub points_balance: i64,
    pub created_at: i64,
}

impl Kid {
    /// Create a new kid record with a fresh id and zero balance.
    pub fn new(parent_id: ParentId, display_name: impl Into<String>, now: i64) -> Result<Self> {
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(DomainError::EmptyDisplayName);
        }
        Ok(Self {
            id: KidId::generate(),
            parent_id,
            display_name,
            points_balance: 0,
            created_at: now,
        })
    }
}

/// A reward catalog entry. Global: not owned by any kid or parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: RewardId,
    pub title: String,
    pub cost: i64,
    pub created_at: i64,
}

impl Reward {
    /// Create a new reward with a fresh id. Cost must be non-negative.
    pub fn new(title: impl Into<String>, cost: i64, now: i64) -> Result<Self> {
        if cost < 0 {
            return Err(DomainError::NegativeRewardCost(cost));
        }
        Ok(Self {
            id: RewardId::generate(),
            title: title.into(),
            cost,
            created_at: now,
        })
    }
}

/// An immutable record of one kid redeeming one reward.
///
/// `reward_id` is a soft reference: deleting the reward later nulls it but
/// the redemption row itself is never edited or deleted by workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: RedemptionId,
    pub kid_id: KidId,
    pub reward_id: Option<RewardId>,
    pub reward_title: String,
    pub cost: i64,
    pub redeemed_at: i64,
}

impl Redemption {
    /// Create a redemption record for a reward, priced at redemption time.
    pub fn new(kid_id: KidId, reward: &Reward, now: i64) -> Self {
        Self {
            id: RedemptionId::generate(),
            kid_id,
            reward_id: Some(reward.id),
            reward_title: reward.title.clone(),
            cost: reward.cost,
            redeemed_at: now,
        }
    }
}
