//! Typed principals.
//!
//! A raw token is resolved exactly once, at the gate, into one of these two
//! variants. Everything downstream takes the typed value and never sees the
//! claims bag again.

use serde::{Deserialize, Serialize};

use chorepoints_core::{KidId, ParentId};

use crate::error::{AuthError, Result};

/// The two roles in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Parent,
    Kid,
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    /// A parent, acting on their own family.
    Parent { parent_id: ParentId },
    /// A kid, acting on themselves. Carries the owning parent so ownership
    /// checks never need another lookup.
    Kid { kid_id: KidId, parent_id: ParentId },
}

impl Principal {
    /// The principal's role.
    pub fn role(&self) -> Role {
        match self {
            Principal::Parent { .. } => Role::Parent,
            Principal::Kid { .. } => Role::Kid,
        }
    }

    /// The family this principal belongs to.
    pub fn parent_id(&self) -> ParentId {
        match self {
            Principal::Parent { parent_id } => *parent_id,
            Principal::Kid { parent_id, .. } => *parent_id,
        }
    }

    /// The kid id, if this is a kid principal.
    pub fn kid_id(&self) -> Option<KidId> {
        match self {
            Principal::Parent { .. } => None,
            Principal::Kid { kid_id, .. } => Some(*kid_id),
        }
    }
}

/// Fail `Forbidden` unless the principal's role is in the allowed set.
pub fn require_role(principal: &Principal, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&principal.role()) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_role() {
        let parent = Principal::Parent {
            parent_id: ParentId::ZERO,
        };
        let kid = Principal::Kid {
            kid_id: KidId::ZERO,
            parent_id: ParentId::ZERO,
        };

        assert!(require_role(&parent, &[Role::Parent]).is_ok());
        assert!(require_role(&kid, &[Role::Parent, Role::Kid]).is_ok());
        assert!(matches!(
            require_role(&kid, &[Role::Parent]),
            Err(AuthError::Forbidden)
        ));
    }

    #[test]
    fn test_kid_exposes_family() {
        let kid = Principal::Kid {
            kid_id: KidId::from_bytes([1; 16]),
            parent_id: ParentId::from_bytes([2; 16]),
        };
        assert_eq!(kid.parent_id(), ParentId::from_bytes([2; 16]));
        assert_eq!(kid.kid_id(), Some(KidId::from_bytes([1; 16])));
    }
}
