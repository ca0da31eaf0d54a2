//! Strong identifier types for chorepoints.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Ids are
//! 16 random bytes; nothing in this system is content-addressed.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Generate a fresh random id.
            pub fn generate() -> Self {
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, DomainError> {
                let bytes = hex::decode(s)
                    .map_err(|e| DomainError::MalformedId(e.to_string()))?;
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| DomainError::MalformedId("expected 16 bytes".into()))?;
                Ok(Self(arr))
            }

            /// The zero id (used as a sentinel in tests).
            pub const ZERO: Self = Self([0u8; 16]);
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), &self.to_hex()[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; 16] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

entity_id!(
    /// Identifies a Parent account.
    ParentId
);

entity_id!(
    /// Identifies a Kid. Every kid belongs to exactly one parent.
    KidId
);

entity_id!(
    /// Identifies a Task assigned to a kid.
    TaskId
);

entity_id!(
    /// Identifies a Reward in the global catalog.
    RewardId
);

entity_id!(
    /// Identifies a Redemption of a reward by a kid.
    RedemptionId
);

entity_id!(
    /// Identifies a single ledger entry.
    TransactionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex_roundtrip() {
        let id = KidId::from_bytes([0x42; 16]);
        let hex = id.to_hex();
        let recovered = KidId::from_hex(&hex).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_id_rejects_wrong_length() {
        assert!(KidId::from_hex("abcd").is_err());
        assert!(KidId::from_hex("not hex at all").is_err());
    }

    #[test]
    fn test_id_debug_truncated() {
        let id = TaskId::from_bytes([0xab; 16]);
        let debug = format!("{:?}", id);
        assert_eq!(debug, "TaskId(abababab)");
    }

    #[test]
    fn test_generate_unique() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert_ne!(a, b);
    }
}
