//! 32-byte hash types for transactions, sub-blocks, blocks and child-chain commitments.
//!
//! Each hash gets its own newtype so a sub-block hash can never be passed where a
//! block hash is expected. All of them share the same representation and helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! hash_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}\u{2026})", stringify!($name), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(&self.0))
            }
        }
    };
}

hash_type!(
    /// Identifier of a transaction: the domain-separated hash of its signed fields.
    TxHash
);

hash_type!(
    /// Self-hash of a closed sub-block.
    SubBlockHash
);

hash_type!(
    /// Hash of a finalized block. Also serves as the block's identifier.
    BlockHash
);

hash_type!(
    /// Commitment of a child-chain batch, carried by its root-chain transaction.
    CommitmentHash
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_default() {
        assert_eq!(BlockHash::default(), BlockHash::ZERO);
        assert!(SubBlockHash::default().is_zero());
    }

    #[test]
    fn display_is_full_hex() {
        let h = TxHash::new([0xab; 32]);
        assert_eq!(h.to_string().len(), 64);
        assert!(h.to_string().starts_with("abab"));
    }

    #[test]
    fn debug_is_abbreviated() {
        let h = CommitmentHash::new([0x01; 32]);
        let dbg = format!("{:?}", h);
        assert!(dbg.starts_with("CommitmentHash(01010101"));
    }
}
