//! Sequential identifiers for sub-blocks, locks, escrows, batches, exits and channels.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! sequential_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub fn raw(&self) -> u64 {
                self.0
            }

            /// The identifier following this one.
            pub fn next(&self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }
    };
}

sequential_id!(
    /// Assembler-assigned sub-block identifier. Discarded sub-blocks consume ids too.
    SubBlockId,
    "sb"
);
sequential_id!(
    /// Identifier of a fund lock held against an account's available balance.
    LockId,
    "lock"
);
sequential_id!(
    /// Identifier of an escrow record.
    EscrowId,
    "escrow"
);
sequential_id!(
    /// Identifier of a child-chain batch. Higher ids are more recent commitments.
    BatchId,
    "batch"
);
sequential_id!(
    /// Identifier of a child-chain exit.
    ExitId,
    "exit"
);
sequential_id!(
    /// Identifier of a state channel.
    ChannelId,
    "channel"
);
