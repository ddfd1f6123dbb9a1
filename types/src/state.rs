//! Status enums for transactions, sub-blocks and blocks.

use serde::{Deserialize, Serialize};

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Submitted, or returned to the pending pool after an aborted sub-block.
    Pending,
    /// Passed validation, not yet applied.
    Validated,
    /// Applied to balances and part of an open or closed sub-block.
    Included,
    /// Part of a finalized block.
    Finalized,
    /// Funds it created were later consumed by a settlement exit.
    Spent,
    /// Undone because the sub-block or block carrying it was aborted.
    Reversed,
}

impl TxStatus {
    /// Whether balances currently reflect this transaction.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Included | Self::Finalized | Self::Spent)
    }

    /// Whether the transaction can no longer be reversed.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Finalized | Self::Spent)
    }
}

/// Lifecycle of a sub-block.
///
/// Assembly runs `Open → Validating → Closed`; once handed to the finalizer it
/// may be `Broadcast` to peers and finally `Included` in a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubBlockStatus {
    Open,
    Validating,
    Closed,
    Broadcast,
    Included,
}

impl SubBlockStatus {
    /// Whether the sub-block is sealed and its hash is authoritative.
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Closed | Self::Broadcast | Self::Included)
    }
}

/// Lifecycle of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Created,
    Validated,
    Finalized,
    /// Acknowledged downstream (e.g. committed to the root chain).
    Confirmed,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_statuses() {
        assert!(TxStatus::Included.is_applied());
        assert!(TxStatus::Finalized.is_applied());
        assert!(!TxStatus::Pending.is_applied());
        assert!(!TxStatus::Reversed.is_applied());
    }

    #[test]
    fn sealed_sub_blocks() {
        assert!(!SubBlockStatus::Open.is_sealed());
        assert!(!SubBlockStatus::Validating.is_sealed());
        assert!(SubBlockStatus::Closed.is_sealed());
        assert!(SubBlockStatus::Included.is_sealed());
    }
}
