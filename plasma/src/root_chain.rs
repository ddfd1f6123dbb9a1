//! The external root chain that anchors batch commitments.

use serde::{Deserialize, Serialize};
use strata_types::{BatchId, CommitmentHash, Timestamp};

use crate::error::RootChainError;

/// The single settlement transaction submitted per batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootChainTx {
    pub batch_id: BatchId,
    pub commitment: CommitmentHash,
    pub sub_block_count: usize,
    pub submitted_at: Timestamp,
}

/// Transport to the root chain.
///
/// `submit` must not block on confirmation: the adapter calls it while the
/// node's core lock is held. Receipts come back through
/// `ChildChainAdapter::acknowledge`.
pub trait RootChain: Send + Sync {
    fn submit(&self, tx: &RootChainTx) -> Result<(), RootChainError>;
}
