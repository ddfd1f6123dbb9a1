//! Exits: withdrawals of value from the child chain, open to challenge for
//! a fixed window.

use serde::{Deserialize, Serialize};
use strata_crypto::MerkleProof;
use strata_transactions::Transaction;
use strata_types::{AccountId, Amount, BatchId, ExitId, LockId, SubBlockHash, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatus {
    Pending,
    Challenged,
    Finalized,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    pub id: ExitId,
    pub batch_id: BatchId,
    pub participant: AccountId,
    pub amount: Amount,
    pub lock: LockId,
    pub initiated_at: Timestamp,
    pub status: ExitStatus,
    pub challenger: Option<AccountId>,
}

impl Exit {
    pub fn window_closed(&self, window_secs: u64, now: Timestamp) -> bool {
        self.initiated_at.has_expired(window_secs, now)
    }
}

/// Proof that an exiting participant spent funds after the exit's batch.
///
/// The transaction must be committed in `sub_block`, and `sub_block` must be
/// committed in the later batch `batch_id` under `proof`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeEvidence {
    pub batch_id: BatchId,
    pub sub_block: SubBlockHash,
    pub proof: MerkleProof,
    pub transaction: Transaction,
}
