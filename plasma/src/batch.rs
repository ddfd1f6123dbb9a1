//! Child-chain batches: runs of finalized sub-blocks committed to the root
//! chain as one Merkle commitment.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_crypto::{domain, domain_hash, merkle_root, verify_proof, MerkleProof, MerkleTree};
use strata_types::{BatchId, CommitmentHash, SubBlockHash, Timestamp, TxHash};

use crate::error::PlasmaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Accumulating,
    FinalizedLocally,
    SubmittedToRoot,
    Exited,
    Challenged,
}

impl BatchStatus {
    /// Whether the root chain has the batch's commitment.
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::SubmittedToRoot | Self::Exited | Self::Challenged)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildChainBatch {
    pub id: BatchId,
    /// Committed sub-block hashes, in chain order.
    pub sub_blocks: Vec<SubBlockHash>,
    /// Transaction ids per committed sub-block, kept for challenge checks.
    pub transactions: BTreeMap<SubBlockHash, Vec<TxHash>>,
    /// Indices of the main-chain blocks the sub-blocks came from.
    pub blocks: BTreeSet<u64>,
    pub sub_blocks_root: [u8; 32],
    pub commitment: CommitmentHash,
    pub status: BatchStatus,
    pub created_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub acknowledged: bool,
}

impl ChildChainBatch {
    pub fn build(id: BatchId, entries: Vec<BatchEntry>, now: Timestamp) -> Result<Self, PlasmaError> {
        if entries.is_empty() {
            return Err(PlasmaError::EmptyBatch);
        }
        let mut sub_blocks = Vec::with_capacity(entries.len());
        let mut transactions = BTreeMap::new();
        let mut blocks = BTreeSet::new();
        for entry in entries {
            sub_blocks.push(entry.hash);
            blocks.insert(entry.block_index);
            transactions.insert(entry.hash, entry.tx_ids);
        }
        let leaves: Vec<[u8; 32]> = sub_blocks.iter().map(|h| *h.as_bytes()).collect();
        let sub_blocks_root = merkle_root(&leaves);
        Ok(Self {
            commitment: compute_commitment(id, &sub_blocks_root),
            id,
            sub_blocks,
            transactions,
            blocks,
            sub_blocks_root,
            status: BatchStatus::FinalizedLocally,
            created_at: now,
            submitted_at: None,
            acknowledged: false,
        })
    }

    pub fn contains_sub_block(&self, hash: &SubBlockHash) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn contains_transaction(&self, sub_block: &SubBlockHash, tx: &TxHash) -> bool {
        self.transactions
            .get(sub_block)
            .is_some_and(|ids| ids.contains(tx))
    }

    pub fn tx_ids(&self) -> impl Iterator<Item = &TxHash> {
        self.transactions.values().flatten()
    }

    /// Inclusion proof for a committed sub-block.
    pub fn prove(&self, hash: &SubBlockHash) -> Option<MerkleProof> {
        let leaves: Vec<[u8; 32]> = self.sub_blocks.iter().map(|h| *h.as_bytes()).collect();
        let tree = MerkleTree::new(leaves).ok()?;
        let index = tree.position(hash.as_bytes())?;
        tree.generate_proof(index).ok()
    }

    pub fn verify_inclusion(&self, hash: &SubBlockHash, proof: &MerkleProof) -> bool {
        verify_proof(hash.as_bytes(), proof, &self.sub_blocks_root)
    }
}

/// Commitment binding the sub-block root to the batch id.
pub fn compute_commitment(id: BatchId, sub_blocks_root: &[u8; 32]) -> CommitmentHash {
    let id = id.raw().to_le_bytes();
    CommitmentHash::new(domain_hash(domain::BATCH_COMMITMENT, &[&id, sub_blocks_root]))
}

/// One finalized sub-block waiting to be batched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub hash: SubBlockHash,
    pub block_index: u64,
    pub tx_ids: Vec<TxHash>,
}
