//! Blocks: fixed-size groups of consecutive sub-blocks, hash-linked into the
//! main chain.

use serde::{Deserialize, Serialize};
use strata_crypto::{domain, domain_hash, merkle_root};
use strata_ledger::GenesisConfig;
use strata_types::{BlockHash, BlockStatus, Timestamp, TxHash};

use crate::error::ConsensusError;
use crate::sub_block::SubBlock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub sub_blocks: Vec<SubBlock>,
    /// Merkle root over the sub-block hashes. For block 0 this is the
    /// genesis state root instead.
    pub sub_blocks_root: [u8; 32],
    pub prev_hash: BlockHash,
    pub hash: BlockHash,
    pub timestamp: Timestamp,
    pub status: BlockStatus,
}

impl Block {
    /// Build a block over `sub_blocks`, computing root and hash.
    pub fn build(
        index: u64,
        prev_hash: BlockHash,
        sub_blocks: Vec<SubBlock>,
        timestamp: Timestamp,
    ) -> Self {
        let sub_blocks_root = Self::compute_root(&sub_blocks);
        let mut block = Self {
            index,
            sub_blocks,
            sub_blocks_root,
            prev_hash,
            hash: BlockHash::ZERO,
            timestamp,
            status: BlockStatus::Created,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Block 0, committing to the genesis state root.
    pub fn genesis(config: &GenesisConfig) -> Self {
        let mut block = Self {
            index: 0,
            sub_blocks: Vec::new(),
            sub_blocks_root: config.state_root(),
            prev_hash: BlockHash::ZERO,
            hash: BlockHash::ZERO,
            timestamp: config.timestamp(),
            status: BlockStatus::Finalized,
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn compute_root(sub_blocks: &[SubBlock]) -> [u8; 32] {
        let leaves: Vec<[u8; 32]> = sub_blocks.iter().map(|sb| *sb.hash.as_bytes()).collect();
        merkle_root(&leaves)
    }

    pub fn compute_hash(&self) -> BlockHash {
        let index = self.index.to_le_bytes();
        let ts = self.timestamp.as_secs().to_le_bytes();
        BlockHash::new(domain_hash(
            domain::BLOCK,
            &[&index, self.prev_hash.as_bytes(), &self.sub_blocks_root, &ts],
        ))
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Whether `sub_blocks_root` matches the carried sub-blocks. Always true
    /// for block 0.
    pub fn verify_root(&self) -> bool {
        self.index == 0 || self.sub_blocks_root == Self::compute_root(&self.sub_blocks)
    }

    pub fn tx_count(&self) -> usize {
        self.sub_blocks.iter().map(SubBlock::len).sum()
    }

    /// Transaction ids in block order.
    pub fn tx_ids(&self) -> Vec<TxHash> {
        self.sub_blocks
            .iter()
            .flat_map(|sb| sb.transactions.iter().map(|tx| tx.id))
            .collect()
    }

    pub fn last_sub_block(&self) -> Option<&SubBlock> {
        self.sub_blocks.last()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConsensusError> {
        bincode::serialize(self).map_err(|e| ConsensusError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConsensusError> {
        bincode::deserialize(bytes).map_err(|e| ConsensusError::Serialization(e.to_string()))
    }
}
