//! The main chain: finalized blocks in index order, plus the bookkeeping
//! needed to validate what comes next.

use std::collections::{HashMap, HashSet};

use strata_types::{BlockHash, BlockStatus, SubBlockHash, SubBlockId, TxHash};
use tracing::{error, info, warn};

use crate::block::Block;
use crate::error::ConsensusError;
use crate::sub_block::SubBlock;

/// Where a sub-block lives inside the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SubBlockPos {
    block: usize,
    offset: usize,
}

#[derive(Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    by_hash: HashMap<BlockHash, usize>,
    finalized_txs: HashMap<TxHash, u64>,
    sub_by_id: HashMap<SubBlockId, SubBlockPos>,
    sub_by_hash: HashMap<SubBlockHash, SubBlockPos>,
    last_sub: (SubBlockHash, u64),
    rejected: HashSet<BlockHash>,
    halted: Option<String>,
}

impl Chain {
    pub fn new(genesis: Block) -> Self {
        let mut by_hash = HashMap::new();
        by_hash.insert(genesis.hash, 0);
        Self {
            blocks: vec![genesis],
            by_hash,
            finalized_txs: HashMap::new(),
            sub_by_id: HashMap::new(),
            sub_by_hash: HashMap::new(),
            last_sub: (SubBlockHash::ZERO, 0),
            rejected: HashSet::new(),
            halted: None,
        }
    }

    /// Index of the tip block. Genesis is height 0.
    pub fn height(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    pub fn tip(&self) -> &Block {
        // The genesis block is inserted at construction and never removed.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tip_hash(&self) -> BlockHash {
        self.tip().hash
    }

    pub fn get_by_index(&self, index: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(index).ok()?)
    }

    pub fn get_by_hash(&self, hash: &BlockHash) -> Option<&Block> {
        self.by_hash.get(hash).map(|&i| &self.blocks[i])
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Hash and sequence index of the last finalized sub-block.
    pub fn last_sub_block(&self) -> (SubBlockHash, u64) {
        self.last_sub
    }

    /// Whether the transaction is part of any finalized block.
    pub fn is_finalized(&self, id: &TxHash) -> bool {
        self.finalized_txs.contains_key(id)
    }

    pub fn block_of_transaction(&self, id: &TxHash) -> Option<u64> {
        self.finalized_txs.get(id).copied()
    }

    pub fn get_sub_block(&self, id: &SubBlockId) -> Option<&SubBlock> {
        self.sub_by_id.get(id).map(|pos| self.sub_at(*pos))
    }

    pub fn get_sub_block_by_hash(&self, hash: &SubBlockHash) -> Option<&SubBlock> {
        self.sub_by_hash.get(hash).map(|pos| self.sub_at(*pos))
    }

    fn sub_at(&self, pos: SubBlockPos) -> &SubBlock {
        &self.blocks[pos.block].sub_blocks[pos.offset]
    }

    /// Append a finalized block. Index and prev hash must extend the tip.
    pub fn append(&mut self, mut block: Block) -> Result<(), ConsensusError> {
        let expected = self.height() + 1;
        if block.index != expected {
            return Err(ConsensusError::IndexOutOfSequence {
                expected,
                got: block.index,
            });
        }
        let tip = self.tip_hash();
        if block.prev_hash != tip {
            return Err(ConsensusError::PrevHashMismatch {
                expected: tip,
                got: block.prev_hash,
            });
        }

        block.status = BlockStatus::Finalized;
        let slot = self.blocks.len();
        for (offset, sb) in block.sub_blocks.iter().enumerate() {
            let pos = SubBlockPos { block: slot, offset };
            // Ids are per-validator; the first holder of an id wins lookups.
            self.sub_by_id.entry(sb.id).or_insert(pos);
            self.sub_by_hash.insert(sb.hash, pos);
            for tx in &sb.transactions {
                self.finalized_txs.insert(tx.id, block.index);
            }
        }
        if let Some(last) = block.last_sub_block() {
            self.last_sub = (last.hash, last.sequence_index);
        }
        self.by_hash.insert(block.hash, slot);
        info!(index = block.index, hash = %block.hash, txs = block.tx_count(), "block appended");
        self.blocks.push(block);
        Ok(())
    }

    /// Recompute the tip's hash and compare with the stored one. A mismatch
    /// halts block production.
    pub fn verify_tip(&mut self) -> Result<(), ConsensusError> {
        let tip = self.tip();
        let recomputed = tip.compute_hash();
        if recomputed == tip.hash {
            return Ok(());
        }
        let fault = ConsensusError::ConsistencyFault {
            index: tip.index,
            stored: tip.hash,
            recomputed,
        };
        error!(%fault, "chain tip failed re-verification");
        self.halt(fault.to_string());
        Err(fault)
    }

    /// Re-verify every block's hash and linkage from genesis.
    pub fn verify_integrity(&self) -> Result<(), ConsensusError> {
        for (i, block) in self.blocks.iter().enumerate() {
            let recomputed = block.compute_hash();
            if recomputed != block.hash || !block.verify_root() {
                return Err(ConsensusError::ConsistencyFault {
                    index: block.index,
                    stored: block.hash,
                    recomputed,
                });
            }
            if i > 0 && block.prev_hash != self.blocks[i - 1].hash {
                return Err(ConsensusError::PrevHashMismatch {
                    expected: self.blocks[i - 1].hash,
                    got: block.prev_hash,
                });
            }
        }
        Ok(())
    }

    pub fn halt(&mut self, reason: String) {
        warn!(%reason, "block production halted");
        self.halted = Some(reason);
    }

    pub fn clear_halt(&mut self) {
        if self.halted.take().is_some() {
            info!("block production resumed");
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn record_rejected(&mut self, hash: BlockHash) {
        self.rejected.insert(hash);
    }

    pub fn is_rejected(&self, hash: &BlockHash) -> bool {
        self.rejected.contains(hash)
    }

    /// Mark a block as anchored on the root chain. Returns false if the
    /// index is unknown.
    pub fn mark_confirmed(&mut self, index: u64) -> bool {
        match usize::try_from(index).ok().and_then(|i| self.blocks.get_mut(i)) {
            Some(block) => {
                block.status = BlockStatus::Confirmed;
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn tip_mut(&mut self) -> &mut Block {
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }
}
