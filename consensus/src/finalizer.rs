//! Block finalizer.
//!
//! Accumulates closed sub-blocks in linkage order and finalizes a block when
//! the threshold is reached. Before finalizing, every transaction is checked
//! once more for double spends; a hit aborts the block, discarding the
//! offending sub-block and everything after it.

use std::collections::HashSet;

use strata_ledger::{LedgerError, LedgerState};
use strata_types::{BlockSealPolicy, BlockStatus, ChainParams, SubBlockHash, SubBlockStatus, Timestamp, TxHash, TxStatus};
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::chain::Chain;
use crate::error::ConsensusError;
use crate::sub_block::SubBlock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortedBlock {
    pub offending: TxHash,
    /// The offending sub-block and every sub-block accumulated after it.
    pub discarded: Vec<SubBlock>,
    pub reason: ConsensusError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Accumulated { count: usize },
    Finalized(Block),
    Aborted(AbortedBlock),
}

#[derive(Debug)]
pub struct BlockFinalizer {
    threshold: usize,
    seal_policy: BlockSealPolicy,
    pending: Vec<SubBlock>,
    first_pending_at: Option<Timestamp>,
}

impl BlockFinalizer {
    pub fn new(params: &ChainParams) -> Self {
        Self {
            threshold: params.sub_blocks_per_block.max(1),
            seal_policy: params.seal_policy,
            pending: Vec::new(),
            first_pending_at: None,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn pending(&self) -> &[SubBlock] {
        &self.pending
    }

    pub fn ready(&self) -> bool {
        self.pending.len() >= self.threshold
    }

    /// Hash and sequence index the next accepted sub-block must link to.
    pub fn expected_prev(&self, chain: &Chain) -> (SubBlockHash, u64) {
        self.pending
            .last()
            .map(|sb| (sb.hash, sb.sequence_index))
            .unwrap_or_else(|| chain.last_sub_block())
    }

    /// Drop every accumulated sub-block and hand them back.
    pub fn clear(&mut self) -> Vec<SubBlock> {
        self.first_pending_at = None;
        std::mem::take(&mut self.pending)
    }

    /// Accept a closed sub-block, finalizing a block if the threshold is met.
    ///
    /// While the chain is halted sub-blocks keep accumulating. A consistency
    /// fault detected at finalization is returned as an error.
    pub fn add_sub_block(
        &mut self,
        mut sb: SubBlock,
        chain: &mut Chain,
        ledger: &mut LedgerState,
        now: Timestamp,
    ) -> Result<AddOutcome, ConsensusError> {
        if sb.status != SubBlockStatus::Closed {
            return Err(ConsensusError::SubBlockNotClosed {
                id: sb.id,
                status: sb.status,
            });
        }
        let (prev, seq) = self.expected_prev(chain);
        if sb.prev_hash != prev {
            return Err(ConsensusError::LinkageMismatch {
                expected: prev,
                got: sb.prev_hash,
            });
        }
        if sb.sequence_index != seq + 1 {
            return Err(ConsensusError::SequenceGap {
                expected: seq + 1,
                got: sb.sequence_index,
            });
        }

        sb.status = SubBlockStatus::Broadcast;
        debug!(sub_block = %sb.id, pending = self.pending.len() + 1, "sub-block accumulated");
        self.pending.push(sb);
        self.first_pending_at.get_or_insert(now);

        if self.ready() {
            self.finalize(self.threshold, chain, ledger, now)
        } else {
            Ok(AddOutcome::Accumulated {
                count: self.pending.len(),
            })
        }
    }

    /// Finalize whatever has accumulated as a partial block. Only allowed
    /// under a time-boxed seal policy.
    pub fn seal_partial(
        &mut self,
        chain: &mut Chain,
        ledger: &mut LedgerState,
        now: Timestamp,
    ) -> Result<Option<AddOutcome>, ConsensusError> {
        if !self.seal_policy.allows_partial() {
            return Err(ConsensusError::PartialSealNotAllowed);
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = self.pending.len().min(self.threshold);
        self.finalize(take, chain, ledger, now).map(Some)
    }

    /// Seal a partial block once the policy's wait has elapsed. Also retries
    /// a full block that was held back by a halt.
    pub fn tick(
        &mut self,
        chain: &mut Chain,
        ledger: &mut LedgerState,
        now: Timestamp,
    ) -> Result<Option<AddOutcome>, ConsensusError> {
        if self.pending.is_empty() || chain.is_halted() {
            return Ok(None);
        }
        if self.ready() {
            return self.finalize(self.threshold, chain, ledger, now).map(Some);
        }
        match (self.seal_policy, self.first_pending_at) {
            (BlockSealPolicy::TimeBoxedPartial { max_wait_secs }, Some(since))
                if since.has_expired(max_wait_secs, now) =>
            {
                info!(pending = self.pending.len(), "sealing partial block");
                self.seal_partial(chain, ledger, now)
            }
            _ => Ok(None),
        }
    }

    fn finalize(
        &mut self,
        take: usize,
        chain: &mut Chain,
        ledger: &mut LedgerState,
        now: Timestamp,
    ) -> Result<AddOutcome, ConsensusError> {
        if chain.is_halted() {
            return Ok(AddOutcome::Accumulated {
                count: self.pending.len(),
            });
        }
        chain.verify_tip()?;

        let take = take.min(self.pending.len());
        if let Some((at, offending, reason)) = self.find_double_spend(take, chain, ledger) {
            let discarded = self.pending.split_off(at);
            if self.pending.is_empty() {
                self.first_pending_at = None;
            }
            warn!(tx = %offending, %reason, discarded = discarded.len(), "block aborted");
            return Ok(AddOutcome::Aborted(AbortedBlock {
                offending,
                discarded,
                reason,
            }));
        }

        let ids: Vec<TxHash> = self.pending[..take]
            .iter()
            .flat_map(|sb| sb.transactions.iter().map(|tx| tx.id))
            .collect();
        ledger.mark_finalized(&ids, now)?;

        let mut sub_blocks: Vec<SubBlock> = self.pending.drain(..take).collect();
        for sb in &mut sub_blocks {
            sb.status = SubBlockStatus::Included;
            for tx in &mut sb.transactions {
                tx.status = TxStatus::Finalized;
            }
        }
        self.first_pending_at = if self.pending.is_empty() { None } else { Some(now) };

        let mut block = Block::build(chain.height() + 1, chain.tip_hash(), sub_blocks, now);
        block.status = BlockStatus::Finalized;
        ledger.advance_chain(block.index, block.hash)?;
        chain.append(block.clone())?;
        info!(index = block.index, hash = %block.hash, txs = ids.len(), "block finalized");
        Ok(AddOutcome::Finalized(block))
    }

    /// First transaction in the first `take` sub-blocks that is already
    /// finalized, repeated, or no longer included in the ledger.
    fn find_double_spend(
        &self,
        take: usize,
        chain: &Chain,
        ledger: &LedgerState,
    ) -> Option<(usize, TxHash, ConsensusError)> {
        let mut seen = HashSet::new();
        for (at, sb) in self.pending[..take].iter().enumerate() {
            for tx in &sb.transactions {
                let reason = if chain.is_finalized(&tx.id) {
                    Some(ConsensusError::AlreadyFinalized(tx.id))
                } else if !seen.insert(tx.id) {
                    Some(ConsensusError::DuplicateInBlock(tx.id))
                } else {
                    match ledger.get_transaction(&tx.id).map(|t| t.status) {
                        Some(TxStatus::Included) => None,
                        Some(status) => Some(ConsensusError::Ledger(LedgerError::UnexpectedTxStatus {
                            id: tx.id,
                            status,
                            expected: TxStatus::Included,
                        })),
                        None => Some(ConsensusError::Ledger(LedgerError::UnknownTransaction(tx.id))),
                    }
                };
                if let Some(reason) = reason {
                    return Some((at, tx.id, reason));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::{ledger, params, transfer};
    use crate::assembler::{CloseOutcome, SubBlockAssembler};
    use strata_crypto::Ed25519Verifier;
    use strata_ledger::GenesisConfig;
    use strata_types::{NetworkId, ValidatorId};

    const NOW: Timestamp = Timestamp::EPOCH;

    struct Fixture {
        ledger: LedgerState,
        chain: Chain,
        asm: SubBlockAssembler,
        finalizer: BlockFinalizer,
    }

    fn fixture(params: ChainParams) -> Fixture {
        Fixture {
            ledger: ledger(),
            chain: Chain::new(Block::genesis(&GenesisConfig::new(NetworkId::Dev))),
            asm: SubBlockAssembler::new(ValidatorId::new("v1"), &params),
            finalizer: BlockFinalizer::new(&params),
        }
    }

    fn three_per_block() -> ChainParams {
        ChainParams {
            sub_blocks_per_block: 3,
            ..params(1)
        }
    }

    impl Fixture {
        /// Submit one transfer; with one tx per sub-block it closes at once.
        fn close_one(&mut self, amount: u128) -> SubBlock {
            match self.asm.submit(&mut self.ledger, &transfer(amount, 0), NOW, &Ed25519Verifier) {
                Ok(Some(CloseOutcome::Closed(sb))) => sb,
                other => panic!("expected close, got {other:?}"),
            }
        }

        fn add(&mut self, sb: SubBlock) -> Result<AddOutcome, ConsensusError> {
            self.finalizer.add_sub_block(sb, &mut self.chain, &mut self.ledger, NOW)
        }
    }

    #[test]
    fn finalizes_at_threshold() {
        let mut f = fixture(three_per_block());
        let a = f.close_one(1);
        let b = f.close_one(2);
        assert_eq!(f.add(a), Ok(AddOutcome::Accumulated { count: 1 }));
        assert_eq!(f.add(b), Ok(AddOutcome::Accumulated { count: 2 }));
        let c = f.close_one(3);
        let ids = c.tx_ids();
        let block = match f.add(c) {
            Ok(AddOutcome::Finalized(block)) => block,
            other => panic!("expected block, got {other:?}"),
        };
        assert_eq!(block.index, 1);
        assert_eq!(block.sub_blocks.len(), 3);
        assert_eq!(block.status, BlockStatus::Finalized);
        assert!(block.sub_blocks.iter().all(|sb| sb.status == SubBlockStatus::Included));
        assert_eq!(f.chain.height(), 1);
        assert_eq!(f.ledger.block_height(), 1);
        assert_eq!(f.ledger.get_transaction(&ids[0]).unwrap().status, TxStatus::Finalized);
        assert!(f.finalizer.pending().is_empty());
    }

    #[test]
    fn rejects_unlinked_or_open_sub_blocks() {
        let mut f = fixture(three_per_block());
        let a = f.close_one(1);
        let b = f.close_one(2);
        assert!(matches!(f.add(b), Err(ConsensusError::LinkageMismatch { .. })));

        let mut open = a.clone();
        open.status = SubBlockStatus::Open;
        assert!(matches!(f.add(open), Err(ConsensusError::SubBlockNotClosed { .. })));
        assert!(f.finalizer.pending().is_empty());
    }

    #[test]
    fn double_spend_aborts_from_offender() {
        let mut f = fixture(three_per_block());
        let a = f.close_one(1);
        let mut b = f.close_one(2);
        // Replay a's transaction inside b.
        b.transactions.push(a.transactions[0].clone());
        b.hash = b.compute_hash();
        let c = {
            f.asm.rewind_link(b.hash, b.sequence_index + 1);
            f.close_one(3)
        };
        f.add(a.clone()).unwrap();
        f.add(b).unwrap();
        match f.add(c) {
            Ok(AddOutcome::Aborted(aborted)) => {
                assert_eq!(aborted.offending, a.transactions[0].id);
                assert_eq!(aborted.discarded.len(), 2);
                assert_eq!(aborted.reason, ConsensusError::DuplicateInBlock(a.transactions[0].id));
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(f.finalizer.pending().len(), 1);
        assert_eq!(f.chain.height(), 0);
    }

    #[test]
    fn halted_chain_keeps_accumulating() {
        let mut f = fixture(ChainParams {
            sub_blocks_per_block: 1,
            ..params(1)
        });
        f.chain.halt("test".into());
        let a = f.close_one(1);
        assert_eq!(f.add(a), Ok(AddOutcome::Accumulated { count: 1 }));
        f.chain.clear_halt();
        assert!(matches!(
            f.finalizer.tick(&mut f.chain, &mut f.ledger, NOW),
            Ok(Some(AddOutcome::Finalized(_)))
        ));
    }

    #[test]
    fn tampered_tip_is_a_consistency_fault() {
        let mut f = fixture(ChainParams {
            sub_blocks_per_block: 1,
            ..params(1)
        });
        let a = f.close_one(1);
        f.add(a).unwrap();
        f.chain.tip_mut().timestamp = Timestamp::new(999);
        let b = f.close_one(2);
        assert!(matches!(f.add(b), Err(ConsensusError::ConsistencyFault { index: 1, .. })));
        assert!(f.chain.is_halted());
    }

    #[test]
    fn partial_seal_depends_on_policy() {
        let mut f = fixture(three_per_block());
        let a = f.close_one(1);
        f.add(a).unwrap();
        assert_eq!(
            f.finalizer.seal_partial(&mut f.chain, &mut f.ledger, NOW),
            Err(ConsensusError::PartialSealNotAllowed)
        );

        let mut f = fixture(ChainParams {
            seal_policy: BlockSealPolicy::TimeBoxedPartial { max_wait_secs: 10 },
            ..three_per_block()
        });
        let a = f.close_one(1);
        f.add(a).unwrap();
        assert_eq!(f.finalizer.tick(&mut f.chain, &mut f.ledger, Timestamp::new(9)), Ok(None));
        match f.finalizer.tick(&mut f.chain, &mut f.ledger, Timestamp::new(10)) {
            Ok(Some(AddOutcome::Finalized(block))) => assert_eq!(block.sub_blocks.len(), 1),
            other => panic!("expected partial block, got {other:?}"),
        }
    }
}
