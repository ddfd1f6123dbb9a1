//! Chain engine: drives the assembler and finalizer for one validator and
//! imports blocks finalized elsewhere.
//!
//! The engine owns consensus state but not the ledger; every call borrows
//! the ledger so the caller decides how both are locked together.

use std::collections::HashSet;
use std::sync::Arc;

use strata_crypto::SignatureVerifier;
use strata_ledger::LedgerState;
use strata_transactions::Transaction;
use strata_types::{BlockHash, ChainParams, SubBlockId, SubBlockStatus, Timestamp, TxHash, TxStatus, ValidatorId};
use tracing::{debug, error, info, warn};

use crate::assembler::{CloseOutcome, SubBlockAssembler};
use crate::block::Block;
use crate::chain::Chain;
use crate::error::ConsensusError;
use crate::finalizer::{AbortedBlock, AddOutcome, BlockFinalizer};
use crate::sub_block::SubBlock;
use crate::validation::validate_block;

/// Something observable that happened inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    SubBlockClosed(SubBlock),
    SubBlockRejected {
        id: SubBlockId,
        reason: ConsensusError,
        returned: Vec<TxHash>,
    },
    BlockFinalized(Block),
    BlockAborted {
        offending: TxHash,
        discarded: Vec<SubBlockId>,
        returned: Vec<TxHash>,
        reason: ConsensusError,
    },
    BlockImported(Block),
    BlockRejected {
        hash: BlockHash,
        index: u64,
        reason: ConsensusError,
    },
    ConsistencyFault {
        reason: ConsensusError,
    },
    /// Pooled transactions that went stale or invalid; status `Reversed`.
    TransactionsDropped(Vec<Transaction>),
}

/// How a replayed block's transactions reach the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Move balances as the block did originally.
    Apply,
    /// Rebuild the duplicate cache only; balances come from a snapshot.
    CacheOnly,
}

pub struct ChainEngine {
    params: ChainParams,
    verifier: Arc<dyn SignatureVerifier>,
    assembler: SubBlockAssembler,
    finalizer: BlockFinalizer,
    chain: Chain,
}

impl ChainEngine {
    pub fn new(
        validator: ValidatorId,
        params: ChainParams,
        genesis: Block,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            assembler: SubBlockAssembler::new(validator, &params),
            finalizer: BlockFinalizer::new(&params),
            chain: Chain::new(genesis),
            params,
            verifier,
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn assembler(&self) -> &SubBlockAssembler {
        &self.assembler
    }

    pub fn finalizer(&self) -> &BlockFinalizer {
        &self.finalizer
    }

    pub fn height(&self) -> u64 {
        self.chain.height()
    }

    pub fn is_halted(&self) -> bool {
        self.chain.is_halted()
    }

    /// Look a sub-block up wherever it currently lives: open, accumulated or
    /// finalized.
    pub fn get_sub_block(&self, id: &SubBlockId) -> Option<&SubBlock> {
        self.assembler
            .open_sub_block()
            .filter(|sb| sb.id == *id)
            .or_else(|| self.finalizer.pending().iter().find(|sb| sb.id == *id))
            .or_else(|| self.chain.get_sub_block(id))
    }

    pub fn mark_confirmed(&mut self, index: u64) -> bool {
        self.chain.mark_confirmed(index)
    }

    /// Accept a new transaction into the open sub-block.
    pub fn submit_transaction(
        &mut self,
        ledger: &mut LedgerState,
        tx: &Transaction,
        now: Timestamp,
    ) -> Result<Vec<EngineEvent>, ConsensusError> {
        let closed = self.assembler.submit(ledger, tx, now, &*self.verifier)?;
        let mut events = Vec::new();
        if let Some(outcome) = closed {
            self.handle_close(outcome, ledger, now, &mut events);
        }
        Ok(events)
    }

    /// Periodic work: close an aged sub-block, seal a timed-out partial
    /// block, and resubmit pooled transactions.
    pub fn tick(&mut self, ledger: &mut LedgerState, now: Timestamp) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if let Some(outcome) = self.assembler.tick(ledger, now, &*self.verifier) {
            self.handle_close(outcome, ledger, now, &mut events);
        }
        match self.finalizer.tick(&mut self.chain, ledger, now) {
            Ok(Some(outcome)) => self.handle_add(Ok(outcome), ledger, &mut events),
            Ok(None) => {}
            Err(e) => self.handle_add(Err(e), ledger, &mut events),
        }
        if !self.assembler.pool().is_empty() {
            let rebatch = self.assembler.rebatch_pending(ledger, now, &*self.verifier);
            for outcome in rebatch.closed {
                self.handle_close(outcome, ledger, now, &mut events);
            }
            if !rebatch.dropped.is_empty() {
                info!(dropped = rebatch.dropped.len(), "pooled transactions dropped");
                events.push(EngineEvent::TransactionsDropped(rebatch.dropped));
            }
        }
        events
    }

    /// Close the open sub-block and finalize everything accumulated as a
    /// partial block.
    pub fn seal_partial(
        &mut self,
        ledger: &mut LedgerState,
        now: Timestamp,
    ) -> Result<Vec<EngineEvent>, ConsensusError> {
        if !self.params.seal_policy.allows_partial() {
            return Err(ConsensusError::PartialSealNotAllowed);
        }
        let mut events = Vec::new();
        if let Some(outcome) = self.assembler.close(ledger, now, &*self.verifier) {
            self.handle_close(outcome, ledger, now, &mut events);
        }
        match self.finalizer.seal_partial(&mut self.chain, ledger, now) {
            Ok(Some(outcome)) => self.handle_add(Ok(outcome), ledger, &mut events),
            Ok(None) => {}
            Err(e) => self.handle_add(Err(e), ledger, &mut events),
        }
        Ok(events)
    }

    /// Resume after an operator cleared a halt, finalizing anything that
    /// accumulated meanwhile.
    pub fn clear_halt(&mut self, ledger: &mut LedgerState, now: Timestamp) -> Vec<EngineEvent> {
        self.chain.clear_halt();
        let mut events = Vec::new();
        match self.finalizer.tick(&mut self.chain, ledger, now) {
            Ok(Some(outcome)) => self.handle_add(Ok(outcome), ledger, &mut events),
            Ok(None) => {}
            Err(e) => self.handle_add(Err(e), ledger, &mut events),
        }
        events
    }

    /// Import a block finalized by another validator.
    ///
    /// Local sub-blocks built on the old tip are discarded and their
    /// transactions pooled. The block's transactions are applied all or
    /// nothing; a block that fails validation or application is recorded as
    /// rejected.
    pub fn import_block(
        &mut self,
        ledger: &mut LedgerState,
        block: Block,
        now: Timestamp,
    ) -> Result<Vec<EngineEvent>, ConsensusError> {
        if let Err(reason) =
            validate_block(&block, &self.chain, &self.params, ledger, &*self.verifier)
        {
            warn!(index = block.index, hash = %block.hash, %reason, "block rejected");
            // A copy whose contents don't hash to its claimed hash must not
            // blacklist the genuine block.
            if block.verify_root() && block.verify_hash() {
                self.chain.record_rejected(block.hash);
            }
            return Err(reason);
        }

        let mut events = Vec::new();
        self.discard_local(ledger);
        self.rewind_to_finalizer();

        let mut applied: Vec<TxHash> = Vec::with_capacity(block.tx_count());
        for tx in block.sub_blocks.iter().flat_map(|sb| &sb.transactions) {
            let result = ledger
                .validate(tx, block.timestamp, &*self.verifier)
                .map_err(ConsensusError::from)
                .and_then(|()| ledger.apply(tx, now).map_err(ConsensusError::from));
            if let Err(reason) = result {
                for id in applied.iter().rev() {
                    if let Err(e) = ledger.reverse(id) {
                        error!(tx = %id, error = %e, "failed to unwind rejected block");
                        self.chain.halt(format!("unwinding block {} failed: {e}", block.index));
                        break;
                    }
                }
                warn!(index = block.index, hash = %block.hash, %reason, "block rejected on apply");
                self.chain.record_rejected(block.hash);
                return Err(reason);
            }
            applied.push(tx.id);
        }

        ledger.mark_finalized(&applied, now)?;
        ledger.advance_chain(block.index, block.hash)?;

        let mut block = block;
        for sb in &mut block.sub_blocks {
            sb.status = SubBlockStatus::Included;
            self.assembler.bump_next_id(sb.id);
            for tx in &mut sb.transactions {
                tx.status = TxStatus::Finalized;
            }
        }
        self.chain.append(block.clone())?;

        let (prev, seq) = self.chain.last_sub_block();
        self.assembler.rewind_link(prev, seq + 1);
        info!(index = block.index, hash = %block.hash, txs = applied.len(), "block imported");
        events.push(EngineEvent::BlockImported(block));
        Ok(events)
    }

    /// Re-apply a block read back from this node's own block log.
    ///
    /// The block was validated before it was persisted, so only its hashes
    /// and linkage are rechecked; freshness and signatures are not. Any
    /// failure means the log and the ledger disagree and is returned as is.
    pub fn replay_block(
        &mut self,
        ledger: &mut LedgerState,
        block: Block,
        mode: ReplayMode,
    ) -> Result<(), ConsensusError> {
        if !block.verify_root() {
            return Err(ConsensusError::SubBlockRootMismatch { index: block.index });
        }
        if !block.verify_hash() {
            return Err(ConsensusError::BlockHashMismatch { index: block.index });
        }

        let txs = block.sub_blocks.iter().flat_map(|sb| &sb.transactions);
        match mode {
            ReplayMode::Apply => {
                let mut applied = Vec::with_capacity(block.tx_count());
                for tx in txs {
                    ledger.apply(tx, block.timestamp)?;
                    applied.push(tx.id);
                }
                ledger.mark_finalized(&applied, block.timestamp)?;
            }
            ReplayMode::CacheOnly => {
                for tx in txs {
                    ledger.record_finalized(tx, block.timestamp)?;
                }
            }
        }
        ledger.advance_chain(block.index, block.hash)?;

        for sb in &block.sub_blocks {
            self.assembler.bump_next_id(sb.id);
        }
        let index = block.index;
        let count = block.tx_count();
        self.chain.append(block)?;
        let (prev, seq) = self.chain.last_sub_block();
        self.assembler.rewind_link(prev, seq + 1);
        debug!(index, txs = count, ?mode, "block replayed");
        Ok(())
    }

    /// Ids of transactions applied to the ledger but not yet in a block:
    /// accumulated sub-blocks first, then the open one, oldest first.
    pub fn in_flight(&self) -> Vec<TxHash> {
        self.finalizer
            .pending()
            .iter()
            .chain(self.assembler.open_sub_block())
            .flat_map(|sb| sb.tx_ids())
            .collect()
    }

    fn handle_close(
        &mut self,
        outcome: CloseOutcome,
        ledger: &mut LedgerState,
        now: Timestamp,
        events: &mut Vec<EngineEvent>,
    ) {
        match outcome {
            CloseOutcome::Closed(sb) => {
                events.push(EngineEvent::SubBlockClosed(sb.clone()));
                let txs = sb.transactions.clone();
                match self.finalizer.add_sub_block(sb, &mut self.chain, ledger, now) {
                    Err(e) if !matches!(e, ConsensusError::ConsistencyFault { .. }) => {
                        // Refused outright; nothing else links to it yet.
                        warn!(error = %e, "closed sub-block refused by finalizer");
                        if let Err(e) = self.assembler.return_to_pool(ledger, txs) {
                            self.halt_on_reversal_failure(&e);
                        }
                        self.rewind_to_finalizer();
                    }
                    result => self.handle_add(result, ledger, events),
                }
            }
            CloseOutcome::Rejected {
                id,
                reason,
                returned,
            } => events.push(EngineEvent::SubBlockRejected {
                id,
                reason,
                returned,
            }),
        }
    }

    fn handle_add(
        &mut self,
        result: Result<AddOutcome, ConsensusError>,
        ledger: &mut LedgerState,
        events: &mut Vec<EngineEvent>,
    ) {
        match result {
            Ok(AddOutcome::Accumulated { .. }) => {}
            Ok(AddOutcome::Finalized(block)) => events.push(EngineEvent::BlockFinalized(block)),
            Ok(AddOutcome::Aborted(aborted)) => {
                let event = self.handle_abort(aborted, ledger);
                events.push(event);
            }
            Err(reason @ ConsensusError::ConsistencyFault { .. }) => {
                events.push(EngineEvent::ConsistencyFault { reason });
            }
            Err(e) => warn!(error = %e, "finalization failed"),
        }
    }

    /// Unwind an aborted block. The open sub-block links past the discarded
    /// ones, so it goes too. Transactions are reversed newest-first and
    /// pooled in their original order.
    fn handle_abort(&mut self, aborted: AbortedBlock, ledger: &mut LedgerState) -> EngineEvent {
        let AbortedBlock {
            offending,
            discarded,
            reason,
        } = aborted;

        let mut returned = Vec::new();
        match self.assembler.abort(ledger) {
            Ok(ids) => returned = ids,
            Err(e) => self.halt_on_reversal_failure(&e),
        }

        // Transactions still referenced by kept sub-blocks stay applied.
        let kept: HashSet<TxHash> = self
            .finalizer
            .pending()
            .iter()
            .flat_map(|sb| sb.transactions.iter().map(|tx| tx.id))
            .collect();
        let txs: Vec<Transaction> = discarded
            .iter()
            .flat_map(|sb| sb.transactions.iter())
            .filter(|tx| !kept.contains(&tx.id))
            .cloned()
            .collect();
        match self.assembler.return_to_pool(ledger, txs) {
            Ok(mut ids) => {
                ids.append(&mut returned);
                returned = ids;
            }
            Err(e) => self.halt_on_reversal_failure(&e),
        }
        self.rewind_to_finalizer();

        EngineEvent::BlockAborted {
            offending,
            discarded: discarded.iter().map(|sb| sb.id).collect(),
            returned,
            reason,
        }
    }

    /// Abort the open sub-block and drop accumulated ones, pooling their
    /// transactions. Used before importing a foreign block.
    fn discard_local(&mut self, ledger: &mut LedgerState) {
        let mut returned = match self.assembler.abort(ledger) {
            Ok(ids) => ids.len(),
            Err(e) => {
                self.halt_on_reversal_failure(&e);
                0
            }
        };
        let txs: Vec<Transaction> = self
            .finalizer
            .clear()
            .into_iter()
            .flat_map(|sb| sb.transactions)
            .collect();
        match self.assembler.return_to_pool(ledger, txs) {
            Ok(ids) => returned += ids.len(),
            Err(e) => self.halt_on_reversal_failure(&e),
        }
        if returned > 0 {
            info!(returned, "local sub-blocks discarded for imported block");
        }
    }

    fn rewind_to_finalizer(&mut self) {
        let (prev, seq) = self.finalizer.expected_prev(&self.chain);
        self.assembler.rewind_link(prev, seq + 1);
    }

    fn halt_on_reversal_failure(&mut self, e: &ConsensusError) {
        error!(error = %e, "transaction reversal failed");
        self.chain.halt(format!("reversal failed: {e}"));
    }
}
