//! Child-chain settlement adapter.
//!
//! Takes finalized blocks from the main chain, groups their sub-blocks into
//! batches of `batch_size`, and submits one commitment per batch to the root
//! chain. Participants may exit value committed in a submitted batch; an
//! exit can be challenged with proof of a later spend until its window
//! closes.

use std::collections::BTreeMap;
use std::sync::Arc;

use strata_consensus::Block;
use strata_crypto::SignatureVerifier;
use strata_ledger::{LedgerState, LockPurpose};
use strata_transactions::verify_transaction_signature;
use strata_types::{AccountId, Amount, BatchId, ChainParams, ExitId, Timestamp, TxHash, TxStatus};
use tracing::{debug, info, warn};

use crate::batch::{BatchEntry, BatchStatus, ChildChainBatch};
use crate::error::PlasmaError;
use crate::exit::{ChallengeEvidence, Exit, ExitStatus};
use crate::root_chain::{RootChain, RootChainTx};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlasmaConfig {
    pub batch_size: usize,
    pub exit_challenge_window_secs: u64,
    pub root_submit_max_retries: u32,
}

impl From<&ChainParams> for PlasmaConfig {
    fn from(params: &ChainParams) -> Self {
        Self {
            batch_size: params.plasma_batch_size.max(1),
            exit_challenge_window_secs: params.exit_challenge_window_secs,
            root_submit_max_retries: params.root_submit_max_retries,
        }
    }
}

impl Default for PlasmaConfig {
    fn default() -> Self {
        Self::from(&ChainParams::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(RootChainTx),
    /// The transport failed; the batch is queued for `retry_submissions`.
    Queued { attempts: u32 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub submitted: Vec<BatchId>,
    pub still_queued: Vec<BatchId>,
    /// Out of retries; stays `FinalizedLocally` until submitted by hand.
    pub abandoned: Vec<BatchId>,
}

pub struct ChildChainAdapter {
    config: PlasmaConfig,
    root: Arc<dyn RootChain>,
    accumulating: Vec<BatchEntry>,
    batches: BTreeMap<BatchId, ChildChainBatch>,
    next_batch: BatchId,
    /// Failed attempts per queued batch.
    retry_queue: BTreeMap<BatchId, u32>,
    exits: BTreeMap<ExitId, Exit>,
    next_exit: ExitId,
}

impl ChildChainAdapter {
    pub fn new(config: PlasmaConfig, root: Arc<dyn RootChain>) -> Self {
        Self {
            config,
            root,
            accumulating: Vec::new(),
            batches: BTreeMap::new(),
            next_batch: BatchId::new(1),
            retry_queue: BTreeMap::new(),
            exits: BTreeMap::new(),
            next_exit: ExitId::new(1),
        }
    }

    pub fn config(&self) -> &PlasmaConfig {
        &self.config
    }

    /// Finalized sub-blocks not yet in a batch.
    pub fn accumulating(&self) -> usize {
        self.accumulating.len()
    }

    pub fn get_batch(&self, id: BatchId) -> Option<&ChildChainBatch> {
        self.batches.get(&id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &ChildChainBatch> {
        self.batches.values()
    }

    pub fn get_exit(&self, id: ExitId) -> Option<&Exit> {
        self.exits.get(&id)
    }

    pub fn exits(&self) -> impl Iterator<Item = &Exit> {
        self.exits.values()
    }

    pub fn queued_submissions(&self) -> usize {
        self.retry_queue.len()
    }

    /// Take a finalized block's sub-blocks. Returns the ids of any batches
    /// that filled up as a result.
    pub fn record_block(&mut self, block: &Block, now: Timestamp) -> Vec<BatchId> {
        self.accumulating
            .extend(block.sub_blocks.iter().map(|sb| BatchEntry {
                hash: sb.hash,
                block_index: block.index,
                tx_ids: sb.tx_ids(),
            }));

        let mut built = Vec::new();
        while self.accumulating.len() >= self.config.batch_size {
            let entries: Vec<BatchEntry> = self.accumulating.drain(..self.config.batch_size).collect();
            match self.build_batch(entries, now) {
                Ok(id) => built.push(id),
                Err(e) => warn!(error = %e, "failed to build batch"),
            }
        }
        built
    }

    /// Batch whatever has accumulated, even below `batch_size`.
    pub fn seal_pending(&mut self, now: Timestamp) -> Result<Option<BatchId>, PlasmaError> {
        if self.accumulating.is_empty() {
            return Ok(None);
        }
        let entries = std::mem::take(&mut self.accumulating);
        self.build_batch(entries, now).map(Some)
    }

    fn build_batch(&mut self, entries: Vec<BatchEntry>, now: Timestamp) -> Result<BatchId, PlasmaError> {
        let id = self.next_batch;
        let batch = ChildChainBatch::build(id, entries, now)?;
        self.next_batch = id.next();
        info!(batch = %id, sub_blocks = batch.sub_blocks.len(), commitment = %batch.commitment, "batch finalized locally");
        self.batches.insert(id, batch);
        Ok(id)
    }

    /// Submit a locally finalized batch's commitment to the root chain.
    ///
    /// Transport failures do not fail the call; the batch is queued for
    /// retry instead.
    pub fn submit_child_chain_batch(
        &mut self,
        id: BatchId,
        now: Timestamp,
    ) -> Result<SubmitOutcome, PlasmaError> {
        let batch = self.batches.get(&id).ok_or(PlasmaError::UnknownBatch(id))?;
        if batch.status != BatchStatus::FinalizedLocally {
            return Err(PlasmaError::BatchState {
                id,
                status: batch.status,
                expected: "FinalizedLocally",
            });
        }
        let tx = RootChainTx {
            batch_id: id,
            commitment: batch.commitment,
            sub_block_count: batch.sub_blocks.len(),
            submitted_at: now,
        };
        match self.root.submit(&tx) {
            Ok(()) => {
                self.mark_submitted(id, now);
                Ok(SubmitOutcome::Submitted(tx))
            }
            Err(e) => {
                let attempts = self.retry_queue.entry(id).or_insert(0);
                *attempts += 1;
                warn!(batch = %id, attempts = *attempts, error = %e, "root-chain submission failed, queued");
                Ok(SubmitOutcome::Queued {
                    attempts: *attempts,
                })
            }
        }
    }

    fn mark_submitted(&mut self, id: BatchId, now: Timestamp) {
        self.retry_queue.remove(&id);
        if let Some(batch) = self.batches.get_mut(&id) {
            batch.status = BatchStatus::SubmittedToRoot;
            batch.submitted_at = Some(now);
            info!(batch = %id, "batch submitted to root chain");
        }
    }

    /// Retry queued submissions. A batch is abandoned once its first attempt
    /// and `root_submit_max_retries` retries have all failed.
    pub fn retry_submissions(&mut self, now: Timestamp) -> RetryReport {
        let mut report = RetryReport::default();
        let queued: Vec<(BatchId, u32)> = self.retry_queue.iter().map(|(id, n)| (*id, *n)).collect();
        for (id, attempts) in queued {
            let Some(batch) = self.batches.get(&id) else {
                self.retry_queue.remove(&id);
                continue;
            };
            let tx = RootChainTx {
                batch_id: id,
                commitment: batch.commitment,
                sub_block_count: batch.sub_blocks.len(),
                submitted_at: now,
            };
            match self.root.submit(&tx) {
                Ok(()) => {
                    self.mark_submitted(id, now);
                    report.submitted.push(id);
                }
                Err(e) => {
                    let attempts = attempts + 1;
                    if attempts > self.config.root_submit_max_retries {
                        warn!(batch = %id, attempts, error = %e, "root-chain submission abandoned");
                        self.retry_queue.remove(&id);
                        report.abandoned.push(id);
                    } else {
                        debug!(batch = %id, attempts, error = %e, "root-chain submission retry failed");
                        self.retry_queue.insert(id, attempts);
                        report.still_queued.push(id);
                    }
                }
            }
        }
        report
    }

    /// Record the root chain's receipt for a batch. Returns the main-chain
    /// block indices the batch covers.
    pub fn acknowledge(&mut self, id: BatchId) -> Result<Vec<u64>, PlasmaError> {
        let batch = self.batches.get_mut(&id).ok_or(PlasmaError::UnknownBatch(id))?;
        if !batch.status.is_submitted() {
            return Err(PlasmaError::BatchState {
                id,
                status: batch.status,
                expected: "submitted",
            });
        }
        batch.acknowledged = true;
        info!(batch = %id, "batch acknowledged by root chain");
        Ok(batch.blocks.iter().copied().collect())
    }

    /// Start withdrawing `amount` from a submitted batch. The amount is
    /// locked out of the participant's available balance until the exit
    /// finalizes or is challenged.
    pub fn initiate_exit(
        &mut self,
        ledger: &mut LedgerState,
        batch_id: BatchId,
        participant: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<ExitId, PlasmaError> {
        if amount.is_zero() {
            return Err(PlasmaError::ZeroAmount);
        }
        let batch = self.batches.get(&batch_id).ok_or(PlasmaError::UnknownBatch(batch_id))?;
        if !batch.status.is_submitted() {
            return Err(PlasmaError::BatchState {
                id: batch_id,
                status: batch.status,
                expected: "submitted",
            });
        }
        let lock = ledger.lock_funds(participant, amount, LockPurpose::ChildChainExit, now)?;

        let id = self.next_exit;
        self.next_exit = id.next();
        self.exits.insert(
            id,
            Exit {
                id,
                batch_id,
                participant: participant.clone(),
                amount,
                lock,
                initiated_at: now,
                status: ExitStatus::Pending,
                challenger: None,
            },
        );
        info!(exit = %id, batch = %batch_id, %participant, %amount, "exit initiated");
        Ok(id)
    }

    /// Reject a pending exit with proof that the participant spent funds in
    /// a later batch. The lock is released and the challenger rewarded.
    pub fn challenge_exit(
        &mut self,
        ledger: &mut LedgerState,
        exit_id: ExitId,
        evidence: &ChallengeEvidence,
        challenger: &AccountId,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), PlasmaError> {
        let exit = self.exits.get(&exit_id).ok_or(PlasmaError::UnknownExit(exit_id))?;
        if exit.status != ExitStatus::Pending {
            return Err(PlasmaError::ExitNotPending {
                id: exit_id,
                status: exit.status,
            });
        }
        if exit.window_closed(self.config.exit_challenge_window_secs, now) {
            return Err(PlasmaError::ChallengeWindowClosed(exit_id));
        }
        self.check_evidence(ledger, exit, evidence, verifier)?;

        let lock = exit.lock;
        let amount = exit.amount;
        let batch_id = exit.batch_id;
        ledger.release_lock(lock)?;
        if let Some(exit) = self.exits.get_mut(&exit_id) {
            exit.status = ExitStatus::Challenged;
            exit.challenger = Some(challenger.clone());
        }
        if let Some(batch) = self.batches.get_mut(&batch_id) {
            batch.status = BatchStatus::Challenged;
        }
        ledger.record_reward(challenger.clone(), amount, format!("challenged {exit_id}"), now);
        info!(exit = %exit_id, %challenger, "exit challenged");
        Ok(())
    }

    fn check_evidence(
        &self,
        ledger: &LedgerState,
        exit: &Exit,
        evidence: &ChallengeEvidence,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), PlasmaError> {
        let batch = self
            .batches
            .get(&evidence.batch_id)
            .ok_or(PlasmaError::UnknownBatch(evidence.batch_id))?;
        if evidence.batch_id <= exit.batch_id {
            return Err(PlasmaError::InvalidEvidence("evidence batch is not later than the exit batch"));
        }
        if !batch.status.is_submitted() {
            return Err(PlasmaError::InvalidEvidence("evidence batch was never submitted"));
        }
        if !batch.contains_sub_block(&evidence.sub_block)
            || !batch.verify_inclusion(&evidence.sub_block, &evidence.proof)
        {
            return Err(PlasmaError::InvalidEvidence("sub-block is not committed in the evidence batch"));
        }

        let tx = &evidence.transaction;
        if tx.canonical_id() != tx.id {
            return Err(PlasmaError::InvalidEvidence("transaction id does not match its contents"));
        }
        if !batch.contains_transaction(&evidence.sub_block, &tx.id) {
            return Err(PlasmaError::InvalidEvidence("transaction is not in the sub-block"));
        }
        if tx.from != exit.participant {
            return Err(PlasmaError::InvalidEvidence("transaction does not spend the exiting participant's funds"));
        }
        let key = ledger.public_key(&exit.participant)?;
        verify_transaction_signature(tx, &key, verifier)
            .map_err(|_| PlasmaError::InvalidEvidence("transaction signature does not verify"))
    }

    /// Finalize pending exits whose challenge window has passed. The locked
    /// value leaves the ledger.
    pub fn process_expired_exits(&mut self, ledger: &mut LedgerState, now: Timestamp) -> Vec<Exit> {
        let window = self.config.exit_challenge_window_secs;
        let due: Vec<ExitId> = self
            .exits
            .values()
            .filter(|e| e.status == ExitStatus::Pending && e.window_closed(window, now))
            .map(|e| e.id)
            .collect();

        let mut finalized = Vec::with_capacity(due.len());
        for id in due {
            let Some(exit) = self.exits.get_mut(&id) else {
                continue;
            };
            if let Err(e) = ledger.consume_lock(exit.lock) {
                warn!(exit = %id, error = %e, "failed to consume exit lock");
                continue;
            }
            exit.status = ExitStatus::Finalized;
            let exit = exit.clone();

            if let Some(batch) = self.batches.get_mut(&exit.batch_id) {
                batch.status = BatchStatus::Exited;
                let credited: Vec<TxHash> = batch
                    .tx_ids()
                    .filter(|tx| {
                        ledger.get_transaction(tx).is_some_and(|t| {
                            t.to == exit.participant && t.status == TxStatus::Finalized
                        })
                    })
                    .copied()
                    .collect();
                for tx in credited {
                    if let Err(e) = ledger.mark_spent(&tx) {
                        debug!(%tx, error = %e, "could not mark transaction spent");
                    }
                }
            }
            info!(exit = %id, participant = %exit.participant, amount = %exit.amount, "exit finalized");
            finalized.push(exit);
        }
        finalized
    }
}
