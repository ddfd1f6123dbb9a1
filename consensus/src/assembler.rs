//! Sub-block assembler.
//!
//! Accepts transactions one at a time into the open sub-block, applying each
//! to the ledger as it is accepted. A sub-block closes when it reaches
//! `max_txs`, or on `tick` once it is older than `max_age_secs`. Closing
//! re-validates the batch; a batch that fails is discarded whole, its
//! transactions reversed and returned to the pending pool.

use std::collections::HashSet;

use strata_crypto::SignatureVerifier;
use strata_ledger::{LedgerError, LedgerState};
use strata_transactions::{check_freshness, Transaction};
use strata_types::{ChainParams, SubBlockHash, SubBlockId, SubBlockStatus, Timestamp, TxHash, TxStatus, ValidatorId};
use tracing::{debug, info, warn};

use crate::error::ConsensusError;
use crate::pool::PendingPool;
use crate::sub_block::SubBlock;
use crate::verify::verify_signatures;

/// What happened when a sub-block was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed(SubBlock),
    /// Re-validation failed; the transactions were reversed and pooled.
    Rejected {
        id: SubBlockId,
        reason: ConsensusError,
        returned: Vec<TxHash>,
    },
}

/// Result of resubmitting the pending pool.
#[derive(Debug, Default)]
pub struct RebatchOutcome {
    pub included: usize,
    /// Stale or no longer valid; status `Reversed`.
    pub dropped: Vec<Transaction>,
    pub closed: Vec<CloseOutcome>,
}

#[derive(Debug)]
pub struct SubBlockAssembler {
    validator: ValidatorId,
    max_txs: usize,
    max_age_secs: u64,
    open: Option<SubBlock>,
    open_ids: HashSet<TxHash>,
    next_id: SubBlockId,
    next_sequence: u64,
    last_closed_hash: SubBlockHash,
    pool: PendingPool,
}

impl SubBlockAssembler {
    pub fn new(validator: ValidatorId, params: &ChainParams) -> Self {
        Self {
            validator,
            max_txs: params.max_sub_block_txs.max(1),
            max_age_secs: params.sub_block_max_age_secs,
            open: None,
            open_ids: HashSet::new(),
            next_id: SubBlockId::new(1),
            next_sequence: 1,
            last_closed_hash: SubBlockHash::ZERO,
            pool: PendingPool::new(params.pending_pool_capacity),
        }
    }

    pub fn validator(&self) -> &ValidatorId {
        &self.validator
    }

    pub fn open_sub_block(&self) -> Option<&SubBlock> {
        self.open.as_ref()
    }

    pub fn pool(&self) -> &PendingPool {
        &self.pool
    }

    /// Hash and sequence index the next closed sub-block will link to.
    pub fn link(&self) -> (SubBlockHash, u64) {
        (self.last_closed_hash, self.next_sequence)
    }

    /// Point the next close at a different predecessor, after accumulated
    /// sub-blocks were discarded or a foreign block was imported.
    pub fn rewind_link(&mut self, prev_hash: SubBlockHash, next_sequence: u64) {
        debug!(%prev_hash, next_sequence, "assembler link rewound");
        self.last_closed_hash = prev_hash;
        self.next_sequence = next_sequence;
    }

    /// Keep locally assigned ids ahead of ids seen in imported blocks.
    pub fn bump_next_id(&mut self, seen: SubBlockId) {
        if seen >= self.next_id {
            self.next_id = seen.next();
        }
    }

    pub fn is_known(&self, id: &TxHash) -> bool {
        self.open_ids.contains(id) || self.pool.contains(id)
    }

    /// Accept one transaction. Returns the close outcome if this
    /// transaction filled the sub-block.
    pub fn submit(
        &mut self,
        ledger: &mut LedgerState,
        tx: &Transaction,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Result<Option<CloseOutcome>, ConsensusError> {
        if ledger.contains_transaction(&tx.id) || self.is_known(&tx.id) {
            return Err(ConsensusError::DuplicateTransaction(tx.id));
        }
        ledger.validate(tx, now, verifier)?;
        self.accept(ledger, tx, now)?;

        if self.open.as_ref().map_or(0, SubBlock::len) >= self.max_txs {
            return Ok(self.close(ledger, now, verifier));
        }
        Ok(None)
    }

    fn accept(
        &mut self,
        ledger: &mut LedgerState,
        tx: &Transaction,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        let applied = ledger.apply(tx, now).map_err(|e| match e {
            LedgerError::DuplicateTransaction(id) => ConsensusError::DuplicateTransaction(id),
            other => ConsensusError::Ledger(other),
        })?;

        if self.open.is_none() {
            let id = self.next_id;
            self.next_id = id.next();
            debug!(sub_block = %id, "sub-block opened");
            self.open = Some(SubBlock::open(id, self.validator.clone(), now));
        }
        self.open_ids.insert(applied.id);
        if let Some(open) = self.open.as_mut() {
            open.transactions.push(applied);
        }
        Ok(())
    }

    /// Close the open sub-block if it has outlived `max_age_secs`.
    pub fn tick(
        &mut self,
        ledger: &mut LedgerState,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Option<CloseOutcome> {
        let due = self
            .open
            .as_ref()
            .is_some_and(|sb| !sb.is_empty() && sb.created_at.has_expired(self.max_age_secs, now));
        if due {
            self.close(ledger, now, verifier)
        } else {
            None
        }
    }

    /// Close the open sub-block. An empty sub-block is never closed.
    pub fn close(
        &mut self,
        ledger: &mut LedgerState,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Option<CloseOutcome> {
        if self.open.as_ref().map_or(true, SubBlock::is_empty) {
            return None;
        }
        let mut sb = self.open.take()?;
        self.open_ids.clear();
        sb.status = SubBlockStatus::Validating;

        match revalidate(&sb, ledger, verifier) {
            Ok(()) => {
                sb.seal(self.next_sequence, self.last_closed_hash, now);
                self.last_closed_hash = sb.hash;
                self.next_sequence += 1;
                info!(
                    sub_block = %sb.id,
                    sequence = sb.sequence_index,
                    txs = sb.len(),
                    hash = %sb.hash,
                    "sub-block closed"
                );
                Some(CloseOutcome::Closed(sb))
            }
            Err(reason) => {
                warn!(sub_block = %sb.id, %reason, "sub-block rejected at close");
                let id = sb.id;
                let returned = match self.return_to_pool(ledger, sb.transactions) {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(sub_block = %id, error = %e, "reversal failed while rejecting sub-block");
                        Vec::new()
                    }
                };
                Some(CloseOutcome::Rejected {
                    id,
                    reason,
                    returned,
                })
            }
        }
    }

    /// Cancel the open sub-block: reverse its transactions and pool them.
    pub fn abort(&mut self, ledger: &mut LedgerState) -> Result<Vec<TxHash>, ConsensusError> {
        let Some(sb) = self.open.take() else {
            return Ok(Vec::new());
        };
        self.open_ids.clear();
        debug!(sub_block = %sb.id, txs = sb.len(), "open sub-block aborted");
        self.return_to_pool(ledger, sb.transactions)
    }

    /// Reverse still-included transactions newest-first and put them at the
    /// head of the pool in their original order. Transactions that are no
    /// longer reversible (already finalized) are skipped.
    pub fn return_to_pool(
        &mut self,
        ledger: &mut LedgerState,
        txs: Vec<Transaction>,
    ) -> Result<Vec<TxHash>, ConsensusError> {
        let mut reversed = Vec::with_capacity(txs.len());
        for tx in txs.iter().rev() {
            let still_included = ledger
                .get_transaction(&tx.id)
                .is_some_and(|t| t.status == TxStatus::Included);
            if still_included {
                reversed.push(ledger.reverse(&tx.id)?);
            }
        }
        reversed.reverse();
        let ids = reversed.iter().map(|tx| tx.id).collect();
        for evicted in self.pool.requeue_front(reversed) {
            warn!(tx = %evicted.id, "pending pool full, transaction dropped");
        }
        Ok(ids)
    }

    /// Resubmit everything in the pending pool. Stale or now-invalid
    /// transactions are dropped as `Reversed`.
    pub fn rebatch_pending(
        &mut self,
        ledger: &mut LedgerState,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> RebatchOutcome {
        let mut outcome = RebatchOutcome::default();
        let window = ledger.config().staleness_window_secs;

        for mut tx in self.pool.drain() {
            if ledger.contains_transaction(&tx.id) {
                // Finalized meanwhile through another path.
                continue;
            }
            if check_freshness(tx.timestamp, now, window).is_err() {
                tx.status = TxStatus::Reversed;
                outcome.dropped.push(tx);
                continue;
            }
            match self.submit(ledger, &tx, now, verifier) {
                Ok(closed) => {
                    outcome.included += 1;
                    outcome.closed.extend(closed);
                }
                Err(e) => {
                    debug!(tx = %tx.id, error = %e, "pooled transaction dropped");
                    tx.status = TxStatus::Reversed;
                    outcome.dropped.push(tx);
                }
            }
        }
        outcome
    }
}

fn revalidate(
    sb: &SubBlock,
    ledger: &LedgerState,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ConsensusError> {
    let mut seen = HashSet::with_capacity(sb.len());
    for tx in &sb.transactions {
        if !seen.insert(tx.id) {
            return Err(ConsensusError::DuplicateInBlock(tx.id));
        }
    }
    verify_signatures(&sb.transactions, ledger, verifier)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use strata_crypto::{keypair_from_seed, Ed25519Verifier};
    use strata_ledger::LedgerConfig;
    use strata_types::{AccountId, Amount, KeyPair, PublicKey, Signature};

    pub(crate) fn key(seed: u8) -> KeyPair {
        keypair_from_seed(&[seed; 32])
    }

    /// alice (seed 1) = 1000, bob (seed 2) = 1000, carol (seed 3) = 0.
    pub(crate) fn ledger() -> LedgerState {
        let mut l = LedgerState::new(LedgerConfig::default());
        l.open_account(AccountId::new("alice"), key(1).public, Amount::new(1_000)).unwrap();
        l.open_account(AccountId::new("bob"), key(2).public, Amount::new(1_000)).unwrap();
        l.open_account(AccountId::new("carol"), key(3).public, Amount::ZERO).unwrap();
        l
    }

    pub(crate) fn transfer(amount: u128, ts: u64) -> Transaction {
        Transaction::create(
            AccountId::new("alice"),
            AccountId::new("bob"),
            Amount::new(amount),
            Amount::new(1),
            Timestamp::new(ts),
            &key(1).private,
        )
    }

    pub(crate) fn params(max_txs: usize) -> ChainParams {
        ChainParams {
            max_sub_block_txs: max_txs,
            ..ChainParams::default()
        }
    }

    /// Accepts signatures until told to start failing.
    #[derive(Default)]
    pub(crate) struct SwitchVerifier {
        pub(crate) fail: AtomicBool,
    }

    impl SignatureVerifier for SwitchVerifier {
        fn verify(&self, key: &PublicKey, msg: &[u8], sig: &Signature) -> bool {
            !self.fail.load(Ordering::SeqCst) && Ed25519Verifier.verify(key, msg, sig)
        }
    }

    const T0: Timestamp = Timestamp::EPOCH;

    #[test]
    fn submit_applies_immediately() {
        let mut l = ledger();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(10));
        let t = transfer(10, 0);
        assert_eq!(asm.submit(&mut l, &t, T0, &Ed25519Verifier), Ok(None));
        assert_eq!(l.get_balance(&AccountId::new("alice")).unwrap(), Amount::new(989));
        assert_eq!(l.get_transaction(&t.id).unwrap().status, TxStatus::Included);
        assert_eq!(asm.open_sub_block().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_rejected_without_side_effects() {
        let mut l = ledger();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(10));
        let t = transfer(10, 0);
        asm.submit(&mut l, &t, T0, &Ed25519Verifier).unwrap();
        assert_eq!(
            asm.submit(&mut l, &t, T0, &Ed25519Verifier),
            Err(ConsensusError::DuplicateTransaction(t.id))
        );
        assert_eq!(asm.open_sub_block().unwrap().len(), 1);
        assert_eq!(l.get_balance(&AccountId::new("alice")).unwrap(), Amount::new(989));
    }

    #[test]
    fn invalid_transaction_rejected() {
        let mut l = ledger();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(10));
        let t = transfer(5_000, 0);
        assert!(matches!(
            asm.submit(&mut l, &t, T0, &Ed25519Verifier),
            Err(ConsensusError::Validation(_))
        ));
        assert!(asm.open_sub_block().is_none());
    }

    #[test]
    fn closes_at_capacity_and_links() {
        let mut l = ledger();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(2));
        assert_eq!(asm.submit(&mut l, &transfer(1, 0), T0, &Ed25519Verifier), Ok(None));
        let first = match asm.submit(&mut l, &transfer(2, 0), T0, &Ed25519Verifier) {
            Ok(Some(CloseOutcome::Closed(sb))) => sb,
            other => panic!("expected close, got {other:?}"),
        };
        assert_eq!(first.sequence_index, 1);
        assert!(first.prev_hash.is_zero());
        assert!(asm.open_sub_block().is_none());

        asm.submit(&mut l, &transfer(3, 0), T0, &Ed25519Verifier).unwrap();
        let second = match asm.submit(&mut l, &transfer(4, 0), T0, &Ed25519Verifier) {
            Ok(Some(CloseOutcome::Closed(sb))) => sb,
            other => panic!("expected close, got {other:?}"),
        };
        assert_eq!(second.sequence_index, 2);
        assert_eq!(second.prev_hash, first.hash);
        assert!(second.id > first.id);
    }

    #[test]
    fn tick_closes_aged_sub_block_only() {
        let mut l = ledger();
        let p = params(100);
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &p);
        assert!(asm.tick(&mut l, Timestamp::new(100), &Ed25519Verifier).is_none());

        asm.submit(&mut l, &transfer(1, 0), T0, &Ed25519Verifier).unwrap();
        let early = Timestamp::new(p.sub_block_max_age_secs - 1);
        assert!(asm.tick(&mut l, early, &Ed25519Verifier).is_none());
        let due = Timestamp::new(p.sub_block_max_age_secs);
        assert!(matches!(
            asm.tick(&mut l, due, &Ed25519Verifier),
            Some(CloseOutcome::Closed(_))
        ));
    }

    #[test]
    fn empty_sub_block_never_closes() {
        let mut l = ledger();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(10));
        assert!(asm.close(&mut l, T0, &Ed25519Verifier).is_none());
    }

    #[test]
    fn rejected_close_reverses_and_pools() {
        let mut l = ledger();
        let verifier = SwitchVerifier::default();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(10));
        let a = transfer(1, 0);
        let b = transfer(2, 0);
        asm.submit(&mut l, &a, T0, &verifier).unwrap();
        asm.submit(&mut l, &b, T0, &verifier).unwrap();

        verifier.fail.store(true, Ordering::SeqCst);
        match asm.close(&mut l, T0, &verifier) {
            Some(CloseOutcome::Rejected { returned, reason, .. }) => {
                assert_eq!(returned, vec![a.id, b.id]);
                assert_eq!(reason, ConsensusError::InvalidSignature(a.id));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(l.get_balance(&AccountId::new("alice")).unwrap(), Amount::new(1_000));
        assert!(!l.contains_transaction(&a.id));
        assert_eq!(asm.pool().len(), 2);
        assert_eq!(asm.link(), (SubBlockHash::ZERO, 1));

        // Pooled ids still count as known.
        assert_eq!(
            asm.submit(&mut l, &a, T0, &verifier),
            Err(ConsensusError::DuplicateTransaction(a.id))
        );
    }

    #[test]
    fn abort_returns_transactions_to_pool() {
        let mut l = ledger();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(10));
        let t = transfer(7, 0);
        asm.submit(&mut l, &t, T0, &Ed25519Verifier).unwrap();
        assert_eq!(asm.abort(&mut l).unwrap(), vec![t.id]);
        assert!(asm.open_sub_block().is_none());
        assert!(asm.pool().contains(&t.id));
        assert_eq!(l.get_balance(&AccountId::new("bob")).unwrap(), Amount::new(1_000));
    }

    #[test]
    fn rebatch_resubmits_fresh_and_drops_stale() {
        let mut l = ledger();
        let verifier = SwitchVerifier::default();
        let mut asm = SubBlockAssembler::new(ValidatorId::new("v1"), &params(10));
        let window = l.config().staleness_window_secs;
        let old = transfer(1, 0);
        let fresh = transfer(2, window);
        asm.submit(&mut l, &old, Timestamp::new(window), &verifier).unwrap();
        asm.submit(&mut l, &fresh, Timestamp::new(window), &verifier).unwrap();
        verifier.fail.store(true, Ordering::SeqCst);
        asm.close(&mut l, Timestamp::new(window), &verifier);
        verifier.fail.store(false, Ordering::SeqCst);

        let outcome = asm.rebatch_pending(&mut l, Timestamp::new(window + 1), &verifier);
        assert_eq!(outcome.included, 1);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].id, old.id);
        assert_eq!(outcome.dropped[0].status, TxStatus::Reversed);
        assert!(asm.pool().is_empty());
        assert!(l.contains_transaction(&fresh.id));
    }
}
