//! The Strata node: one validator's ledger, consensus engine and settlement
//! adapters behind a single lock.
//!
//! Every state-changing call takes the core lock, does its work, persists
//! any finalized blocks and queues its events, then releases the lock
//! before audit records are appended and listeners run.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use strata_channels::{ChannelConfig, ChannelManager, CloseOutcome, SignedState, StateChannel};
use strata_consensus::{Block, ChainEngine, ConsensusError, EngineEvent, ReplayMode, SubBlock};
use strata_crypto::SignatureVerifier;
use strata_ledger::{
    Escrow, EscrowResolution, LedgerConfig, LedgerError, LedgerSnapshot, LedgerState,
};
use strata_plasma::{
    ChallengeEvidence, ChildChainAdapter, ChildChainBatch, Exit, PlasmaConfig, RootChain,
    SubmitOutcome,
};
use strata_store::{AuditKind, AuditRecord, AuditSink, ChainStore};
use strata_transactions::Transaction;
use strata_types::{
    AccountId, Amount, BatchId, BlockHash, ChainParams, ChannelId, Clock, EscrowId, ExitId,
    SubBlockId, Timestamp, TxHash, TxStatus, ValidatorId,
};
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::ledger_event::{EventBus, LedgerEvent, Listener};
use crate::metrics::NodeMetrics;
use crate::persistence::BlockLog;
use crate::tracing_spans::{
    block_finalize_span, block_import_span, recovery_span, settlement_span, sub_block_close_span,
    tick_span, tx_submit_span,
};

/// Events kept per listener while it refuses delivery.
const EVENT_BACKLOG: usize = 10_000;

/// The collaborators a node is built from.
pub struct NodeServices {
    pub store: Arc<dyn ChainStore>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
    pub root_chain: Arc<dyn RootChain>,
    pub verifier: Arc<dyn SignatureVerifier>,
}

/// What one call to [`StrataNode::tick`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub blocks_finalized: usize,
    pub batches_submitted: usize,
    pub exits_finalized: usize,
    pub channels_settled: usize,
    pub transactions_evicted: usize,
}

struct Core {
    ledger: LedgerState,
    engine: ChainEngine,
    plasma: ChildChainAdapter,
    channels: ChannelManager,
}

/// Side effects gathered under the core lock.
#[derive(Default)]
struct Effects {
    events: Vec<LedgerEvent>,
    audit: Vec<AuditRecord>,
    /// Value moved; persist a snapshot before releasing the lock.
    checkpoint: bool,
    blocks: usize,
    persist_error: Option<NodeError>,
}

impl Effects {
    fn audit(&mut self, now: Timestamp, kind: AuditKind, subject: impl Into<String>, detail: impl Into<String>) {
        self.audit.push(AuditRecord::new(now, kind, subject, detail));
    }
}

pub struct StrataNode {
    config: NodeConfig,
    params: ChainParams,
    core: Mutex<Core>,
    log: BlockLog,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn SignatureVerifier>,
    /// Events queued in commit order, waiting for the bus.
    outbox: Mutex<Vec<LedgerEvent>>,
    events: Mutex<EventBus>,
    metrics: NodeMetrics,
}

impl StrataNode {
    /// Open a node over `services.store`, writing genesis into an empty
    /// store or recovering the chain and balances from a populated one.
    ///
    /// Refuses to start if the persisted block log fails verification.
    pub fn open(config: NodeConfig, services: NodeServices) -> Result<Self, NodeError> {
        let params = config.chain_params();
        let genesis_config = config.genesis()?;
        let genesis = Block::genesis(&genesis_config);
        let log = BlockLog::new(services.store.clone());
        log.init_genesis(&genesis)?;

        let mut ledger =
            LedgerState::from_genesis(&genesis_config, LedgerConfig::from(&params), genesis.hash)?;
        let mut engine = ChainEngine::new(
            config.validator(),
            params.clone(),
            genesis.clone(),
            services.verifier.clone(),
        );
        let recovered = recover(&log, &genesis, &mut ledger, &mut engine)?;

        let metrics = NodeMetrics::new()?;
        metrics.chain_height.set(engine.height() as i64);

        info!(
            network = config.network.as_str(),
            validator = %config.validator_id,
            height = engine.height(),
            recovered,
            accounts = ledger.account_count(),
            "node opened"
        );

        Ok(Self {
            core: Mutex::new(Core {
                ledger,
                engine,
                plasma: ChildChainAdapter::new(PlasmaConfig::from(&params), services.root_chain),
                channels: ChannelManager::new(ChannelConfig::from(&params)),
            }),
            config,
            params,
            log,
            audit: services.audit,
            clock: services.clock,
            verifier: services.verifier,
            outbox: Mutex::new(Vec::new()),
            events: Mutex::new(EventBus::new(EVENT_BACKLOG)),
            metrics,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn get_block(&self, index: u64) -> Result<Option<Block>, NodeError> {
        Ok(self.lock()?.engine.chain().get_by_index(index).cloned())
    }

    pub fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>, NodeError> {
        Ok(self.lock()?.engine.chain().get_by_hash(hash).cloned())
    }

    /// A sub-block that is open, accumulated or finalized.
    pub fn get_sub_block(&self, id: SubBlockId) -> Result<Option<SubBlock>, NodeError> {
        Ok(self.lock()?.engine.get_sub_block(&id).cloned())
    }

    /// A transaction in the duplicate cache or waiting in the pending pool.
    pub fn get_transaction(&self, id: &TxHash) -> Result<Option<Transaction>, NodeError> {
        let core = self.lock()?;
        Ok(core
            .ledger
            .get_transaction(id)
            .or_else(|| core.engine.assembler().pool().iter().find(|tx| tx.id == *id))
            .cloned())
    }

    pub fn get_balance(&self, account: &AccountId) -> Result<Amount, NodeError> {
        Ok(self.lock()?.ledger.get_balance(account)?)
    }

    pub fn get_available_balance(&self, account: &AccountId) -> Result<Amount, NodeError> {
        Ok(self.lock()?.ledger.get_available_balance(account)?)
    }

    pub fn get_chain_height(&self) -> Result<u64, NodeError> {
        Ok(self.lock()?.engine.height())
    }

    /// Sub-blocks accumulated towards the next block.
    pub fn sub_block_count(&self) -> Result<usize, NodeError> {
        Ok(self.lock()?.engine.finalizer().pending().len())
    }

    pub fn pending_pool_size(&self) -> Result<usize, NodeError> {
        Ok(self.lock()?.engine.assembler().pool().len())
    }

    pub fn is_halted(&self) -> Result<bool, NodeError> {
        Ok(self.lock()?.engine.is_halted())
    }

    pub fn get_escrow(&self, id: EscrowId) -> Result<Option<Escrow>, NodeError> {
        Ok(self.lock()?.ledger.get_escrow(id).cloned())
    }

    pub fn get_channel(&self, id: ChannelId) -> Result<Option<StateChannel>, NodeError> {
        Ok(self.lock()?.channels.get_channel(id).cloned())
    }

    pub fn get_batch(&self, id: BatchId) -> Result<Option<ChildChainBatch>, NodeError> {
        Ok(self.lock()?.plasma.get_batch(id).cloned())
    }

    pub fn get_exit(&self, id: ExitId) -> Result<Option<Exit>, NodeError> {
        Ok(self.lock()?.plasma.get_exit(id).cloned())
    }

    /// A verified snapshot of the ledger as it stands now.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, NodeError> {
        let now = self.clock.now();
        Ok(self.lock()?.ledger.snapshot(now))
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Register a listener. It receives every event committed from now on,
    /// at least once.
    ///
    /// Listeners run on the thread that flushes the bus. A listener may call
    /// back into the node; the events that call produces are delivered by
    /// the flush already in progress.
    pub fn subscribe(&self, listener: Listener) -> Result<(), NodeError> {
        self.events
            .lock()
            .map_err(|_| NodeError::LockPoisoned)?
            .subscribe(listener);
        Ok(())
    }

    /// Deliver queued events and retry any a listener refused earlier.
    /// Returns how many deliveries succeeded.
    ///
    /// Callers that find the bus busy return at once. Events are always
    /// pushed to the outbox before the bus is tried, and the holder looks at
    /// the outbox again after letting go, so nothing waits for a later flush.
    pub fn flush_events(&self) -> Result<usize, NodeError> {
        let mut delivered = 0;
        loop {
            let mut bus = match self.events.try_lock() {
                Ok(bus) => bus,
                Err(TryLockError::WouldBlock) => return Ok(delivered),
                Err(TryLockError::Poisoned(_)) => return Err(NodeError::LockPoisoned),
            };
            loop {
                let batch = std::mem::take(
                    &mut *self.outbox.lock().map_err(|_| NodeError::LockPoisoned)?,
                );
                if batch.is_empty() {
                    delivered += bus.flush();
                    break;
                }
                let before = bus.backlog();
                let offered = batch.len() * bus.listener_count();
                bus.publish(batch);
                delivered += (before + offered).saturating_sub(bus.backlog());
            }
            drop(bus);
            if self.outbox.lock().map_err(|_| NodeError::LockPoisoned)?.is_empty() {
                return Ok(delivered);
            }
        }
    }

    // ── Transactions and blocks ─────────────────────────────────────────

    /// Accept a signed transaction into the open sub-block.
    ///
    /// Returns the transaction's status once the call completes: `Included`,
    /// or `Finalized` if it completed a block.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<TxStatus, NodeError> {
        let _span = tx_submit_span(&tx.id.to_string()).entered();
        self.with_core(|core, now, fx| {
            let Core { ledger, engine, .. } = &mut *core;
            match engine.submit_transaction(ledger, &tx, now) {
                Ok(events) => {
                    self.metrics.transactions_accepted.inc();
                    debug!(tx = %tx.id, "transaction accepted");
                    self.absorb(core, events, now, fx);
                    Ok(core
                        .ledger
                        .get_transaction(&tx.id)
                        .map(|t| t.status)
                        .unwrap_or(TxStatus::Pending))
                }
                Err(e) => {
                    self.metrics.transactions_rejected.inc();
                    let kind = if is_duplicate(&e) {
                        AuditKind::DuplicateTransaction
                    } else {
                        AuditKind::TransactionRejected
                    };
                    warn!(tx = %tx.id, error = %e, "transaction rejected");
                    fx.audit(now, kind, tx.id.to_string(), e.to_string());
                    Err(e.into())
                }
            }
        })
    }

    /// Import a block finalized by another validator.
    pub fn import_block(&self, block: Block) -> Result<(), NodeError> {
        let _span = block_import_span(block.index, &block.hash.to_string()).entered();
        self.with_core(|core, now, fx| {
            let (index, hash) = (block.index, block.hash);
            let Core { ledger, engine, .. } = &mut *core;
            match engine.import_block(ledger, block, now) {
                Ok(events) => {
                    self.absorb(core, events, now, fx);
                    Ok(())
                }
                Err(e) => {
                    self.metrics.blocks_rejected.inc();
                    fx.audit(now, AuditKind::BlockRejected, hash.to_string(), e.to_string());
                    fx.events.push(LedgerEvent::BlockRejected {
                        index,
                        hash,
                        reason: e.to_string(),
                    });
                    Err(e.into())
                }
            }
        })
    }

    /// Periodic work: aged sub-block close, partial seal, pending pool
    /// re-batching, root-chain retries, exit and channel expiry, and
    /// duplicate cache compaction.
    pub fn tick(&self) -> Result<TickReport, NodeError> {
        let now = self.clock.now();
        let _span = tick_span(now.as_secs()).entered();
        self.with_core(|core, now, fx| {
            let mut report = TickReport::default();
            let Core { ledger, engine, .. } = &mut *core;
            let events = engine.tick(ledger, now);
            self.absorb(core, events, now, fx);
            report.blocks_finalized = fx.blocks;

            let retry = core.plasma.retry_submissions(now);
            for id in &retry.submitted {
                fx.events.push(LedgerEvent::BatchSubmitted { batch: *id });
            }
            for id in &retry.abandoned {
                self.metrics.root_submissions_failed.inc();
                warn!(batch = %id, "root-chain submission abandoned");
                fx.audit(now, AuditKind::RootSubmissionFailed, id.to_string(), "retries exhausted");
            }
            if !retry.still_queued.is_empty() {
                self.metrics
                    .root_submissions_failed
                    .inc_by(retry.still_queued.len() as u64);
            }
            report.batches_submitted = retry.submitted.len();

            let exits = core.plasma.process_expired_exits(&mut core.ledger, now);
            for exit in &exits {
                fx.audit(
                    now,
                    AuditKind::ExitFinalized,
                    exit.id.to_string(),
                    format!("{} withdrew {}", exit.participant, exit.amount),
                );
                fx.events.push(LedgerEvent::ExitFinalized { exit: exit.id });
            }
            report.exits_finalized = exits.len();

            let settled = core.channels.process_expired_channels(&mut core.ledger, now);
            for settlement in &settled {
                fx.audit(
                    now,
                    AuditKind::ChannelSettled,
                    settlement.channel.to_string(),
                    format!("version {} settled after dispute window", settlement.version),
                );
                fx.events.push(LedgerEvent::ChannelSettled {
                    channel: settlement.channel,
                });
            }
            report.channels_settled = settled.len();
            fx.checkpoint |= !exits.is_empty() || !settled.is_empty();

            let compaction = core.ledger.compact_tx_cache(now);
            if compaction.evicted > 0 {
                debug!(
                    evicted = compaction.evicted,
                    remaining = compaction.remaining,
                    "duplicate cache compacted"
                );
            }
            report.transactions_evicted = compaction.evicted;
            Ok(report)
        })
    }

    /// Close the open sub-block and finalize whatever has accumulated as a
    /// partial block. Only allowed under a time-boxed partial seal policy.
    pub fn seal_partial(&self) -> Result<(), NodeError> {
        self.with_core(|core, now, fx| {
            let Core { ledger, engine, .. } = &mut *core;
            let events = engine.seal_partial(ledger, now)?;
            self.absorb(core, events, now, fx);
            Ok(())
        })
    }

    /// Resume block production after a consistency fault.
    pub fn clear_halt(&self) -> Result<(), NodeError> {
        self.with_core(|core, now, fx| {
            warn!("operator cleared chain halt");
            let Core { ledger, engine, .. } = &mut *core;
            let events = engine.clear_halt(ledger, now);
            self.absorb(core, events, now, fx);
            Ok(())
        })
    }

    /// Seal the accumulator if the policy allows partial blocks, persist a
    /// final snapshot and deliver outstanding events.
    pub fn shutdown(&self) -> Result<(), NodeError> {
        let result = self.with_core(|core, now, fx| {
            if self.params.seal_policy.allows_partial() {
                let Core { ledger, engine, .. } = &mut *core;
                match engine.seal_partial(ledger, now) {
                    Ok(events) => self.absorb(core, events, now, fx),
                    Err(e) => warn!(error = %e, "could not seal partial block on shutdown"),
                }
            }
            let in_flight = core.engine.in_flight().len();
            if in_flight > 0 {
                warn!(in_flight, "transactions not yet in a block are not persisted");
            }
            fx.checkpoint = true;
            Ok(())
        });
        info!("node shut down");
        result
    }

    // ── Escrow ──────────────────────────────────────────────────────────

    pub fn open_escrow(
        &self,
        buyer: &AccountId,
        seller: &AccountId,
        resource: impl Into<String>,
        amount: Amount,
    ) -> Result<EscrowId, NodeError> {
        let _span = settlement_span("escrow_open", buyer.as_str()).entered();
        self.with_core(|core, now, _| {
            Ok(core.ledger.open_escrow(buyer, seller, resource, amount, now)?)
        })
    }

    pub fn release_escrow(&self, id: EscrowId) -> Result<(), NodeError> {
        let _span = settlement_span("escrow_release", &id.to_string()).entered();
        self.with_core(|core, now, fx| {
            core.ledger.release_escrow(id)?;
            fx.audit(now, AuditKind::EscrowSettled, id.to_string(), "released to seller");
            fx.checkpoint = true;
            Ok(())
        })
    }

    pub fn dispute_escrow(&self, id: EscrowId) -> Result<(), NodeError> {
        let _span = settlement_span("escrow_dispute", &id.to_string()).entered();
        self.with_core(|core, _, _| Ok(core.ledger.dispute_escrow(id)?))
    }

    /// Settle a disputed escrow by external decision.
    pub fn resolve_escrow(&self, id: EscrowId, resolution: EscrowResolution) -> Result<(), NodeError> {
        let _span = settlement_span("escrow_resolve", &id.to_string()).entered();
        self.with_core(|core, now, fx| {
            core.ledger.resolve_dispute(id, resolution)?;
            fx.audit(now, AuditKind::EscrowSettled, id.to_string(), format!("{resolution:?}"));
            fx.checkpoint = true;
            Ok(())
        })
    }

    // ── State channels ──────────────────────────────────────────────────

    pub fn open_channel(&self, collateral: Vec<(AccountId, Amount)>) -> Result<ChannelId, NodeError> {
        let _span = settlement_span("channel_open", "new").entered();
        self.with_core(|core, now, _| {
            Ok(core.channels.open_channel(&mut core.ledger, collateral, now)?)
        })
    }

    /// Record a co-signed off-chain state. Returns the channel's version.
    pub fn update_channel(&self, id: ChannelId, signed: &SignedState) -> Result<u64, NodeError> {
        self.with_core(|core, _, _| {
            Ok(core
                .channels
                .update(&core.ledger, id, signed, &*self.verifier)?)
        })
    }

    pub fn close_channel(&self, id: ChannelId, final_state: &SignedState) -> Result<CloseOutcome, NodeError> {
        let _span = settlement_span("channel_close", &id.to_string()).entered();
        self.with_core(|core, now, fx| {
            let outcome = core.channels.close_channel(
                &mut core.ledger,
                id,
                final_state,
                now,
                &*self.verifier,
            )?;
            if let CloseOutcome::Settled(settlement) = &outcome {
                fx.audit(
                    now,
                    AuditKind::ChannelSettled,
                    id.to_string(),
                    format!("version {} settled cooperatively", settlement.version),
                );
                fx.events.push(LedgerEvent::ChannelSettled { channel: id });
                fx.checkpoint = true;
            }
            Ok(outcome)
        })
    }

    pub fn dispute_channel(&self, id: ChannelId, counter: &SignedState) -> Result<(), NodeError> {
        let _span = settlement_span("channel_dispute", &id.to_string()).entered();
        self.with_core(|core, now, _| {
            Ok(core
                .channels
                .dispute(&core.ledger, id, counter, now, &*self.verifier)?)
        })
    }

    // ── Child chain ─────────────────────────────────────────────────────

    /// Build a batch from every finalized sub-block not yet batched.
    pub fn seal_child_chain_batch(&self) -> Result<Option<BatchId>, NodeError> {
        self.with_core(|core, now, fx| {
            let Some(id) = core.plasma.seal_pending(now)? else {
                return Ok(None);
            };
            if self.config.auto_submit_batches {
                self.submit_batch(core, id, now, fx)?;
            }
            Ok(Some(id))
        })
    }

    pub fn submit_child_chain_batch(&self, id: BatchId) -> Result<SubmitOutcome, NodeError> {
        let _span = settlement_span("batch_submit", &id.to_string()).entered();
        self.with_core(|core, now, fx| self.submit_batch(core, id, now, fx))
    }

    /// Record the root chain's receipt for a batch; its blocks become
    /// confirmed.
    pub fn acknowledge_batch(&self, id: BatchId) -> Result<(), NodeError> {
        self.with_core(|core, _, _| {
            for index in core.plasma.acknowledge(id)? {
                core.engine.mark_confirmed(index);
            }
            Ok(())
        })
    }

    pub fn initiate_exit(
        &self,
        batch: BatchId,
        participant: &AccountId,
        amount: Amount,
    ) -> Result<ExitId, NodeError> {
        let _span = settlement_span("exit_initiate", participant.as_str()).entered();
        self.with_core(|core, now, _| {
            Ok(core
                .plasma
                .initiate_exit(&mut core.ledger, batch, participant, amount, now)?)
        })
    }

    pub fn challenge_exit(
        &self,
        exit: ExitId,
        evidence: &ChallengeEvidence,
        challenger: &AccountId,
    ) -> Result<(), NodeError> {
        let _span = settlement_span("exit_challenge", &exit.to_string()).entered();
        self.with_core(|core, now, fx| {
            core.plasma.challenge_exit(
                &mut core.ledger,
                exit,
                evidence,
                challenger,
                now,
                &*self.verifier,
            )?;
            fx.audit(
                now,
                AuditKind::ExitChallenged,
                exit.to_string(),
                format!("challenged by {challenger}"),
            );
            fx.audit(now, AuditKind::Reward, challenger.to_string(), format!("challenged {exit}"));
            Ok(())
        })
    }

    // ── Fees, stakes and audit ledgers ──────────────────────────────────

    pub fn distribute_fees(&self, tx: &TxHash, shares: &[(AccountId, Amount)]) -> Result<(), NodeError> {
        self.with_core(|core, _, fx| {
            core.ledger.distribute_fees(tx, shares)?;
            fx.checkpoint = true;
            Ok(())
        })
    }

    pub fn record_stake_change(&self, validator: &ValidatorId, delta: i128) -> Result<Amount, NodeError> {
        self.with_core(|core, _, _| Ok(core.ledger.record_stake_change(validator, delta)?))
    }

    pub fn record_reward(&self, account: AccountId, amount: Amount, reason: &str) -> Result<(), NodeError> {
        self.with_core(|core, now, fx| {
            fx.audit(now, AuditKind::Reward, account.to_string(), format!("{amount}: {reason}"));
            core.ledger.record_reward(account, amount, reason, now);
            Ok(())
        })
    }

    pub fn record_punishment(
        &self,
        validator: ValidatorId,
        amount: Amount,
        reason: &str,
    ) -> Result<(), NodeError> {
        self.with_core(|core, now, fx| {
            fx.audit(now, AuditKind::Punishment, validator.to_string(), format!("{amount}: {reason}"));
            core.ledger.record_punishment(validator, amount, reason, now);
            Ok(())
        })
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn lock(&self) -> Result<MutexGuard<'_, Core>, NodeError> {
        self.core.lock().map_err(|_| NodeError::LockPoisoned)
    }

    /// Run `f` under the core lock, then deliver what it produced.
    fn with_core<T>(
        &self,
        f: impl FnOnce(&mut Core, Timestamp, &mut Effects) -> Result<T, NodeError>,
    ) -> Result<T, NodeError> {
        let now = self.clock.now();
        let mut fx = Effects::default();
        let result = {
            let mut core = self.lock()?;
            let result = f(&mut core, now, &mut fx);
            if fx.checkpoint {
                self.checkpoint(&core, now);
            }
            self.update_gauges(&core);
            let events = std::mem::take(&mut fx.events);
            self.outbox
                .lock()
                .map_err(|_| NodeError::LockPoisoned)?
                .extend(events);
            result
        };

        for record in &fx.audit {
            if let Err(e) = self.audit.append(record) {
                warn!(kind = ?record.kind, subject = %record.subject, error = %e, "audit sink failed");
            }
        }
        self.flush_events()?;

        let value = result?;
        match fx.persist_error {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }

    /// Translate engine events into node events, persisting blocks.
    fn absorb(&self, core: &mut Core, events: Vec<EngineEvent>, now: Timestamp, fx: &mut Effects) {
        for event in events {
            match event {
                EngineEvent::SubBlockClosed(sb) => {
                    let _span = sub_block_close_span(&sb.id.to_string(), sb.sequence_index).entered();
                    debug!(transactions = sb.len(), hash = %sb.hash, "sub-block closed");
                    self.metrics.sub_blocks_closed.inc();
                    fx.events.push(LedgerEvent::SubBlockClosed {
                        id: sb.id,
                        hash: sb.hash,
                        sequence_index: sb.sequence_index,
                        transactions: sb.len(),
                    });
                }
                EngineEvent::SubBlockRejected { id, reason, returned } => {
                    self.metrics.sub_blocks_rejected.inc();
                    fx.audit(
                        now,
                        AuditKind::SubBlockRejected,
                        id.to_string(),
                        format!("{reason}; {} transactions pooled", returned.len()),
                    );
                    fx.events.push(LedgerEvent::SubBlockRejected {
                        id,
                        reason: reason.to_string(),
                    });
                }
                EngineEvent::BlockFinalized(block) => {
                    self.on_block(core, block, now, fx, false);
                }
                EngineEvent::BlockImported(block) => {
                    self.on_block(core, block, now, fx, true);
                }
                EngineEvent::BlockAborted {
                    offending,
                    discarded,
                    returned,
                    reason,
                } => {
                    self.metrics.blocks_rejected.inc();
                    fx.audit(
                        now,
                        AuditKind::BlockRejected,
                        offending.to_string(),
                        format!(
                            "{reason}; {} sub-blocks discarded, {} transactions pooled",
                            discarded.len(),
                            returned.len()
                        ),
                    );
                    fx.events.push(LedgerEvent::BlockAborted {
                        offending,
                        discarded,
                        reason: reason.to_string(),
                    });
                }
                EngineEvent::BlockRejected { hash, index, reason } => {
                    self.metrics.blocks_rejected.inc();
                    fx.audit(now, AuditKind::BlockRejected, hash.to_string(), reason.to_string());
                    fx.events.push(LedgerEvent::BlockRejected {
                        index,
                        hash,
                        reason: reason.to_string(),
                    });
                }
                EngineEvent::ConsistencyFault { reason } => {
                    error!(%reason, "block production halted");
                    fx.audit(now, AuditKind::ConsistencyFault, "chain", reason.to_string());
                    fx.events.push(LedgerEvent::ConsistencyFault {
                        reason: reason.to_string(),
                    });
                }
                EngineEvent::TransactionsDropped(txs) => {
                    for tx in &txs {
                        fx.audit(now, AuditKind::TransactionRejected, tx.id.to_string(), "stale in pending pool");
                    }
                    fx.events.push(LedgerEvent::TransactionsDropped {
                        ids: txs.iter().map(|tx| tx.id).collect(),
                    });
                }
            }
        }
    }

    fn on_block(&self, core: &mut Core, block: Block, now: Timestamp, fx: &mut Effects, imported: bool) {
        let _span = block_finalize_span(block.index).entered();
        if let Err(e) = self.log.append(&block) {
            error!(index = block.index, error = %e, "failed to persist finalized block");
            fx.persist_error.get_or_insert(e);
        }
        fx.checkpoint = true;
        fx.blocks += 1;

        self.metrics.blocks_finalized.inc();
        if let Some(first) = block.sub_blocks.first() {
            let latency = first.created_at.elapsed_since(block.timestamp);
            self.metrics
                .block_finalization_latency_secs
                .observe(latency as f64);
        }
        fx.audit(
            now,
            AuditKind::BlockFinalized,
            block.hash.to_string(),
            format!(
                "index {} with {} sub-blocks and {} transactions",
                block.index,
                block.sub_blocks.len(),
                block.tx_count()
            ),
        );
        fx.events.push(if imported {
            LedgerEvent::BlockImported {
                index: block.index,
                hash: block.hash,
            }
        } else {
            LedgerEvent::BlockFinalized {
                index: block.index,
                hash: block.hash,
                sub_blocks: block.sub_blocks.len(),
                transactions: block.tx_count(),
            }
        });

        for id in core.plasma.record_block(&block, now) {
            if !self.config.auto_submit_batches {
                continue;
            }
            if let Err(e) = self.submit_batch(core, id, now, fx) {
                warn!(batch = %id, error = %e, "automatic batch submission failed");
            }
        }
    }

    fn submit_batch(
        &self,
        core: &mut Core,
        id: BatchId,
        now: Timestamp,
        fx: &mut Effects,
    ) -> Result<SubmitOutcome, NodeError> {
        let outcome = core.plasma.submit_child_chain_batch(id, now)?;
        match &outcome {
            SubmitOutcome::Submitted(_) => fx.events.push(LedgerEvent::BatchSubmitted { batch: id }),
            SubmitOutcome::Queued { attempts } => {
                self.metrics.root_submissions_failed.inc();
                fx.audit(
                    now,
                    AuditKind::RootSubmissionFailed,
                    id.to_string(),
                    format!("attempt {attempts} failed, queued for retry"),
                );
            }
        }
        Ok(outcome)
    }

    /// Persist a snapshot of the ledger without the transactions still in
    /// flight. Failure is logged; the next checkpoint tries again.
    fn checkpoint(&self, core: &Core, now: Timestamp) {
        let snapshot = match core.ledger.snapshot_excluding(&core.engine.in_flight(), now) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "could not build ledger snapshot");
                return;
            }
        };
        match self.log.put_snapshot(&snapshot) {
            Ok(()) => debug!(height = snapshot.block_height, "ledger snapshot persisted"),
            Err(e) => warn!(height = snapshot.block_height, error = %e, "failed to persist snapshot"),
        }
    }

    fn update_gauges(&self, core: &Core) {
        self.metrics.chain_height.set(core.engine.height() as i64);
        self.metrics
            .pending_pool_size
            .set(core.engine.assembler().pool().len() as i64);
        self.metrics
            .accumulator_size
            .set(core.engine.finalizer().pending().len() as i64);
    }
}

fn is_duplicate(e: &ConsensusError) -> bool {
    matches!(
        e,
        ConsensusError::DuplicateTransaction(_)
            | ConsensusError::Ledger(LedgerError::DuplicateTransaction(_))
    )
}

/// Rebuild consensus and ledger state from the block log.
///
/// Blocks up to the latest snapshot only refill the duplicate cache; the
/// snapshot then supplies balances, and later blocks are applied in full.
fn recover(
    log: &BlockLog,
    genesis: &Block,
    ledger: &mut LedgerState,
    engine: &mut ChainEngine,
) -> Result<u64, NodeError> {
    let blocks = log.load_verified(genesis)?;
    let tip = blocks.len() as u64;
    let _span = recovery_span(tip).entered();

    let snapshot = log.latest_snapshot()?;
    let base = match &snapshot {
        Some(s) if s.block_height > tip => {
            return Err(NodeError::ChainIntegrity(format!(
                "snapshot at height {} is ahead of the block log at {tip}",
                s.block_height
            )))
        }
        Some(s) => s.block_height,
        None => 0,
    };

    if let Some(s) = snapshot.as_ref().filter(|s| s.block_height == 0) {
        reconcile(ledger, s)?;
    }
    for block in blocks {
        let index = block.index;
        let mode = if index <= base {
            ReplayMode::CacheOnly
        } else {
            ReplayMode::Apply
        };
        engine
            .replay_block(ledger, block, mode)
            .map_err(|e| NodeError::ChainIntegrity(format!("replaying block {index}: {e}")))?;
        if index == base {
            if let Some(s) = &snapshot {
                reconcile(ledger, s)?;
            }
        }
    }
    if tip > 0 {
        info!(blocks = tip, snapshot_height = base, "chain recovered from block log");
    }
    Ok(tip)
}

fn reconcile(ledger: &mut LedgerState, snapshot: &LedgerSnapshot) -> Result<(), NodeError> {
    let changed = ledger
        .reconcile_with(snapshot)
        .map_err(|e| NodeError::ChainIntegrity(e.to_string()))?;
    info!(height = snapshot.block_height, changed, "balances restored from snapshot");
    Ok(())
}
