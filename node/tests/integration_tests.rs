//! Integration tests exercising the full node pipeline:
//! submission → sub-block close → block finalization → persistence →
//! settlement layers → restart.
//!
//! Collaborators come from `strata-nullables`, so time, storage, audit and
//! the root chain are all deterministic and inspectable.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use strata_channels::{ChannelState, ChannelStatus, CloseOutcome, SignedState};
use strata_consensus::{Block, ConsensusError};
use strata_crypto::{keypair_from_seed, Ed25519Verifier};
use strata_ledger::EscrowStatus;
use strata_node::{
    GenesisAccountConfig, LedgerEvent, ListenerError, NodeConfig, NodeError, NodeServices,
    StrataNode,
};
use strata_nullables::{NullAuditSink, NullClock, NullRootChain, NullStore};
use strata_plasma::{BatchStatus, ChallengeEvidence, ExitStatus};
use strata_store::{AuditKind, BlockStore};
use strata_transactions::Transaction;
use strata_types::{
    AccountId, Amount, BatchId, BlockSealPolicy, BlockStatus, ChainParams, ChannelId, KeyPair,
    NetworkId, Timestamp, TxStatus,
};

const NOW: u64 = 1_000;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    node: StrataNode,
    store: Arc<NullStore>,
    audit: Arc<NullAuditSink>,
    clock: Arc<NullClock>,
    root: Arc<NullRootChain>,
}

fn key(seed: u8) -> KeyPair {
    keypair_from_seed(&[seed; 32])
}

fn id(name: &str) -> AccountId {
    AccountId::new(name)
}

fn seed_of(name: &str) -> u8 {
    match name {
        "alice" => 1,
        "bob" => 2,
        "carol" => 3,
        "whale" => 4,
        other => panic!("no key for {other}"),
    }
}

fn genesis_account(name: &str, balance: u64) -> GenesisAccountConfig {
    GenesisAccountConfig {
        id: name.to_string(),
        public_key: hex::encode(key(seed_of(name)).public.as_bytes()),
        balance,
    }
}

/// One transaction per sub-block, two sub-blocks per block.
fn small_params() -> ChainParams {
    ChainParams {
        max_sub_block_txs: 1,
        sub_blocks_per_block: 2,
        plasma_batch_size: 2,
        seal_policy: BlockSealPolicy::Strict,
        exit_challenge_window_secs: 60,
        channel_dispute_window_secs: 30,
        ..ChainParams::live_defaults()
    }
}

fn config(params: ChainParams) -> NodeConfig {
    NodeConfig {
        params: Some(params),
        genesis_accounts: vec![
            genesis_account("alice", 100),
            genesis_account("bob", 50),
            genesis_account("carol", 0),
            genesis_account("whale", 1_000_000),
        ],
        ..NodeConfig::default()
    }
}

fn open_with(config: NodeConfig, store: Arc<NullStore>) -> Result<Harness, NodeError> {
    let audit = Arc::new(NullAuditSink::new());
    let clock = Arc::new(NullClock::new(NOW));
    let root = Arc::new(NullRootChain::new());
    let node = StrataNode::open(
        config,
        NodeServices {
            store: store.clone(),
            audit: audit.clone(),
            clock: clock.clone(),
            root_chain: root.clone(),
            verifier: Arc::new(Ed25519Verifier),
        },
    )?;
    Ok(Harness {
        node,
        store,
        audit,
        clock,
        root,
    })
}

fn harness(params: ChainParams) -> Harness {
    open_with(config(params), Arc::new(NullStore::new())).expect("node opens")
}

fn transfer(from: &str, to: &str, amount: u128, fee: u128) -> Transaction {
    Transaction::create(
        id(from),
        id(to),
        Amount::new(amount),
        Amount::new(fee),
        Timestamp::new(NOW),
        &key(seed_of(from)).private,
    )
}

fn balance(h: &Harness, name: &str) -> u128 {
    h.node.get_balance(&id(name)).unwrap().raw()
}

fn total_value(h: &Harness) -> u128 {
    let snapshot = h.node.snapshot().unwrap();
    let accounts: u128 = snapshot.accounts.iter().map(|a| a.balance.raw()).sum();
    let held: u128 = snapshot.held_fees.iter().map(|(_, fee)| fee.raw()).sum();
    accounts + held + snapshot.fee_pool.raw() + snapshot.withdrawn.raw()
}

fn signed_split(channel: ChannelId, version: u64, alice: u128, bob: u128) -> SignedState {
    let mut balances = BTreeMap::new();
    balances.insert(id("alice"), Amount::new(alice));
    balances.insert(id("bob"), Amount::new(bob));
    SignedState::new(ChannelState::new(channel, version, balances))
        .sign(id("alice"), &key(1).private)
        .sign(id("bob"), &key(2).private)
}

fn is_duplicate(err: &NodeError) -> bool {
    matches!(
        err,
        NodeError::Consensus(ConsensusError::DuplicateTransaction(_))
            | NodeError::Consensus(ConsensusError::Ledger(
                strata_ledger::LedgerError::DuplicateTransaction(_)
            ))
    )
}

// ---------------------------------------------------------------------------
// A single transfer is applied immediately
// ---------------------------------------------------------------------------

#[test]
fn transfer_is_applied_and_included() {
    let h = harness(small_params());
    let tx = transfer("alice", "bob", 10, 1);

    let status = h.node.submit_transaction(tx.clone()).unwrap();

    assert_eq!(status, TxStatus::Included);
    assert_eq!(balance(&h, "alice"), 89);
    assert_eq!(balance(&h, "bob"), 60);
    assert_eq!(h.node.get_transaction(&tx.id).unwrap().unwrap().status, TxStatus::Included);
    assert_eq!(h.node.sub_block_count().unwrap(), 1);
    assert_eq!(h.node.metrics().transactions_accepted.get(), 1);
}

#[test]
fn rejected_transaction_changes_nothing_and_is_audited() {
    let h = harness(small_params());
    let err = h
        .node
        .submit_transaction(transfer("carol", "alice", 5, 0))
        .unwrap_err();
    assert!(matches!(err, NodeError::Consensus(_)));
    assert_eq!(balance(&h, "carol"), 0);
    assert_eq!(balance(&h, "alice"), 100);
    assert_eq!(h.audit.count(AuditKind::TransactionRejected), 1);
    assert_eq!(h.node.metrics().transactions_rejected.get(), 1);
}

// ---------------------------------------------------------------------------
// A full run of sub-blocks forms exactly one block
// ---------------------------------------------------------------------------

#[test]
fn thousand_sub_blocks_form_one_block() {
    let params = ChainParams {
        max_sub_block_txs: 1,
        sub_blocks_per_block: 1000,
        plasma_batch_size: 1000,
        seal_policy: BlockSealPolicy::Strict,
        ..ChainParams::live_defaults()
    };
    let h = harness(params);

    for amount in 1..=1000u128 {
        h.node.submit_transaction(transfer("whale", "carol", amount, 0)).unwrap();
        if amount < 1000 {
            assert_eq!(h.node.get_chain_height().unwrap(), 0);
        }
    }

    assert_eq!(h.node.get_chain_height().unwrap(), 1);
    assert_eq!(h.node.sub_block_count().unwrap(), 0);
    let block = h.node.get_block(1).unwrap().expect("block 1");
    assert_eq!(block.sub_blocks.len(), 1000);
    assert_eq!(block.prev_hash, h.node.get_block(0).unwrap().unwrap().hash);
    assert_eq!(balance(&h, "carol"), 500_500);

    // The finalized sub-blocks filled one batch, which went to the root chain.
    assert_eq!(h.root.submitted().len(), 1);
    assert_eq!(h.node.metrics().blocks_finalized.get(), 1);
}

#[test]
fn get_block_is_idempotent_and_chain_links() {
    let h = harness(small_params());
    for amount in 1..=6 {
        h.node.submit_transaction(transfer("alice", "bob", amount, 0)).unwrap();
    }
    assert_eq!(h.node.get_chain_height().unwrap(), 3);
    for index in 1..=3 {
        let first = h.node.get_block(index).unwrap().unwrap();
        let again = h.node.get_block(index).unwrap().unwrap();
        assert_eq!(first, again);
        let prev = h.node.get_block(index - 1).unwrap().unwrap();
        assert_eq!(first.prev_hash, prev.hash);
        assert_eq!(first.index, prev.index + 1);
        assert_eq!(h.node.get_block_by_hash(&first.hash).unwrap(), Some(first));
    }
    assert_eq!(h.store.block_count().unwrap(), 4);
}

// ---------------------------------------------------------------------------
// The same transaction raced from two threads
// ---------------------------------------------------------------------------

#[test]
fn concurrent_duplicate_is_accepted_once() {
    let h = harness(small_params());
    let tx = transfer("alice", "bob", 10, 1);

    let results: Vec<Result<TxStatus, NodeError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let tx = tx.clone();
                let node = &h.node;
                s.spawn(move || node.submit_transaction(tx))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).expect("one rejection");
    assert!(is_duplicate(&err), "unexpected error {err:?}");
    assert_eq!(balance(&h, "alice"), 89);
    assert_eq!(h.audit.count(AuditKind::DuplicateTransaction), 1);
}

#[test]
fn concurrent_transfers_conserve_value() {
    let h = harness(small_params());
    let before = total_value(&h);

    std::thread::scope(|s| {
        for worker in 0..4u128 {
            let node = &h.node;
            s.spawn(move || {
                for n in 0..25u128 {
                    let amount = 1 + worker * 100 + n;
                    node.submit_transaction(transfer("whale", "carol", amount, 1))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(h.node.get_chain_height().unwrap(), 50);
    assert_eq!(total_value(&h), before);
}

// ---------------------------------------------------------------------------
// A channel with three updates settles cooperatively
// ---------------------------------------------------------------------------

#[test]
fn channel_updates_then_cooperative_close() {
    let h = harness(small_params());
    let channel = h
        .node
        .open_channel(vec![(id("alice"), Amount::new(50)), (id("bob"), Amount::new(50))])
        .unwrap();
    assert_eq!(h.node.get_available_balance(&id("alice")).unwrap(), Amount::new(50));

    for (version, alice) in [(1, 60), (2, 40), (3, 65)] {
        let v = h
            .node
            .update_channel(channel, &signed_split(channel, version, alice, 100 - alice))
            .unwrap();
        assert_eq!(v, version);
    }
    // Updates never touch the ledger.
    assert_eq!(balance(&h, "alice"), 100);

    let mut balances = BTreeMap::new();
    balances.insert(id("alice"), Amount::new(70));
    balances.insert(id("bob"), Amount::new(30));
    let final_state = SignedState::new(ChannelState::new(channel, 4, balances).finalized())
        .sign(id("alice"), &key(1).private)
        .sign(id("bob"), &key(2).private);

    let outcome = h.node.close_channel(channel, &final_state).unwrap();

    assert!(matches!(outcome, CloseOutcome::Settled(_)));
    assert_eq!(balance(&h, "alice"), 120);
    assert_eq!(balance(&h, "bob"), 30);
    assert_eq!(h.node.get_available_balance(&id("bob")).unwrap(), Amount::new(30));
    assert_eq!(
        h.node.get_channel(channel).unwrap().unwrap().status,
        ChannelStatus::Closed
    );
    assert_eq!(h.audit.count(AuditKind::ChannelSettled), 1);
}

#[test]
fn unilateral_close_is_overridden_by_dispute_then_settles_on_tick() {
    let h = harness(small_params());
    let channel = h
        .node
        .open_channel(vec![(id("alice"), Amount::new(50)), (id("bob"), Amount::new(50))])
        .unwrap();
    h.node.update_channel(channel, &signed_split(channel, 1, 80, 20)).unwrap();

    // Alice closes alone on v1, hiding the v2 both of them signed.
    let mut stale = BTreeMap::new();
    stale.insert(id("alice"), Amount::new(80));
    stale.insert(id("bob"), Amount::new(20));
    let alone = SignedState::new(ChannelState::new(channel, 1, stale)).sign(id("alice"), &key(1).private);
    assert!(matches!(
        h.node.close_channel(channel, &alone).unwrap(),
        CloseOutcome::Pending { .. }
    ));

    h.node.dispute_channel(channel, &signed_split(channel, 2, 45, 55)).unwrap();
    assert_eq!(
        h.node.get_channel(channel).unwrap().unwrap().status,
        ChannelStatus::Disputed
    );

    h.clock.advance(30);
    let report = h.node.tick().unwrap();
    assert_eq!(report.channels_settled, 1);
    assert_eq!(balance(&h, "alice"), 95);
    assert_eq!(balance(&h, "bob"), 55);
}

// ---------------------------------------------------------------------------
// An exit is challenged with a later spend
// ---------------------------------------------------------------------------

/// One transaction per block, one sub-block per batch.
fn exit_params() -> ChainParams {
    ChainParams {
        sub_blocks_per_block: 1,
        plasma_batch_size: 1,
        ..small_params()
    }
}

#[test]
fn exit_challenged_with_later_spend_is_rejected() {
    let h = harness(exit_params());
    h.node.submit_transaction(transfer("alice", "bob", 10, 0)).unwrap();
    let first = BatchId::new(1);
    assert_eq!(
        h.node.get_batch(first).unwrap().unwrap().status,
        BatchStatus::SubmittedToRoot
    );

    let exit = h.node.initiate_exit(first, &id("bob"), Amount::new(10)).unwrap();
    assert_eq!(h.node.get_available_balance(&id("bob")).unwrap(), Amount::new(50));

    // Bob spends after the exit's batch.
    let spend = transfer("bob", "carol", 5, 0);
    h.node.submit_transaction(spend.clone()).unwrap();
    let later = h.node.get_batch(BatchId::new(2)).unwrap().unwrap();
    let sub_block = later.sub_blocks[0];
    let evidence = ChallengeEvidence {
        batch_id: later.id,
        sub_block,
        proof: later.prove(&sub_block).expect("committed"),
        transaction: spend,
    };

    h.clock.advance(10);
    h.node.challenge_exit(exit, &evidence, &id("carol")).unwrap();

    let exit = h.node.get_exit(exit).unwrap().unwrap();
    assert_eq!(exit.status, ExitStatus::Challenged);
    assert_eq!(exit.challenger, Some(id("carol")));
    assert_eq!(
        h.node.get_batch(first).unwrap().unwrap().status,
        BatchStatus::Challenged
    );
    assert_eq!(h.node.get_available_balance(&id("bob")).unwrap(), Amount::new(55));
    assert_eq!(h.audit.count(AuditKind::ExitChallenged), 1);
    assert_eq!(h.audit.count(AuditKind::Reward), 1);

    // A challenged exit never finalizes.
    h.clock.advance(120);
    assert_eq!(h.node.tick().unwrap().exits_finalized, 0);
    assert_eq!(balance(&h, "bob"), 55);
}

#[test]
fn unchallenged_exit_finalizes_after_window() {
    let h = harness(exit_params());
    h.node.submit_transaction(transfer("alice", "bob", 10, 0)).unwrap();
    let exit = h.node.initiate_exit(BatchId::new(1), &id("bob"), Amount::new(10)).unwrap();

    h.clock.advance(59);
    assert_eq!(h.node.tick().unwrap().exits_finalized, 0);
    h.clock.advance(1);
    assert_eq!(h.node.tick().unwrap().exits_finalized, 1);

    assert_eq!(h.node.get_exit(exit).unwrap().unwrap().status, ExitStatus::Finalized);
    assert_eq!(balance(&h, "bob"), 50);
    assert_eq!(
        h.node.get_batch(BatchId::new(1)).unwrap().unwrap().status,
        BatchStatus::Exited
    );
    assert_eq!(h.audit.count(AuditKind::ExitFinalized), 1);
}

#[test]
fn offline_root_chain_is_retried_on_tick() {
    let h = harness(exit_params());
    h.root.set_offline(true);
    h.node.submit_transaction(transfer("alice", "bob", 10, 0)).unwrap();
    assert_eq!(
        h.node.get_batch(BatchId::new(1)).unwrap().unwrap().status,
        BatchStatus::FinalizedLocally
    );
    assert_eq!(h.audit.count(AuditKind::RootSubmissionFailed), 1);

    h.root.set_offline(false);
    assert_eq!(h.node.tick().unwrap().batches_submitted, 1);
    assert_eq!(h.root.submitted().len(), 1);

    h.node.acknowledge_batch(BatchId::new(1)).unwrap();
    assert_eq!(
        h.node.get_block(1).unwrap().unwrap().status,
        BlockStatus::Confirmed
    );
}

// ---------------------------------------------------------------------------
// Escrow and fees
// ---------------------------------------------------------------------------

#[test]
fn escrow_release_and_fee_distribution() {
    let h = harness(small_params());
    let escrow = h
        .node
        .open_escrow(&id("alice"), &id("carol"), "order-17", Amount::new(30))
        .unwrap();
    assert_eq!(h.node.get_available_balance(&id("alice")).unwrap(), Amount::new(70));

    h.node.dispute_escrow(escrow).unwrap();
    h.node
        .resolve_escrow(escrow, strata_ledger::EscrowResolution::ReleaseToSeller)
        .unwrap();
    assert_eq!(h.node.get_escrow(escrow).unwrap().unwrap().status, EscrowStatus::Released);
    assert_eq!(balance(&h, "carol"), 30);
    assert_eq!(h.audit.count(AuditKind::EscrowSettled), 1);

    let paid = transfer("alice", "bob", 10, 4);
    h.node.submit_transaction(paid.clone()).unwrap();
    // Fees are only distributed once the transaction is final.
    assert!(h.node.distribute_fees(&paid.id, &[(id("carol"), Amount::new(4))]).is_err());
    h.node.submit_transaction(transfer("bob", "alice", 1, 0)).unwrap();
    h.node
        .distribute_fees(&paid.id, &[(id("carol"), Amount::new(3))])
        .unwrap();
    assert_eq!(balance(&h, "carol"), 33);
}

// ---------------------------------------------------------------------------
// Seal policy
// ---------------------------------------------------------------------------

#[test]
fn partial_seal_depends_on_policy() {
    let strict = harness(small_params());
    strict.node.submit_transaction(transfer("alice", "bob", 1, 0)).unwrap();
    assert!(matches!(
        strict.node.seal_partial(),
        Err(NodeError::Consensus(ConsensusError::PartialSealNotAllowed))
    ));

    let boxed = harness(ChainParams {
        seal_policy: BlockSealPolicy::TimeBoxedPartial { max_wait_secs: 5 },
        sub_blocks_per_block: 10,
        ..small_params()
    });
    boxed.node.submit_transaction(transfer("alice", "bob", 1, 0)).unwrap();
    boxed.node.seal_partial().unwrap();
    assert_eq!(boxed.node.get_chain_height().unwrap(), 1);
    assert_eq!(boxed.node.get_block(1).unwrap().unwrap().sub_blocks.len(), 1);
}

// ---------------------------------------------------------------------------
// Block import
// ---------------------------------------------------------------------------

#[test]
fn follower_imports_leader_block_and_rejects_tampered_copy() {
    let leader = harness(small_params());
    let follower = open_with(
        NodeConfig {
            validator_id: "validator-1".into(),
            ..config(small_params())
        },
        Arc::new(NullStore::new()),
    )
    .unwrap();

    leader.node.submit_transaction(transfer("alice", "bob", 10, 1)).unwrap();
    leader.node.submit_transaction(transfer("bob", "carol", 5, 0)).unwrap();
    let block = leader.node.get_block(1).unwrap().unwrap();

    let mut tampered: Block = block.clone();
    tampered.timestamp = Timestamp::new(NOW + 1);
    assert!(follower.node.import_block(tampered).is_err());
    assert_eq!(follower.audit.count(AuditKind::BlockRejected), 1);

    follower.node.import_block(block.clone()).unwrap();
    assert_eq!(follower.node.get_chain_height().unwrap(), 1);
    for name in ["alice", "bob", "carol"] {
        assert_eq!(balance(&follower, name), balance(&leader, name));
    }
    assert_eq!(follower.node.get_block(1).unwrap().unwrap().hash, block.hash);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn refused_events_are_delivered_again_on_flush() {
    let h = harness(small_params());
    let received: Arc<Mutex<Vec<LedgerEvent>>> = Arc::default();
    let refusals = Arc::new(AtomicUsize::new(1));
    {
        let received = received.clone();
        let refusals = refusals.clone();
        h.node
            .subscribe(Box::new(move |event: &LedgerEvent| {
                if refusals.load(Ordering::SeqCst) > 0 {
                    refusals.fetch_sub(1, Ordering::SeqCst);
                    return Err(ListenerError("not ready".into()));
                }
                received.lock().unwrap().push(event.clone());
                Ok(())
            }))
            .unwrap();
    }

    h.node.submit_transaction(transfer("alice", "bob", 1, 0)).unwrap();
    h.node.submit_transaction(transfer("alice", "bob", 2, 0)).unwrap();
    h.node.flush_events().unwrap();

    let events = received.lock().unwrap().clone();
    let closed = events
        .iter()
        .filter(|e| matches!(e, LedgerEvent::SubBlockClosed { .. }))
        .count();
    assert_eq!(closed, 2);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, LedgerEvent::BlockFinalized { index: 1, .. }))
            .count(),
        1
    );
    // Commit order is kept: both closes precede the block.
    let block_at = events
        .iter()
        .position(|e| matches!(e, LedgerEvent::BlockFinalized { .. }))
        .unwrap();
    let last_close = events
        .iter()
        .rposition(|e| matches!(e, LedgerEvent::SubBlockClosed { .. }))
        .unwrap();
    assert!(last_close < block_at);
}

#[test]
fn concurrent_submitters_deliver_every_event_without_a_flush() {
    let h = harness(small_params());
    let closed = Arc::new(AtomicUsize::new(0));
    let blocks = Arc::new(AtomicUsize::new(0));
    {
        let closed = closed.clone();
        let blocks = blocks.clone();
        h.node
            .subscribe(Box::new(move |event: &LedgerEvent| {
                match event {
                    LedgerEvent::SubBlockClosed { .. } => closed.fetch_add(1, Ordering::SeqCst),
                    LedgerEvent::BlockFinalized { .. } => blocks.fetch_add(1, Ordering::SeqCst),
                    _ => 0,
                };
                Ok(())
            }))
            .unwrap();
    }

    std::thread::scope(|s| {
        for worker in 0..4u128 {
            let node = &h.node;
            s.spawn(move || {
                for n in 0..25u128 {
                    node.submit_transaction(transfer("whale", "carol", 1 + worker * 100 + n, 1))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(closed.load(Ordering::SeqCst), 100);
    assert_eq!(blocks.load(Ordering::SeqCst), 50);
}

#[test]
fn failing_audit_sink_never_fails_the_operation() {
    let h = harness(small_params());
    h.audit.set_failing(true);
    assert!(h.node.submit_transaction(transfer("carol", "bob", 1, 0)).is_err());
    h.node.submit_transaction(transfer("alice", "bob", 1, 0)).unwrap();
    h.node.submit_transaction(transfer("alice", "bob", 2, 0)).unwrap();
    assert_eq!(h.node.get_chain_height().unwrap(), 1);
    assert!(h.audit.records().is_empty());
}

// ---------------------------------------------------------------------------
// Persistence and recovery
// ---------------------------------------------------------------------------

#[test]
fn restart_recovers_chain_balances_and_duplicate_cache() {
    let store = Arc::new(NullStore::new());
    let (t1, t3) = {
        let h = open_with(config(small_params()), store.clone()).unwrap();
        let t1 = transfer("alice", "bob", 10, 1);
        h.node.submit_transaction(t1.clone()).unwrap();
        h.node.submit_transaction(transfer("bob", "carol", 5, 0)).unwrap();
        assert_eq!(h.node.get_chain_height().unwrap(), 1);

        // Value moved outside any block.
        let channel = h
            .node
            .open_channel(vec![(id("alice"), Amount::new(20)), (id("bob"), Amount::new(20))])
            .unwrap();
        let mut split = BTreeMap::new();
        split.insert(id("alice"), Amount::new(10));
        split.insert(id("bob"), Amount::new(30));
        let final_state = SignedState::new(ChannelState::new(channel, 1, split).finalized())
            .sign(id("alice"), &key(1).private)
            .sign(id("bob"), &key(2).private);
        h.node.close_channel(channel, &final_state).unwrap();

        // Still accumulating at shutdown; not durable under a strict policy.
        let t3 = transfer("alice", "carol", 1, 0);
        h.node.submit_transaction(t3.clone()).unwrap();
        h.node.shutdown().unwrap();
        (t1, t3)
    };

    let h = open_with(config(small_params()), store).unwrap();
    assert_eq!(h.node.get_chain_height().unwrap(), 1);
    assert_eq!(balance(&h, "alice"), 79);
    assert_eq!(balance(&h, "bob"), 65);
    assert_eq!(balance(&h, "carol"), 5);

    let err = h.node.submit_transaction(t1.clone()).unwrap_err();
    assert!(is_duplicate(&err), "unexpected error {err:?}");
    assert_eq!(
        h.node.get_transaction(&t1.id).unwrap().unwrap().status,
        TxStatus::Finalized
    );
    h.node.submit_transaction(t3).unwrap();

    // The held fee survived the restart.
    h.node.distribute_fees(&t1.id, &[(id("carol"), Amount::new(1))]).unwrap();
    assert_eq!(balance(&h, "carol"), 7);
}

#[test]
fn blocks_after_the_last_snapshot_are_replayed() {
    let store = Arc::new(NullStore::new());
    {
        let h = open_with(config(small_params()), store.clone()).unwrap();
        for amount in 1..=4 {
            h.node.submit_transaction(transfer("alice", "bob", amount, 0)).unwrap();
        }
        assert_eq!(h.node.get_chain_height().unwrap(), 2);
    }
    store.drop_snapshots_above(1);

    let h = open_with(config(small_params()), store).unwrap();
    assert_eq!(h.node.get_chain_height().unwrap(), 2);
    assert_eq!(balance(&h, "alice"), 90);
    assert_eq!(balance(&h, "bob"), 60);
}

#[test]
fn tampered_block_log_refuses_to_start() {
    let store = Arc::new(NullStore::new());
    {
        let h = open_with(config(small_params()), store.clone()).unwrap();
        h.node.submit_transaction(transfer("alice", "bob", 1, 0)).unwrap();
        h.node.submit_transaction(transfer("alice", "bob", 2, 0)).unwrap();
        let mut block = h.node.get_block(1).unwrap().unwrap();
        block.timestamp = Timestamp::new(NOW + 5);
        store.tamper_block(1, block.to_bytes().unwrap());
    }

    let result = open_with(config(small_params()), store);
    assert!(matches!(result, Err(NodeError::ChainIntegrity(_))));
}

#[test]
fn store_from_another_network_refuses_to_start() {
    let store = Arc::new(NullStore::new());
    drop(open_with(config(small_params()), store.clone()).unwrap());
    let other = NodeConfig {
        network: NetworkId::Test,
        ..config(small_params())
    };
    assert!(matches!(
        open_with(other, store),
        Err(NodeError::ChainIntegrity(_))
    ));
}

#[test]
fn lmdb_backed_node_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain");
    let open = || {
        let store = strata_node::open_lmdb_store(&path, 64 * 1024 * 1024).unwrap();
        StrataNode::open(
            config(small_params()),
            NodeServices {
                store,
                audit: Arc::new(NullAuditSink::new()),
                clock: Arc::new(NullClock::new(NOW)),
                root_chain: Arc::new(NullRootChain::new()),
                verifier: Arc::new(Ed25519Verifier),
            },
        )
        .unwrap()
    };

    {
        let node = open();
        node.submit_transaction(transfer("alice", "bob", 10, 1)).unwrap();
        node.submit_transaction(transfer("bob", "carol", 5, 0)).unwrap();
        node.shutdown().unwrap();
    }

    let node = open();
    assert_eq!(node.get_chain_height().unwrap(), 1);
    assert_eq!(node.get_balance(&id("alice")).unwrap(), Amount::new(89));
    assert_eq!(node.get_balance(&id("carol")).unwrap(), Amount::new(5));
}

#[test]
fn metrics_track_the_pipeline() {
    let h = harness(small_params());
    h.node.submit_transaction(transfer("alice", "bob", 1, 0)).unwrap();
    h.node.submit_transaction(transfer("alice", "bob", 2, 0)).unwrap();
    let m = h.node.metrics();
    assert_eq!(m.sub_blocks_closed.get(), 2);
    assert_eq!(m.blocks_finalized.get(), 1);
    assert_eq!(m.chain_height.get(), 1);
    assert_eq!(m.accumulator_size.get(), 0);
    let text = m.encode().unwrap();
    assert!(text.contains("strata_blocks_finalized_total 1"));
}
