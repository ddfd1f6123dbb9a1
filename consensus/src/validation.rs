//! Validation of blocks received from other validators.

use std::collections::HashSet;

use rayon::prelude::*;
use strata_crypto::SignatureVerifier;
use strata_ledger::LedgerState;
use strata_types::ChainParams;

use crate::block::Block;
use crate::chain::Chain;
use crate::error::ConsensusError;
use crate::verify::verify_signatures;

/// Check that `block` may extend `chain`.
///
/// Header, sub-block count, root and hash are checked first. Sub-block hashes
/// and transaction signatures are then re-verified in parallel. Linkage must
/// continue from the chain's last sub-block, and no transaction may repeat
/// within the block or appear in finalized history.
pub fn validate_block(
    block: &Block,
    chain: &Chain,
    params: &ChainParams,
    ledger: &LedgerState,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ConsensusError> {
    if chain.is_rejected(&block.hash) {
        return Err(ConsensusError::AlreadyRejected(block.hash));
    }

    let expected = chain.height() + 1;
    if block.index != expected {
        return Err(ConsensusError::IndexOutOfSequence {
            expected,
            got: block.index,
        });
    }
    if block.prev_hash != chain.tip_hash() {
        return Err(ConsensusError::PrevHashMismatch {
            expected: chain.tip_hash(),
            got: block.prev_hash,
        });
    }

    let threshold = params.sub_blocks_per_block;
    let count = block.sub_blocks.len();
    let count_ok = if params.seal_policy.allows_partial() {
        (1..=threshold).contains(&count)
    } else {
        count == threshold
    };
    if !count_ok {
        return Err(ConsensusError::WrongSubBlockCount {
            expected: threshold,
            got: count,
        });
    }

    if !block.verify_root() {
        return Err(ConsensusError::SubBlockRootMismatch { index: block.index });
    }
    if !block.verify_hash() {
        return Err(ConsensusError::BlockHashMismatch { index: block.index });
    }

    if let Some(bad) = block.sub_blocks.par_iter().find_first(|sb| !sb.verify_hash()) {
        return Err(ConsensusError::SubBlockHashMismatch(bad.id));
    }

    let (mut prev, mut seq) = chain.last_sub_block();
    for sb in &block.sub_blocks {
        if !sb.status.is_sealed() {
            return Err(ConsensusError::SubBlockNotClosed {
                id: sb.id,
                status: sb.status,
            });
        }
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
        prev = sb.hash;
        seq = sb.sequence_index;
    }

    let mut seen = HashSet::with_capacity(block.tx_count());
    for tx in block.sub_blocks.iter().flat_map(|sb| &sb.transactions) {
        if chain.is_finalized(&tx.id) {
            return Err(ConsensusError::AlreadyFinalized(tx.id));
        }
        if !seen.insert(tx.id) {
            return Err(ConsensusError::DuplicateInBlock(tx.id));
        }
    }

    verify_signatures(
        block.sub_blocks.iter().flat_map(|sb| &sb.transactions),
        ledger,
        verifier,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::{key, ledger, params, transfer};
    use crate::sub_block::SubBlock;
    use strata_crypto::Ed25519Verifier;
    use strata_ledger::GenesisConfig;
    use strata_transactions::Transaction;
    use strata_types::{AccountId, Amount, BlockSealPolicy, NetworkId, SubBlockHash, SubBlockId, Timestamp, ValidatorId};

    fn chain() -> Chain {
        Chain::new(Block::genesis(&GenesisConfig::new(NetworkId::Dev)))
    }

    fn two_per_block() -> ChainParams {
        ChainParams {
            sub_blocks_per_block: 2,
            ..params(10)
        }
    }

    fn sealed(id: u64, seq: u64, prev: SubBlockHash, txs: Vec<Transaction>) -> SubBlock {
        let mut sb = SubBlock::open(SubBlockId::new(id), ValidatorId::new("v2"), Timestamp::EPOCH);
        sb.transactions = txs;
        sb.seal(seq, prev, Timestamp::EPOCH);
        sb
    }

    fn good_block(chain: &Chain) -> Block {
        let a = sealed(1, 1, SubBlockHash::ZERO, vec![transfer(1, 0)]);
        let b = sealed(2, 2, a.hash, vec![transfer(2, 0)]);
        Block::build(1, chain.tip_hash(), vec![a, b], Timestamp::new(1))
    }

    #[test]
    fn accepts_well_formed_block() {
        let c = chain();
        let block = good_block(&c);
        assert_eq!(validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier), Ok(()));
    }

    #[test]
    fn strict_policy_requires_exact_count() {
        let c = chain();
        let a = sealed(1, 1, SubBlockHash::ZERO, vec![transfer(1, 0)]);
        let block = Block::build(1, c.tip_hash(), vec![a], Timestamp::new(1));
        assert_eq!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::WrongSubBlockCount { expected: 2, got: 1 })
        );

        let partial = ChainParams {
            seal_policy: BlockSealPolicy::TimeBoxedPartial { max_wait_secs: 5 },
            ..two_per_block()
        };
        assert_eq!(validate_block(&block, &c, &partial, &ledger(), &Ed25519Verifier), Ok(()));
    }

    #[test]
    fn rejects_broken_linkage() {
        let c = chain();
        let a = sealed(1, 1, SubBlockHash::ZERO, vec![transfer(1, 0)]);
        let b = sealed(2, 2, SubBlockHash::new([9; 32]), vec![transfer(2, 0)]);
        let block = Block::build(1, c.tip_hash(), vec![a, b], Timestamp::new(1));
        assert!(matches!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::LinkageMismatch { .. })
        ));
    }

    #[test]
    fn rejects_sequence_gap() {
        let c = chain();
        let a = sealed(1, 1, SubBlockHash::ZERO, vec![transfer(1, 0)]);
        let b = sealed(2, 3, a.hash, vec![transfer(2, 0)]);
        let block = Block::build(1, c.tip_hash(), vec![a, b], Timestamp::new(1));
        assert_eq!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::SequenceGap { expected: 2, got: 3 })
        );
    }

    #[test]
    fn rejects_tampered_sub_block() {
        let c = chain();
        let mut block = good_block(&c);
        block.sub_blocks[1].transactions.push(transfer(3, 0));
        block.sub_blocks_root = Block::compute_root(&block.sub_blocks);
        block.hash = block.compute_hash();
        assert_eq!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::SubBlockHashMismatch(SubBlockId::new(2)))
        );
    }

    #[test]
    fn rejects_duplicate_inside_block() {
        let c = chain();
        let t = transfer(1, 0);
        let a = sealed(1, 1, SubBlockHash::ZERO, vec![t.clone()]);
        let b = sealed(2, 2, a.hash, vec![t.clone()]);
        let block = Block::build(1, c.tip_hash(), vec![a, b], Timestamp::new(1));
        assert_eq!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::DuplicateInBlock(t.id))
        );
    }

    #[test]
    fn rejects_forged_signature() {
        let c = chain();
        let forged = Transaction::create(
            AccountId::new("alice"),
            AccountId::new("bob"),
            Amount::new(5),
            Amount::ZERO,
            Timestamp::EPOCH,
            &key(2).private,
        );
        let a = sealed(1, 1, SubBlockHash::ZERO, vec![transfer(1, 0)]);
        let b = sealed(2, 2, a.hash, vec![forged.clone()]);
        let block = Block::build(1, c.tip_hash(), vec![a, b], Timestamp::new(1));
        assert_eq!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::InvalidSignature(forged.id))
        );
    }

    #[test]
    fn rejects_previously_rejected_and_bad_header() {
        let mut c = chain();
        let block = good_block(&c);
        c.record_rejected(block.hash);
        assert_eq!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::AlreadyRejected(block.hash))
        );

        let c = chain();
        let mut block = good_block(&c);
        block.timestamp = Timestamp::new(77);
        assert_eq!(
            validate_block(&block, &c, &two_per_block(), &ledger(), &Ed25519Verifier),
            Err(ConsensusError::BlockHashMismatch { index: 1 })
        );
    }
}
