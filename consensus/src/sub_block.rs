//! Sub-blocks: ordered, hash-linked batches of transactions.

use serde::{Deserialize, Serialize};
use strata_crypto::{domain, domain_hash, merkle_root};
use strata_transactions::Transaction;
use strata_types::{SubBlockHash, SubBlockId, SubBlockStatus, Timestamp, TxHash, ValidatorId};

use crate::error::ConsensusError;

/// A batch of transactions produced by one validator.
///
/// `sequence_index`, `prev_hash`, `hash` and `closed_at` are assigned when
/// the sub-block closes; after that the sub-block is immutable apart from
/// its status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBlock {
    pub id: SubBlockId,
    pub sequence_index: u64,
    pub transactions: Vec<Transaction>,
    pub prev_hash: SubBlockHash,
    pub hash: SubBlockHash,
    pub validator_id: ValidatorId,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
    pub status: SubBlockStatus,
}

impl SubBlock {
    pub fn open(id: SubBlockId, validator_id: ValidatorId, now: Timestamp) -> Self {
        Self {
            id,
            sequence_index: 0,
            transactions: Vec::new(),
            prev_hash: SubBlockHash::ZERO,
            hash: SubBlockHash::ZERO,
            validator_id,
            created_at: now,
            closed_at: None,
            status: SubBlockStatus::Open,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn tx_ids(&self) -> Vec<TxHash> {
        self.transactions.iter().map(|tx| tx.id).collect()
    }

    pub fn contains(&self, id: &TxHash) -> bool {
        self.transactions.iter().any(|tx| tx.id == *id)
    }

    /// Merkle root over the ordered transaction ids.
    pub fn tx_root(&self) -> [u8; 32] {
        let leaves: Vec<[u8; 32]> = self.transactions.iter().map(|tx| *tx.id.as_bytes()).collect();
        merkle_root(&leaves)
    }

    pub fn compute_hash(&self) -> SubBlockHash {
        let seq = self.sequence_index.to_le_bytes();
        let root = self.tx_root();
        let closed = self.closed_at.unwrap_or(Timestamp::EPOCH).as_secs().to_le_bytes();
        SubBlockHash::new(domain_hash(
            domain::SUB_BLOCK,
            &[
                &seq,
                self.prev_hash.as_bytes(),
                &root,
                &closed,
                self.validator_id.as_str().as_bytes(),
            ],
        ))
    }

    /// Assign position and hash, moving to `Closed`.
    pub fn seal(&mut self, sequence_index: u64, prev_hash: SubBlockHash, now: Timestamp) {
        self.sequence_index = sequence_index;
        self.prev_hash = prev_hash;
        self.closed_at = Some(now);
        self.hash = self.compute_hash();
        self.status = SubBlockStatus::Closed;
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConsensusError> {
        bincode::serialize(self).map_err(|e| ConsensusError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConsensusError> {
        bincode::deserialize(bytes).map_err(|e| ConsensusError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::keypair_from_seed;
    use strata_types::{AccountId, Amount};

    fn tx(n: u128) -> Transaction {
        Transaction::create(
            AccountId::new("alice"),
            AccountId::new("bob"),
            Amount::new(n),
            Amount::ZERO,
            Timestamp::new(1),
            &keypair_from_seed(&[1; 32]).private,
        )
    }

    fn sealed(txs: Vec<Transaction>) -> SubBlock {
        let mut sb = SubBlock::open(SubBlockId::new(1), ValidatorId::new("v1"), Timestamp::new(1));
        sb.transactions = txs;
        sb.seal(1, SubBlockHash::ZERO, Timestamp::new(2));
        sb
    }

    #[test]
    fn seal_sets_hash_and_status() {
        let sb = sealed(vec![tx(1), tx(2)]);
        assert_eq!(sb.status, SubBlockStatus::Closed);
        assert!(!sb.hash.is_zero());
        assert!(sb.verify_hash());
    }

    #[test]
    fn tampering_breaks_hash() {
        let mut sb = sealed(vec![tx(1), tx(2)]);
        sb.transactions.swap(0, 1);
        assert!(!sb.verify_hash());

        let mut sb = sealed(vec![tx(1)]);
        sb.prev_hash = SubBlockHash::new([1; 32]);
        assert!(!sb.verify_hash());
    }

    #[test]
    fn validator_is_bound_into_hash() {
        let a = sealed(vec![tx(1)]);
        let mut b = a.clone();
        b.validator_id = ValidatorId::new("v2");
        assert_ne!(a.hash, b.compute_hash());
    }

    #[test]
    fn contains_and_ids() {
        let t = tx(3);
        let sb = sealed(vec![t.clone()]);
        assert!(sb.contains(&t.id));
        assert_eq!(sb.tx_ids(), vec![t.id]);
    }
}
