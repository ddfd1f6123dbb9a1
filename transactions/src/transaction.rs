//! The value-transfer transaction and its canonical encoding.

use serde::{Deserialize, Serialize};
use strata_crypto::{blake2b_256, domain, sign_message};
use strata_types::{AccountId, Amount, PrivateKey, Signature, Timestamp, TxHash, TxStatus};

/// A signed transfer of `amount` from `from` to `to`, paying `fee`.
///
/// Everything except `status` is fixed once the transaction is signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxHash,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub fee: Amount,
    pub timestamp: Timestamp,
    pub signature: Signature,
    pub status: TxStatus,
}

impl Transaction {
    /// Build and sign a transaction with the sender's key.
    pub fn create(
        from: AccountId,
        to: AccountId,
        amount: Amount,
        fee: Amount,
        timestamp: Timestamp,
        signer: &PrivateKey,
    ) -> Self {
        let mut tx = Self::unsigned(from, to, amount, fee, timestamp);
        tx.sign(signer);
        tx
    }

    /// Build a transaction with its id derived but no signature attached.
    pub fn unsigned(
        from: AccountId,
        to: AccountId,
        amount: Amount,
        fee: Amount,
        timestamp: Timestamp,
    ) -> Self {
        let id = compute_id(&from, &to, amount, fee, timestamp);
        Self {
            id,
            from,
            to,
            amount,
            fee,
            timestamp,
            signature: Signature::EMPTY,
            status: TxStatus::Pending,
        }
    }

    pub fn sign(&mut self, signer: &PrivateKey) {
        self.signature = sign_message(&self.signing_bytes(), signer);
    }

    /// The bytes the sender signs: the canonical payload under the
    /// transaction domain, every field length-prefixed.
    pub fn signing_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.from, &self.to, self.amount, self.fee, self.timestamp)
    }

    /// The id this transaction's payload hashes to.
    pub fn canonical_id(&self) -> TxHash {
        compute_id(&self.from, &self.to, self.amount, self.fee, self.timestamp)
    }

    /// `amount + fee`, the total debited from the sender.
    pub fn total_debit(&self) -> Option<Amount> {
        self.amount.checked_add(self.fee)
    }
}

/// Derive a transaction id from its payload.
///
/// Equal to `domain_hash(domain::TRANSACTION, fields)` because the canonical
/// encoding uses the same length-prefixed layout.
pub fn compute_id(
    from: &AccountId,
    to: &AccountId,
    amount: Amount,
    fee: Amount,
    timestamp: Timestamp,
) -> TxHash {
    TxHash::new(blake2b_256(&canonical_bytes(from, to, amount, fee, timestamp)))
}

fn canonical_bytes(
    from: &AccountId,
    to: &AccountId,
    amount: Amount,
    fee: Amount,
    timestamp: Timestamp,
) -> Vec<u8> {
    let amount = amount.raw().to_le_bytes();
    let fee = fee.raw().to_le_bytes();
    let ts = timestamp.as_secs().to_le_bytes();
    let fields: [&[u8]; 5] = [
        from.as_str().as_bytes(),
        to.as_str().as_bytes(),
        &amount,
        &fee,
        &ts,
    ];

    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(&(domain::TRANSACTION.len() as u64).to_le_bytes());
    out.extend_from_slice(domain::TRANSACTION);
    for field in fields {
        out.extend_from_slice(&(field.len() as u64).to_le_bytes());
        out.extend_from_slice(field);
    }
    out
}
