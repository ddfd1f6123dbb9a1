//! Ledger snapshots: the state of all accounts at a finalized height.
//!
//! The node persists one snapshot per finalized block. The hash is computed
//! deterministically from the account table, fee holdings and chain tip, so
//! a snapshot read back from storage can be checked before it is trusted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_crypto::{domain, domain_hash};
use strata_types::{AccountId, Amount, BlockHash, PublicKey, Timestamp, TxHash, TxStatus};

use crate::error::LedgerError;
use crate::state::{ChainMeta, LedgerState};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub hash: [u8; 32],
    pub block_height: u64,
    pub last_block_hash: BlockHash,
    pub created_at: Timestamp,
    /// Sorted by account id.
    pub accounts: Vec<AccountSnapshot>,
    /// Undistributed fees per transaction, sorted by id.
    pub held_fees: Vec<(TxHash, Amount)>,
    pub fee_pool: Amount,
    pub withdrawn: Amount,
    pub version: u32,
}

/// Fee and withdrawal totals carried by a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeeHoldings {
    pub held: Vec<(TxHash, Amount)>,
    pub pool: Amount,
    pub withdrawn: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub public_key: PublicKey,
    pub balance: Amount,
    pub locked: Amount,
}

impl LedgerSnapshot {
    pub fn create(
        accounts: Vec<AccountSnapshot>,
        fees: FeeHoldings,
        chain: ChainMeta,
        created_at: Timestamp,
    ) -> Self {
        let mut snap = Self {
            hash: [0u8; 32],
            block_height: chain.block_height,
            last_block_hash: chain.last_block_hash,
            created_at,
            accounts,
            held_fees: fees.held,
            fee_pool: fees.pool,
            withdrawn: fees.withdrawn,
            version: SNAPSHOT_VERSION,
        };
        snap.hash = snap.compute_hash();
        snap
    }

    fn compute_hash(&self) -> [u8; 32] {
        let mut fields: Vec<Vec<u8>> = Vec::with_capacity(self.accounts.len() * 4 + 3);
        fields.push(self.version.to_le_bytes().to_vec());
        fields.push(self.block_height.to_le_bytes().to_vec());
        fields.push(self.last_block_hash.as_bytes().to_vec());
        for account in &self.accounts {
            fields.push(account.id.as_str().as_bytes().to_vec());
            fields.push(account.public_key.as_bytes().to_vec());
            fields.push(account.balance.raw().to_le_bytes().to_vec());
            fields.push(account.locked.raw().to_le_bytes().to_vec());
        }
        for (tx, fee) in &self.held_fees {
            fields.push(tx.as_bytes().to_vec());
            fields.push(fee.raw().to_le_bytes().to_vec());
        }
        fields.push(self.fee_pool.raw().to_le_bytes().to_vec());
        fields.push(self.withdrawn.raw().to_le_bytes().to_vec());
        let refs: Vec<&[u8]> = fields.iter().map(Vec::as_slice).collect();
        domain_hash(domain::SNAPSHOT, &refs)
    }

    pub fn verify(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl LedgerState {
    pub fn snapshot(&self, now: Timestamp) -> LedgerSnapshot {
        let accounts = self
            .accounts
            .values()
            .map(|a| AccountSnapshot {
                id: a.id.clone(),
                public_key: a.public_key,
                balance: a.balance,
                locked: a.locked,
            })
            .collect();
        let held: BTreeMap<TxHash, Amount> = self.held_fees.iter().map(|(id, fee)| (*id, *fee)).collect();
        self.build_snapshot(accounts, held, now)
    }

    /// Snapshot of the state as it stood before the given included
    /// transactions were applied. `in_flight` is oldest first; effects are
    /// taken back newest first so every recipient still holds what it got.
    ///
    /// Sub-blocks that have not reached a block are not durable, so this is
    /// what the node persists while any are open or accumulated.
    pub fn snapshot_excluding(
        &self,
        in_flight: &[TxHash],
        now: Timestamp,
    ) -> Result<LedgerSnapshot, LedgerError> {
        let mut accounts: BTreeMap<AccountId, AccountSnapshot> = self
            .accounts
            .values()
            .map(|a| {
                (
                    a.id.clone(),
                    AccountSnapshot {
                        id: a.id.clone(),
                        public_key: a.public_key,
                        balance: a.balance,
                        locked: a.locked,
                    },
                )
            })
            .collect();
        let mut held: BTreeMap<TxHash, Amount> =
            self.held_fees.iter().map(|(id, fee)| (*id, *fee)).collect();

        for id in in_flight.iter().rev() {
            let record = self
                .tx_cache
                .get(id)
                .ok_or(LedgerError::UnknownTransaction(*id))?;
            let tx = &record.tx;
            if tx.status != TxStatus::Included {
                return Err(LedgerError::UnexpectedTxStatus {
                    id: *id,
                    status: tx.status,
                    expected: TxStatus::Included,
                });
            }
            let fee = held.remove(id).unwrap_or(Amount::ZERO);
            let recipient = accounts
                .get_mut(&tx.to)
                .ok_or_else(|| LedgerError::UnknownAccount(tx.to.clone()))?;
            recipient.balance = recipient.balance.checked_sub(tx.amount).ok_or_else(|| {
                LedgerError::InsufficientFunds {
                    account: tx.to.clone(),
                    needed: tx.amount,
                    available: recipient.balance,
                }
            })?;
            let refund = tx.amount.checked_add(fee).ok_or(LedgerError::Overflow)?;
            let sender = accounts
                .get_mut(&tx.from)
                .ok_or_else(|| LedgerError::UnknownAccount(tx.from.clone()))?;
            sender.balance = sender.balance.checked_add(refund).ok_or(LedgerError::Overflow)?;
        }

        Ok(self.build_snapshot(accounts.into_values().collect(), held, now))
    }

    fn build_snapshot(
        &self,
        accounts: Vec<AccountSnapshot>,
        held: BTreeMap<TxHash, Amount>,
        now: Timestamp,
    ) -> LedgerSnapshot {
        let fees = FeeHoldings {
            held: held.into_iter().collect(),
            pool: self.fee_pool,
            withdrawn: self.withdrawn,
        };
        LedgerSnapshot::create(accounts, fees, self.chain, now)
    }

    /// Overwrite balances and fee holdings with a verified snapshot taken at
    /// the current chain tip, keeping the transaction cache.
    ///
    /// Used on startup once the block log up to the snapshot's height has
    /// been replayed into the duplicate cache: the snapshot brings back the
    /// balances, including value moved outside blocks (settlements, exits,
    /// fee distributions). Refused while any lock is active. Returns the
    /// number of accounts whose balance changed.
    pub fn reconcile_with(&mut self, snapshot: &LedgerSnapshot) -> Result<usize, LedgerError> {
        if !snapshot.verify() {
            return Err(LedgerError::Serialization(format!(
                "snapshot at height {} fails hash verification",
                snapshot.block_height
            )));
        }
        if snapshot.block_height != self.chain.block_height
            || snapshot.last_block_hash != self.chain.last_block_hash
        {
            return Err(LedgerError::Serialization(format!(
                "snapshot at height {} does not match chain tip at height {}",
                snapshot.block_height, self.chain.block_height
            )));
        }
        if !self.locks.is_empty() {
            return Err(LedgerError::Serialization(
                "cannot reconcile balances while funds are locked".to_string(),
            ));
        }

        let mut changed = 0;
        for a in &snapshot.accounts {
            match self.accounts.get_mut(&a.id) {
                Some(account) => {
                    if account.balance != a.balance {
                        account.balance = a.balance;
                        changed += 1;
                    }
                }
                None => {
                    self.open_account(a.id.clone(), a.public_key, a.balance)?;
                    changed += 1;
                }
            }
        }
        self.held_fees = snapshot.held_fees.iter().copied().collect();
        self.fee_pool = snapshot.fee_pool;
        self.withdrawn = snapshot.withdrawn;
        Ok(changed)
    }

    /// Replace accounts and chain tip with a verified snapshot.
    ///
    /// Locks are not part of a snapshot, so restored accounts start fully
    /// available. Caches and settlement tables are cleared.
    pub fn restore(&mut self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
        if !snapshot.verify() {
            return Err(LedgerError::Serialization(format!(
                "snapshot at height {} fails hash verification",
                snapshot.block_height
            )));
        }
        let config = self.config.clone();
        *self = LedgerState::new(config);
        for a in &snapshot.accounts {
            self.open_account(a.id.clone(), a.public_key, a.balance)?;
        }
        self.chain = ChainMeta {
            block_height: snapshot.block_height,
            last_block_hash: snapshot.last_block_hash,
        };
        self.held_fees = snapshot.held_fees.iter().copied().collect();
        self.fee_pool = snapshot.fee_pool;
        self.withdrawn = snapshot.withdrawn;
        Ok(())
    }
}
