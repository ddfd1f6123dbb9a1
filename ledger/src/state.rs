//! The ledger state: one owned object holding every balance-bearing table.
//!
//! All mutation goes through `&mut LedgerState`, so callers that share it
//! (the node puts it behind a mutex) get atomic check-then-act for free.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use strata_transactions::Transaction;
use strata_types::{
    AccountId, Amount, BlockHash, ChainParams, EscrowId, LockId, PublicKey, Timestamp, TxHash,
    ValidatorId,
};
use tracing::debug;

use crate::account::{Account, FundLock};
use crate::error::LedgerError;
use crate::escrow::Escrow;
use crate::stakes::{PunishmentEntry, RewardEntry};

/// The subset of chain parameters the ledger itself consults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    pub staleness_window_secs: u64,
    pub tx_retention_secs: u64,
    pub compaction_batch_size: usize,
}

impl From<&ChainParams> for LedgerConfig {
    fn from(params: &ChainParams) -> Self {
        Self {
            staleness_window_secs: params.staleness_window_secs,
            tx_retention_secs: params.tx_retention_secs,
            compaction_batch_size: params.compaction_batch_size,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::from(&ChainParams::default())
    }
}

/// Height and tip of the finalized chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMeta {
    pub block_height: u64,
    pub last_block_hash: BlockHash,
}

/// A transaction held in the duplicate cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRecord {
    pub tx: Transaction,
    pub applied_at: Timestamp,
    pub finalized_at: Option<Timestamp>,
}

#[derive(Debug)]
pub struct LedgerState {
    pub(crate) config: LedgerConfig,
    pub(crate) accounts: BTreeMap<AccountId, Account>,
    pub(crate) tx_cache: HashMap<TxHash, TxRecord>,
    /// Fee collected per transaction and not yet distributed.
    pub(crate) held_fees: HashMap<TxHash, Amount>,
    /// Fees paid on direct transfers that carry no transaction id.
    pub(crate) fee_pool: Amount,
    /// Value that left the ledger through consumed locks (child-chain exits).
    pub(crate) withdrawn: Amount,
    pub(crate) chain: ChainMeta,
    pub(crate) stakes: BTreeMap<ValidatorId, Amount>,
    pub(crate) rewards: Vec<RewardEntry>,
    pub(crate) punishments: Vec<PunishmentEntry>,
    pub(crate) locks: BTreeMap<LockId, FundLock>,
    pub(crate) next_lock: LockId,
    pub(crate) escrows: BTreeMap<EscrowId, Escrow>,
    pub(crate) next_escrow: EscrowId,
}

impl LedgerState {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            accounts: BTreeMap::new(),
            tx_cache: HashMap::new(),
            held_fees: HashMap::new(),
            fee_pool: Amount::ZERO,
            withdrawn: Amount::ZERO,
            chain: ChainMeta::default(),
            stakes: BTreeMap::new(),
            rewards: Vec::new(),
            punishments: Vec::new(),
            locks: BTreeMap::new(),
            next_lock: LockId::new(1),
            escrows: BTreeMap::new(),
            next_escrow: EscrowId::new(1),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn open_account(
        &mut self,
        id: AccountId,
        public_key: PublicKey,
        initial_balance: Amount,
    ) -> Result<(), LedgerError> {
        if self.accounts.contains_key(&id) {
            return Err(LedgerError::AccountExists(id));
        }
        debug!(account = %id, balance = %initial_balance, "account opened");
        self.accounts
            .insert(id.clone(), Account::new(id, public_key, initial_balance));
        Ok(())
    }

    pub fn account(&self, id: &AccountId) -> Result<&Account, LedgerError> {
        self.accounts
            .get(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.clone()))
    }

    pub(crate) fn account_mut(&mut self, id: &AccountId) -> Result<&mut Account, LedgerError> {
        self.accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.clone()))
    }

    pub fn has_account(&self, id: &AccountId) -> bool {
        self.accounts.contains_key(id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn public_key(&self, id: &AccountId) -> Result<PublicKey, LedgerError> {
        Ok(self.account(id)?.public_key)
    }

    /// Total balance, including locked value.
    pub fn get_balance(&self, id: &AccountId) -> Result<Amount, LedgerError> {
        Ok(self.account(id)?.balance)
    }

    /// Balance minus active locks.
    pub fn get_available_balance(&self, id: &AccountId) -> Result<Amount, LedgerError> {
        Ok(self.account(id)?.available())
    }

    /// Move `amount` from `from` to `to`, with `from` also paying `fee` into
    /// the fee pool. Both sides change or neither does.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        fee: Amount,
    ) -> Result<(), LedgerError> {
        self.move_funds(from, to, amount, fee)?;
        self.fee_pool = self
            .fee_pool
            .checked_add(fee)
            .ok_or(LedgerError::Overflow)?;
        debug!(%from, %to, %amount, %fee, "transfer");
        Ok(())
    }

    /// Debit `amount + fee` from `from` and credit `amount` to `to`. The fee
    /// is left for the caller to account for.
    pub(crate) fn move_funds(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        fee: Amount,
    ) -> Result<(), LedgerError> {
        let needed = amount.checked_add(fee).ok_or(LedgerError::Overflow)?;
        let available = self.account(from)?.available();
        let recipient_balance = self.account(to)?.balance;
        if available < needed {
            return Err(LedgerError::InsufficientFunds {
                account: from.clone(),
                needed,
                available,
            });
        }
        if from != to {
            recipient_balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
        }

        // Both accounts exist and both sides fit; nothing below can fail.
        let sender = self.account_mut(from)?;
        sender.balance = sender.balance.saturating_sub(needed);
        let recipient = self.account_mut(to)?;
        recipient.balance = recipient
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    pub fn chain_meta(&self) -> ChainMeta {
        self.chain
    }

    pub fn block_height(&self) -> u64 {
        self.chain.block_height
    }

    pub fn last_block_hash(&self) -> BlockHash {
        self.chain.last_block_hash
    }

    /// Record a newly finalized block as the chain tip.
    pub fn advance_chain(&mut self, height: u64, hash: BlockHash) -> Result<(), LedgerError> {
        let expected = self.chain.block_height + 1;
        if height != expected {
            return Err(LedgerError::HeightOutOfSequence {
                expected,
                got: height,
            });
        }
        self.chain = ChainMeta {
            block_height: height,
            last_block_hash: hash,
        };
        Ok(())
    }

    /// Undistributed fees paid on direct transfers.
    pub fn fee_pool(&self) -> Amount {
        self.fee_pool
    }

    /// Value removed from the ledger by consumed locks.
    pub fn withdrawn(&self) -> Amount {
        self.withdrawn
    }

    /// Sum of all value the ledger accounts for: balances, held fees, the fee
    /// pool and withdrawn value. Every operation except account opening
    /// leaves this unchanged.
    pub fn total_value(&self) -> Option<Amount> {
        let balances = Amount::checked_sum(self.accounts.values().map(|a| a.balance))?;
        let held = Amount::checked_sum(self.held_fees.values().copied())?;
        balances
            .checked_add(held)?
            .checked_add(self.fee_pool)?
            .checked_add(self.withdrawn)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use strata_crypto::keypair_from_seed;
    use strata_types::KeyPair;

    pub(crate) fn key(seed: u8) -> KeyPair {
        keypair_from_seed(&[seed; 32])
    }

    /// Ledger with alice=100, bob=50, carol=0 (keys seeded 1, 2, 3).
    pub(crate) fn ledger() -> LedgerState {
        let mut ledger = LedgerState::new(LedgerConfig::default());
        ledger
            .open_account(AccountId::new("alice"), key(1).public, Amount::new(100))
            .unwrap();
        ledger
            .open_account(AccountId::new("bob"), key(2).public, Amount::new(50))
            .unwrap();
        ledger
            .open_account(AccountId::new("carol"), key(3).public, Amount::ZERO)
            .unwrap();
        ledger
    }

    pub(crate) fn id(name: &str) -> AccountId {
        AccountId::new(name)
    }

    #[test]
    fn open_account_twice_fails() {
        let mut l = ledger();
        assert_eq!(
            l.open_account(id("alice"), key(9).public, Amount::ZERO),
            Err(LedgerError::AccountExists(id("alice")))
        );
    }

    #[test]
    fn unknown_account_balance() {
        let l = ledger();
        assert_eq!(
            l.get_balance(&id("zed")),
            Err(LedgerError::UnknownAccount(id("zed")))
        );
    }

    #[test]
    fn transfer_moves_value_and_collects_fee() {
        let mut l = ledger();
        let before = l.total_value();
        l.transfer(&id("alice"), &id("bob"), Amount::new(30), Amount::new(2))
            .unwrap();
        assert_eq!(l.get_balance(&id("alice")).unwrap(), Amount::new(68));
        assert_eq!(l.get_balance(&id("bob")).unwrap(), Amount::new(80));
        assert_eq!(l.fee_pool(), Amount::new(2));
        assert_eq!(l.total_value(), before);
    }

    #[test]
    fn transfer_insufficient_funds_changes_nothing() {
        let mut l = ledger();
        let err = l
            .transfer(&id("bob"), &id("alice"), Amount::new(50), Amount::new(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(l.get_balance(&id("bob")).unwrap(), Amount::new(50));
        assert_eq!(l.get_balance(&id("alice")).unwrap(), Amount::new(100));
    }

    #[test]
    fn transfer_to_unknown_recipient_changes_nothing() {
        let mut l = ledger();
        assert!(l
            .transfer(&id("alice"), &id("zed"), Amount::new(1), Amount::ZERO)
            .is_err());
        assert_eq!(l.get_balance(&id("alice")).unwrap(), Amount::new(100));
    }

    #[test]
    fn advance_chain_requires_next_height() {
        let mut l = ledger();
        let h = BlockHash::new([1; 32]);
        assert_eq!(
            l.advance_chain(2, h),
            Err(LedgerError::HeightOutOfSequence {
                expected: 1,
                got: 2
            })
        );
        l.advance_chain(1, h).unwrap();
        assert_eq!(l.block_height(), 1);
        assert_eq!(l.last_block_hash(), h);
    }
}
