//! Accounts and fund locks.

use serde::{Deserialize, Serialize};
use strata_types::{AccountId, Amount, LockId, PublicKey, Timestamp};

/// A ledger account.
///
/// `balance` is the total owned; `locked` is the part held by active fund
/// locks and cannot be spent. `locked <= balance` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub public_key: PublicKey,
    pub balance: Amount,
    pub locked: Amount,
}

impl Account {
    pub fn new(id: AccountId, public_key: PublicKey, balance: Amount) -> Self {
        Self {
            id,
            public_key,
            balance,
            locked: Amount::ZERO,
        }
    }

    pub fn available(&self) -> Amount {
        self.balance.saturating_sub(self.locked)
    }
}

/// Why value is locked.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockPurpose {
    Escrow,
    ChannelCollateral,
    ChildChainExit,
}

/// Value held out of an account's available balance until released
/// (returned) or consumed (removed from the ledger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundLock {
    pub id: LockId,
    pub account: AccountId,
    pub amount: Amount,
    pub purpose: LockPurpose,
    pub created_at: Timestamp,
}
