use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_types::{AccountId, Amount, ChannelId, LockId, Timestamp};

use crate::state::ChannelState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelStatus {
    Open,
    Active,
    Disputed,
    Closed,
}

/// Collateral one participant locked into the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collateral {
    pub amount: Amount,
    /// Absent when the participant joined with nothing at stake.
    pub lock: Option<LockId>,
}

/// A unilateral close waiting out the dispute window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingClose {
    pub state: ChannelState,
    pub requested_at: Timestamp,
    pub closes_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChannel {
    pub id: ChannelId,
    pub participants: Vec<AccountId>,
    pub collateral: BTreeMap<AccountId, Collateral>,
    pub total_collateral: Amount,
    /// Highest version observed through updates, closes or disputes.
    pub state_version: u64,
    pub latest: ChannelState,
    pub status: ChannelStatus,
    pub opened_at: Timestamp,
    pub pending_close: Option<PendingClose>,
    pub closed_at: Option<Timestamp>,
}

impl StateChannel {
    pub fn is_participant(&self, account: &AccountId) -> bool {
        self.collateral.contains_key(account)
    }

    pub fn is_closing(&self) -> bool {
        self.pending_close.is_some()
    }
}

/// Net result of settling a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub channel: ChannelId,
    pub version: u64,
    pub balances: BTreeMap<AccountId, Amount>,
    /// Ledger transfers made to reconcile balances: `(from, to, amount)`.
    pub transfers: Vec<(AccountId, AccountId, Amount)>,
}
