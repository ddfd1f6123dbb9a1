use strata_ledger::LedgerError;
use strata_types::{AccountId, Amount, ChannelId};
use thiserror::Error;

use crate::channel::ChannelStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("a channel needs at least two participants, got {0}")]
    TooFewParticipants(usize),

    #[error("participant {0} listed twice")]
    DuplicateParticipant(AccountId),

    #[error("channel {id} is {status:?}")]
    InvalidStatus { id: ChannelId, status: ChannelStatus },

    #[error("state is for channel {got}, expected {expected}")]
    WrongChannel { expected: ChannelId, got: ChannelId },

    #[error("state version {got} does not supersede version {current}")]
    StaleVersion { current: u64, got: u64 },

    #[error("state balances total {got}, channel collateral is {expected}")]
    BalanceMismatch { expected: Amount, got: Amount },

    #[error("state balances do not match the channel's participants")]
    ParticipantMismatch,

    #[error("{0} is not a participant")]
    UnknownParticipant(AccountId),

    #[error("state is missing a signature from {0}")]
    MissingSignature(AccountId),

    #[error("a close not signed by every participant must carry the latest co-signed state, version {latest}")]
    NotLatestState { latest: u64 },

    #[error("state carries no participant signature")]
    Unsigned,

    #[error("invalid signature from {0}")]
    InvalidSignature(AccountId),

    #[error("channel {0} has no pending close")]
    NoPendingClose(ChannelId),

    #[error("channel {0} is already closing")]
    AlreadyClosing(ChannelId),

    #[error("dispute window for channel {0} has closed")]
    DisputeWindowClosed(ChannelId),

    #[error("amount overflow")]
    Overflow,
}
