use strata_types::{AccountId, Amount, Timestamp, TxHash};
use thiserror::Error;

/// Reasons a transaction is refused before it can enter a sub-block.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("transaction id {actual} does not match canonical hash {expected}")]
    IdMismatch { expected: TxHash, actual: TxHash },

    #[error("timestamp {timestamp} outside [now - {window_secs}s, now] at {now}")]
    StaleTimestamp {
        timestamp: Timestamp,
        now: Timestamp,
        window_secs: u64,
    },

    #[error("insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("invalid signature on transaction {0}")]
    InvalidSignature(TxHash),

    #[error("unknown account {0}")]
    UnknownAccount(AccountId),

    #[error("amount plus fee overflows")]
    AmountOverflow,
}
