use strata_transactions::ValidationError;
use strata_types::{AccountId, Amount, EscrowId, LockId, TxHash, TxStatus, ValidatorId};
use thiserror::Error;

use crate::escrow::EscrowStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown account {0}")]
    UnknownAccount(AccountId),

    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("insufficient funds in {account}: need {needed}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        needed: Amount,
        available: Amount,
    },

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("balance arithmetic overflow")]
    Overflow,

    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TxHash),

    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHash),

    #[error("transaction {id} cannot be reversed in status {status:?}")]
    NotReversible { id: TxHash, status: TxStatus },

    #[error("transaction {id} is {status:?}, expected {expected:?}")]
    UnexpectedTxStatus {
        id: TxHash,
        status: TxStatus,
        expected: TxStatus,
    },

    #[error("fee shares {requested} exceed remaining collected fee {remaining} for {id}")]
    FeeSharesExceedCollected {
        id: TxHash,
        requested: Amount,
        remaining: Amount,
    },

    #[error("stake of {validator} would go negative ({current} + {delta})")]
    NegativeStake {
        validator: ValidatorId,
        current: Amount,
        delta: i128,
    },

    #[error("unknown fund lock {0}")]
    UnknownLock(LockId),

    #[error("unknown escrow {0}")]
    UnknownEscrow(EscrowId),

    #[error("escrow {id} is {status:?}, operation requires {required:?}")]
    EscrowState {
        id: EscrowId,
        status: EscrowStatus,
        required: EscrowStatus,
    },

    #[error("chain height out of sequence: expected {expected}, got {got}")]
    HeightOutOfSequence { expected: u64, got: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),
}
