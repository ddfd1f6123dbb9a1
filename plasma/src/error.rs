use strata_ledger::LedgerError;
use strata_types::{BatchId, ExitId};
use thiserror::Error;

use crate::batch::BatchStatus;
use crate::exit::ExitStatus;

/// Failure reported by a root-chain transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RootChainError {
    #[error("root chain unavailable: {0}")]
    Unavailable(String),

    #[error("root chain refused the transaction: {0}")]
    Refused(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlasmaError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("unknown batch {0}")]
    UnknownBatch(BatchId),

    #[error("unknown exit {0}")]
    UnknownExit(ExitId),

    #[error("batch {id} is {status:?}, expected {expected}")]
    BatchState {
        id: BatchId,
        status: BatchStatus,
        expected: &'static str,
    },

    #[error("exit {id} is {status:?}, expected Pending")]
    ExitNotPending { id: ExitId, status: ExitStatus },

    #[error("challenge window for exit {0} has closed")]
    ChallengeWindowClosed(ExitId),

    #[error("exit amount must be greater than zero")]
    ZeroAmount,

    #[error("nothing to batch")]
    EmptyBatch,

    #[error("invalid challenge evidence: {0}")]
    InvalidEvidence(&'static str),
}
