use strata_ledger::LedgerError;
use strata_transactions::ValidationError;
use strata_types::{BlockHash, SubBlockHash, SubBlockId, SubBlockStatus, TxHash};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("transaction rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TxHash),

    #[error("pending pool is full ({capacity} transactions)")]
    PoolFull { capacity: usize },

    #[error("sub-block {id} is {status:?}, expected Closed")]
    SubBlockNotClosed { id: SubBlockId, status: SubBlockStatus },

    #[error("sub-block linkage mismatch: expected prev {expected}, got {got}")]
    LinkageMismatch {
        expected: SubBlockHash,
        got: SubBlockHash,
    },

    #[error("sub-block sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("sub-block {0} hash does not match its contents")]
    SubBlockHashMismatch(SubBlockId),

    #[error("invalid signature on transaction {0}")]
    InvalidSignature(TxHash),

    #[error("transaction {0} appears twice in the same block")]
    DuplicateInBlock(TxHash),

    #[error("transaction {0} is already finalized")]
    AlreadyFinalized(TxHash),

    #[error("block index out of sequence: expected {expected}, got {got}")]
    IndexOutOfSequence { expected: u64, got: u64 },

    #[error("block prev hash mismatch: expected {expected}, got {got}")]
    PrevHashMismatch { expected: BlockHash, got: BlockHash },

    #[error("block {index} hash does not match its contents")]
    BlockHashMismatch { index: u64 },

    #[error("block {index} sub-block root does not match its sub-blocks")]
    SubBlockRootMismatch { index: u64 },

    #[error("block carries {got} sub-blocks, expected {expected}")]
    WrongSubBlockCount { expected: usize, got: usize },

    #[error("block {0} was already rejected")]
    AlreadyRejected(BlockHash),

    #[error("block production halted: {0}")]
    ChainHalted(String),

    #[error("consistency fault at block {index}: stored hash {stored}, recomputed {recomputed}")]
    ConsistencyFault {
        index: u64,
        stored: BlockHash,
        recomputed: BlockHash,
    },

    #[error("partial blocks are not allowed by the seal policy")]
    PartialSealNotAllowed,

    #[error("serialization error: {0}")]
    Serialization(String),
}
