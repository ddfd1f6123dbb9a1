//! Consensus: sub-block assembly, block finalization and chain consistency.
//!
//! Transactions are applied to the ledger as they are accepted into the open
//! sub-block, so balances are visible immediately. Sub-blocks are hash-linked
//! in a single global sequence; a fixed number of consecutive sub-blocks
//! forms a block, and a block is final once appended to the chain.
//!
//! ## Module overview
//!
//! - [`sub_block`] — Sub-block structure and hashing.
//! - [`pool`] — Pending pool for returned transactions.
//! - [`assembler`] — Accepts transactions, closes and re-validates sub-blocks.
//! - [`block`] — Block structure, genesis block and hashing.
//! - [`chain`] — Finalized blocks, halt state and tip re-verification.
//! - [`finalizer`] — Accumulates sub-blocks and finalizes or aborts blocks.
//! - [`validation`] — Validation of blocks from other validators.
//! - [`engine`] — Ties the above together for one validator.
//! - [`error`] — Consensus error types.

pub mod assembler;
pub mod block;
pub mod chain;
pub mod engine;
pub mod error;
pub mod finalizer;
pub mod pool;
pub mod sub_block;
pub mod validation;
pub mod verify;

pub use assembler::{CloseOutcome, RebatchOutcome, SubBlockAssembler};
pub use block::Block;
pub use chain::Chain;
pub use engine::{ChainEngine, EngineEvent, ReplayMode};
pub use error::ConsensusError;
pub use finalizer::{AbortedBlock, AddOutcome, BlockFinalizer};
pub use pool::PendingPool;
pub use sub_block::SubBlock;
pub use validation::validate_block;
pub use verify::verify_signatures;
