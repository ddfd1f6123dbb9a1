//! Child-chain ("plasma") settlement for the Strata ledger core.
//!
//! Finalized sub-blocks are grouped into batches; each batch is committed to
//! an external root chain as a single transaction carrying a Merkle
//! commitment. Value leaves through exits, which stay open to fraud
//! challenges for `exit_challenge_window_secs`.
//!
//! Batch lifecycle: `FinalizedLocally → SubmittedToRoot → Exited | Challenged`.

pub mod adapter;
pub mod batch;
pub mod error;
pub mod exit;
pub mod root_chain;

pub use adapter::{ChildChainAdapter, PlasmaConfig, RetryReport, SubmitOutcome};
pub use batch::{compute_commitment, BatchEntry, BatchStatus, ChildChainBatch};
pub use error::{PlasmaError, RootChainError};
pub use exit::{ChallengeEvidence, Exit, ExitStatus};
pub use root_chain::{RootChain, RootChainTx};
