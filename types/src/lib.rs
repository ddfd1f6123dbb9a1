//! Fundamental types for the Strata ledger core.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! hashes, identifiers, amounts, keys, timestamps, chain parameters, and the
//! status enums of every state machine in the pipeline.

pub mod account;
pub mod amount;
pub mod hash;
pub mod ids;
pub mod keys;
pub mod network;
pub mod params;
pub mod state;
pub mod time;

pub use account::{AccountId, ValidatorId};
pub use amount::Amount;
pub use hash::{BlockHash, CommitmentHash, SubBlockHash, TxHash};
pub use ids::{BatchId, ChannelId, EscrowId, ExitId, LockId, SubBlockId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use params::{BlockSealPolicy, ChainParams};
pub use state::{BlockStatus, SubBlockStatus, TxStatus};
pub use time::{Clock, SystemClock, Timestamp};
