//! Ledger state for the Strata core.
//!
//! One owned [`LedgerState`] holds the account table, the transaction
//! duplicate cache, chain metadata, validator stakes, the reward and
//! punishment audit ledgers, fund locks and escrows. Every consumer receives
//! it as `&mut LedgerState`; there is no global state.

pub mod account;
pub mod apply;
pub mod compaction;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod genesis;
pub mod locks;
pub mod snapshot;
pub mod stakes;
pub mod state;

pub use account::{Account, FundLock, LockPurpose};
pub use compaction::CompactionResult;
pub use error::LedgerError;
pub use escrow::{Escrow, EscrowResolution, EscrowStatus};
pub use genesis::{genesis_timestamp, GenesisAccount, GenesisConfig};
pub use snapshot::{AccountSnapshot, FeeHoldings, LedgerSnapshot, SNAPSHOT_VERSION};
pub use stakes::{PunishmentEntry, RewardEntry};
pub use state::{ChainMeta, LedgerConfig, LedgerState, TxRecord};
