//! State channels for the Strata ledger core.
//!
//! Participants lock collateral on the ledger, exchange co-signed balance
//! states off-ledger, and settle the final split back through ordinary
//! transfers. The highest co-signed version always wins a dispute.

pub mod channel;
pub mod error;
pub mod manager;
pub mod state;

pub use channel::{ChannelStatus, Collateral, PendingClose, Settlement, StateChannel};
pub use error::ChannelError;
pub use manager::{ChannelConfig, ChannelManager, CloseOutcome};
pub use state::{ChannelState, SignedState};
