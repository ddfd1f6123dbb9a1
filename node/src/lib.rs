//! Strata node: orchestrates the ledger core and its settlement layers.
//!
//! The node owns one validator's state behind a single lock:
//! - Accepts transactions into sub-blocks and finalizes blocks
//! - Imports blocks finalized by other validators
//! - Persists the block log and ledger snapshots, and recovers from them
//! - Commits finalized sub-blocks to the root chain in batches
//! - Runs escrows, state channels and child-chain exits
//! - Publishes ledger events, audit records and Prometheus metrics

pub mod audit;
pub mod config;
pub mod error;
pub mod ledger_event;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod persistence;
pub mod root_chain;
pub mod shutdown;
pub mod tracing_spans;

pub use audit::{JsonlAuditSink, TracingAuditSink};
pub use config::{GenesisAccountConfig, NodeConfig};
pub use error::NodeError;
pub use ledger_event::{EventBus, LedgerEvent, Listener, ListenerError};
pub use logging::init_logging;
pub use metrics::NodeMetrics;
pub use node::{NodeServices, StrataNode, TickReport};
pub use persistence::{open_lmdb_store, BlockLog};
pub use root_chain::TracingRootChain;
pub use shutdown::ShutdownController;
