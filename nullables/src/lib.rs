//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the core (clock, storage, audit sink,
//! root chain) is abstracted behind a trait. This crate provides
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod audit;
pub mod clock;
pub mod root_chain;
pub mod store;

pub use audit::NullAuditSink;
pub use clock::NullClock;
pub use root_chain::NullRootChain;
pub use store::NullStore;
