//! Abstract storage traits for the Strata ledger core.
//!
//! Every storage backend (file-backed, in-memory for testing) implements
//! these traits. Records are opaque bytes; callers choose the encoding. The
//! rest of the codebase depends only on the traits.

pub mod account;
pub mod audit;
pub mod block;
pub mod error;
pub mod meta;
pub mod sub_block;

pub use account::SnapshotStore;
pub use audit::{AuditKind, AuditRecord, AuditSink};
pub use block::BlockStore;
pub use error::StoreError;
pub use meta::{MetaStore, CHAIN_TIP_KEY, SCHEMA_VERSION_KEY};
pub use sub_block::SubBlockStore;

/// Everything the node persists, behind one handle.
pub trait ChainStore: BlockStore + SubBlockStore + SnapshotStore + MetaStore + Send + Sync {}

impl<T> ChainStore for T where T: BlockStore + SubBlockStore + SnapshotStore + MetaStore + Send + Sync
{}
