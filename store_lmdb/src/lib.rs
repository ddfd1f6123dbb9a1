//! LMDB storage backend for the Strata ledger core.
//!
//! Implements every storage trait from `strata-store` using the `heed` LMDB
//! bindings. Each logical store maps to one database within a single
//! environment; [`LmdbStore`] implements them all and so is a `ChainStore`.

pub mod block;
pub mod environment;
pub mod error;
pub mod integrity;
pub mod meta;
pub mod migration;
pub mod snapshot;
pub mod sub_block;

pub use environment::LmdbStore;
pub use error::LmdbError;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};
