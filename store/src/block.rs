//! Block storage trait.

use crate::StoreError;
use strata_types::BlockHash;

/// Append-only log of finalized blocks (serialized bytes), addressable by
/// index and by hash.
pub trait BlockStore {
    /// Store a block. Fails with `Duplicate` if the index is already taken.
    fn put_block(&self, index: u64, hash: &BlockHash, block_bytes: &[u8])
        -> Result<(), StoreError>;

    fn get_block_by_index(&self, index: u64) -> Result<Vec<u8>, StoreError>;

    fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Vec<u8>, StoreError>;

    /// Number of stored blocks, genesis included.
    fn block_count(&self) -> Result<u64, StoreError>;
}
