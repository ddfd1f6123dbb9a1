//! Sub-block storage trait.

use crate::StoreError;
use strata_types::SubBlockId;

/// Log of closed sub-blocks keyed by assembler id.
pub trait SubBlockStore {
    /// Store or overwrite a sub-block (its status advances after closing).
    fn put_sub_block(&self, id: SubBlockId, bytes: &[u8]) -> Result<(), StoreError>;

    fn get_sub_block(&self, id: SubBlockId) -> Result<Vec<u8>, StoreError>;

    fn sub_block_exists(&self, id: SubBlockId) -> Result<bool, StoreError>;
}
