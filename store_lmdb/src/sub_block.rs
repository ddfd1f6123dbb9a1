//! LMDB implementation of SubBlockStore.

use strata_store::{StoreError, SubBlockStore};
use strata_types::SubBlockId;

use crate::environment::{u64_key, LmdbStore};
use crate::LmdbError;

impl SubBlockStore for LmdbStore {
    fn put_sub_block(&self, id: SubBlockId, bytes: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        self.sub_blocks_db
            .put(&mut wtxn, &u64_key(id.raw()), bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_sub_block(&self, id: SubBlockId) -> Result<Vec<u8>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let val = self
            .sub_blocks_db
            .get(&rtxn, &u64_key(id.raw()))
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::NotFound(format!("sub-block {id}")))?;
        Ok(val.to_vec())
    }

    fn sub_block_exists(&self, id: SubBlockId) -> Result<bool, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let found = self
            .sub_blocks_db
            .get(&rtxn, &u64_key(id.raw()))
            .map_err(LmdbError::from)?
            .is_some();
        Ok(found)
    }
}
