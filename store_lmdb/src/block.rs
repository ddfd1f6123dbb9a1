//! LMDB implementation of BlockStore.

use strata_store::{BlockStore, StoreError};
use strata_types::BlockHash;

use crate::environment::{decode_u64, u64_key, LmdbStore};
use crate::LmdbError;

impl BlockStore for LmdbStore {
    fn put_block(&self, index: u64, hash: &BlockHash, block_bytes: &[u8]) -> Result<(), StoreError> {
        let key = u64_key(index);
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        if self
            .blocks_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(LmdbError::Duplicate(format!("block {index}")).into());
        }
        self.blocks_db
            .put(&mut wtxn, &key, block_bytes)
            .map_err(LmdbError::from)?;
        self.block_index_db
            .put(&mut wtxn, hash.as_bytes(), &key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_block_by_index(&self, index: u64) -> Result<Vec<u8>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let val = self
            .blocks_db
            .get(&rtxn, &u64_key(index))
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::NotFound(format!("block {index}")))?;
        Ok(val.to_vec())
    }

    fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Vec<u8>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let key = self
            .block_index_db
            .get(&rtxn, hash.as_bytes())
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::NotFound(format!("block {hash}")))?;
        let index = decode_u64(key, "block index")?;
        let val = self
            .blocks_db
            .get(&rtxn, &u64_key(index))
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::Corruption(format!("hash index points at missing block {index}")))?;
        Ok(val.to_vec())
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        Ok(self.blocks_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
