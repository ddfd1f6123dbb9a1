//! LMDB implementation of MetaStore.

use strata_store::{MetaStore, StoreError};

use crate::environment::LmdbStore;
use crate::LmdbError;

impl MetaStore for LmdbStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        self.meta_db
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let val = self
            .meta_db
            .get(&rtxn, key.as_bytes())
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::NotFound(format!("meta key '{}'", key)))?;
        Ok(val.to_vec())
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        self.meta_db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::tests::open_temp;
    use strata_store::{MetaStore, StoreError, CHAIN_TIP_KEY};

    #[test]
    fn put_get_delete() {
        let (_dir, store) = open_temp();
        store.put_meta(CHAIN_TIP_KEY, &[1, 2, 3]).unwrap();
        assert_eq!(store.get_meta(CHAIN_TIP_KEY).unwrap(), vec![1, 2, 3]);
        store.delete_meta(CHAIN_TIP_KEY).unwrap();
        assert!(matches!(store.get_meta(CHAIN_TIP_KEY), Err(StoreError::NotFound(_))));
    }
}
