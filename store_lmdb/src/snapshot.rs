//! LMDB implementation of SnapshotStore.

use strata_store::{SnapshotStore, StoreError};

use crate::environment::{decode_u64, u64_key, LmdbStore};
use crate::LmdbError;

impl SnapshotStore for LmdbStore {
    fn put_snapshot(&self, height: u64, bytes: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        self.snapshots_db
            .put(&mut wtxn, &u64_key(height), bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_snapshot(&self, height: u64) -> Result<Vec<u8>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let val = self
            .snapshots_db
            .get(&rtxn, &u64_key(height))
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::NotFound(format!("snapshot at height {height}")))?;
        Ok(val.to_vec())
    }

    fn latest_snapshot(&self) -> Result<Option<(u64, Vec<u8>)>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        match self.snapshots_db.last(&rtxn).map_err(LmdbError::from)? {
            Some((key, val)) => Ok(Some((decode_u64(key, "snapshot height")?, val.to_vec()))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::tests::open_temp;
    use strata_store::SnapshotStore;

    #[test]
    fn latest_is_highest_height() {
        let (_dir, store) = open_temp();
        assert_eq!(store.latest_snapshot().unwrap(), None);
        store.put_snapshot(9, b"nine").unwrap();
        store.put_snapshot(300, b"three hundred").unwrap();
        store.put_snapshot(12, b"twelve").unwrap();
        assert_eq!(
            store.latest_snapshot().unwrap(),
            Some((300, b"three hundred".to_vec()))
        );
        assert_eq!(store.get_snapshot(12).unwrap(), b"twelve");
    }
}
