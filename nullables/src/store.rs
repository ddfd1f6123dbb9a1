//! Nullable store — thread-safe in-memory storage for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use strata_store::{BlockStore, MetaStore, SnapshotStore, StoreError, SubBlockStore};
use strata_types::{BlockHash, SubBlockId};

#[derive(Default)]
struct Inner {
    blocks: BTreeMap<u64, Vec<u8>>,
    block_index: HashMap<BlockHash, u64>,
    sub_blocks: HashMap<SubBlockId, Vec<u8>>,
    snapshots: BTreeMap<u64, Vec<u8>>,
    meta: HashMap<String, Vec<u8>>,
}

/// An in-memory block, sub-block, snapshot and metadata store.
/// Thread-safe so a node and the test can share it through an `Arc`.
#[derive(Default)]
pub struct NullStore {
    inner: Mutex<Inner>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite a stored block's bytes in place (for corruption tests).
    pub fn tamper_block(&self, index: u64, bytes: Vec<u8>) {
        self.inner().blocks.insert(index, bytes);
    }

    /// Forget snapshots taken above `height`, as if the process died before
    /// writing them.
    pub fn drop_snapshots_above(&self, height: u64) {
        self.inner().snapshots.retain(|h, _| *h <= height);
    }
}

impl BlockStore for NullStore {
    fn put_block(&self, index: u64, hash: &BlockHash, block_bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if inner.blocks.contains_key(&index) {
            return Err(StoreError::Duplicate(format!("block {index}")));
        }
        inner.blocks.insert(index, block_bytes.to_vec());
        inner.block_index.insert(*hash, index);
        Ok(())
    }

    fn get_block_by_index(&self, index: u64) -> Result<Vec<u8>, StoreError> {
        self.inner()
            .blocks
            .get(&index)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("block {index}")))
    }

    fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner();
        inner
            .block_index
            .get(hash)
            .and_then(|index| inner.blocks.get(index))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("block {hash}")))
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner().blocks.len() as u64)
    }
}

impl SubBlockStore for NullStore {
    fn put_sub_block(&self, id: SubBlockId, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner().sub_blocks.insert(id, bytes.to_vec());
        Ok(())
    }

    fn get_sub_block(&self, id: SubBlockId) -> Result<Vec<u8>, StoreError> {
        self.inner()
            .sub_blocks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("sub-block {id}")))
    }

    fn sub_block_exists(&self, id: SubBlockId) -> Result<bool, StoreError> {
        Ok(self.inner().sub_blocks.contains_key(&id))
    }
}

impl SnapshotStore for NullStore {
    fn put_snapshot(&self, height: u64, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner().snapshots.insert(height, bytes.to_vec());
        Ok(())
    }

    fn get_snapshot(&self, height: u64) -> Result<Vec<u8>, StoreError> {
        self.inner()
            .snapshots
            .get(&height)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("snapshot {height}")))
    }

    fn latest_snapshot(&self) -> Result<Option<(u64, Vec<u8>)>, StoreError> {
        Ok(self
            .inner()
            .snapshots
            .last_key_value()
            .map(|(height, bytes)| (*height, bytes.clone())))
    }
}

impl MetaStore for NullStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner().meta.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner()
            .meta
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("meta {key}")))
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.inner().meta.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_append_only_by_index() {
        let store = NullStore::new();
        let hash = BlockHash::new([1; 32]);
        store.put_block(0, &hash, b"genesis").unwrap();
        assert!(matches!(
            store.put_block(0, &BlockHash::new([2; 32]), b"other"),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.get_block_by_hash(&hash).unwrap(), b"genesis");
        assert_eq!(store.block_count().unwrap(), 1);
        assert!(matches!(store.get_block_by_index(1), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn latest_snapshot_is_highest() {
        let store = NullStore::new();
        assert_eq!(store.latest_snapshot().unwrap(), None);
        store.put_snapshot(5, b"five").unwrap();
        store.put_snapshot(2, b"two").unwrap();
        assert_eq!(store.latest_snapshot().unwrap(), Some((5, b"five".to_vec())));
    }

    #[test]
    fn schema_version_round_trips_through_meta() {
        let store = NullStore::new();
        store.set_schema_version(3).unwrap();
        assert_eq!(store.get_schema_version().unwrap(), 3);
        store.delete_meta(strata_store::SCHEMA_VERSION_KEY).unwrap();
        assert!(store.get_meta(strata_store::SCHEMA_VERSION_KEY).is_err());
    }
}
