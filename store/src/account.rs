//! Account snapshot storage trait.

use crate::StoreError;

/// Hash-verified account snapshots, one per finalized block height.
pub trait SnapshotStore {
    fn put_snapshot(&self, height: u64, bytes: &[u8]) -> Result<(), StoreError>;

    fn get_snapshot(&self, height: u64) -> Result<Vec<u8>, StoreError>;

    /// The snapshot at the greatest stored height, if any.
    fn latest_snapshot(&self) -> Result<Option<(u64, Vec<u8>)>, StoreError>;
}
