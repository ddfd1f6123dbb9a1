//! Block log persistence and startup verification.
//!
//! Finalized blocks are appended to the store by index and hash, their
//! sub-blocks are written to the sub-block log, and the tip pointer in the
//! meta store follows the last block written. A ledger snapshot is written
//! per finalized block and on shutdown.

use std::path::Path;
use std::sync::Arc;

use strata_consensus::{Block, SubBlock};
use strata_ledger::LedgerSnapshot;
use strata_store::{ChainStore, StoreError, CHAIN_TIP_KEY};
use strata_store_lmdb::{check_data_dir, check_integrity, LmdbStore, Migrator};
use strata_types::{BlockHash, SubBlockId};
use tracing::{debug, info, warn};

use crate::NodeError;

/// Encoded tip pointer: little-endian index followed by the block hash.
const TIP_LEN: usize = 8 + 32;

/// Open (or create) the LMDB store under `path`, bring its schema up to
/// date and check every database can be read.
pub fn open_lmdb_store(path: &Path, map_size: usize) -> Result<Arc<LmdbStore>, NodeError> {
    check_data_dir(path).map_err(NodeError::ChainIntegrity)?;
    let store = LmdbStore::open(path, map_size)?;
    Migrator::run(&store)?;
    let report = check_integrity(&store)?;
    if !report.is_healthy() {
        return Err(NodeError::ChainIntegrity(report.errors.join("; ")));
    }
    info!(
        path = %path.display(),
        databases = report.databases_checked,
        entries = report.total_entries,
        "block store opened"
    );
    Ok(Arc::new(store))
}

/// Typed access to the node's persisted chain.
#[derive(Clone)]
pub struct BlockLog {
    store: Arc<dyn ChainStore>,
}

impl BlockLog {
    pub fn new(store: Arc<dyn ChainStore>) -> Self {
        Self { store }
    }

    pub fn block_count(&self) -> Result<u64, NodeError> {
        Ok(self.store.block_count()?)
    }

    /// Append a block, its sub-blocks and the new tip pointer.
    ///
    /// Sub-block ids are assigned per validator, so an id may already be
    /// taken by another validator's sub-block; the first one written keeps
    /// the id.
    pub fn append(&self, block: &Block) -> Result<(), NodeError> {
        let bytes = block.to_bytes()?;
        self.store.put_block(block.index, &block.hash, &bytes)?;
        for sb in &block.sub_blocks {
            if self.store.sub_block_exists(sb.id)? {
                debug!(id = %sb.id, index = block.index, "sub-block id already logged");
                continue;
            }
            self.store.put_sub_block(sb.id, &sb.to_bytes()?)?;
        }
        self.store
            .put_meta(CHAIN_TIP_KEY, &encode_tip(block.index, &block.hash))?;
        debug!(index = block.index, hash = %block.hash, "block persisted");
        Ok(())
    }

    pub fn put_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), NodeError> {
        let bytes = snapshot.to_bytes()?;
        self.store.put_snapshot(snapshot.block_height, &bytes)?;
        Ok(())
    }

    /// The most recent snapshot, checked against its own hash.
    pub fn latest_snapshot(&self) -> Result<Option<LedgerSnapshot>, NodeError> {
        let Some((height, bytes)) = self.store.latest_snapshot()? else {
            return Ok(None);
        };
        let snapshot = LedgerSnapshot::from_bytes(&bytes)?;
        if snapshot.block_height != height || !snapshot.verify() {
            return Err(NodeError::ChainIntegrity(format!(
                "snapshot stored at height {height} fails verification"
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn tip(&self) -> Result<Option<(u64, BlockHash)>, NodeError> {
        match self.store.get_meta(CHAIN_TIP_KEY) {
            Ok(bytes) => decode_tip(&bytes).map(Some),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_block(&self, index: u64) -> Result<Option<Block>, NodeError> {
        match self.store.get_block_by_index(index) {
            Ok(bytes) => Ok(Some(Block::from_bytes(&bytes)?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_sub_block(&self, id: SubBlockId) -> Result<Option<SubBlock>, NodeError> {
        match self.store.get_sub_block(id) {
            Ok(bytes) => Ok(Some(SubBlock::from_bytes(&bytes)?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the genesis block into an empty log, or check that the logged
    /// genesis is the one this node was configured with.
    pub fn init_genesis(&self, genesis: &Block) -> Result<(), NodeError> {
        match self.get_block(0)? {
            None => {
                if self.block_count()? != 0 {
                    return Err(NodeError::ChainIntegrity(
                        "block log has blocks but no genesis".to_string(),
                    ));
                }
                self.append(genesis)?;
                info!(hash = %genesis.hash, "genesis block written");
                Ok(())
            }
            Some(stored) if stored.hash == genesis.hash => Ok(()),
            Some(stored) => Err(NodeError::ChainIntegrity(format!(
                "logged genesis {} does not match configured genesis {}",
                stored.hash, genesis.hash
            ))),
        }
    }

    /// Read every block after genesis, in order, verifying each block's
    /// hashes and its link to the one before. Any gap or mismatch is fatal.
    pub fn load_verified(&self, genesis: &Block) -> Result<Vec<Block>, NodeError> {
        let count = self.block_count()?;
        let mut blocks = Vec::with_capacity(count.saturating_sub(1) as usize);
        let mut prev_hash = genesis.hash;
        for index in 1..count {
            let block = self.get_block(index)?.ok_or_else(|| {
                NodeError::ChainIntegrity(format!("block {index} missing from a log of {count}"))
            })?;
            if block.index != index {
                return Err(NodeError::ChainIntegrity(format!(
                    "block stored at {index} claims index {}",
                    block.index
                )));
            }
            if !block.verify_root() || !block.verify_hash() {
                return Err(NodeError::ChainIntegrity(format!(
                    "block {index} hash does not match its contents"
                )));
            }
            if block.prev_hash != prev_hash {
                return Err(NodeError::ChainIntegrity(format!(
                    "block {index} does not link to block {}",
                    index - 1
                )));
            }
            prev_hash = block.hash;
            blocks.push(block);
        }

        match self.tip()? {
            Some((index, hash)) if index + 1 == count && hash == prev_hash => {}
            Some((index, _)) => {
                return Err(NodeError::ChainIntegrity(format!(
                    "tip pointer names block {index}, log ends at {}",
                    count.saturating_sub(1)
                )))
            }
            None if count == 0 => {}
            None => warn!(blocks = count, "block log has no tip pointer"),
        }
        Ok(blocks)
    }
}

fn encode_tip(index: u64, hash: &BlockHash) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(TIP_LEN);
    bytes.extend_from_slice(&index.to_le_bytes());
    bytes.extend_from_slice(hash.as_bytes());
    bytes
}

fn decode_tip(bytes: &[u8]) -> Result<(u64, BlockHash), NodeError> {
    if bytes.len() != TIP_LEN {
        return Err(NodeError::ChainIntegrity(format!(
            "tip pointer is {} bytes, expected {TIP_LEN}",
            bytes.len()
        )));
    }
    let (index, hash) = bytes.split_at(8);
    let mut index_raw = [0u8; 8];
    index_raw.copy_from_slice(index);
    let mut hash_raw = [0u8; 32];
    hash_raw.copy_from_slice(hash);
    Ok((u64::from_le_bytes(index_raw), BlockHash::new(hash_raw)))
}
