//! LMDB environment setup.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::info;

use crate::LmdbError;

pub(crate) const BLOCKS_DB: &str = "blocks";
pub(crate) const BLOCK_INDEX_DB: &str = "block_index";
pub(crate) const SUB_BLOCKS_DB: &str = "sub_blocks";
pub(crate) const SNAPSHOTS_DB: &str = "snapshots";
pub(crate) const META_DB: &str = "meta";

pub(crate) const DATABASES: &[&str] =
    &[BLOCKS_DB, BLOCK_INDEX_DB, SUB_BLOCKS_DB, SNAPSHOTS_DB, META_DB];

/// Default map size: 1 GiB. LMDB only reserves address space.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// The LMDB environment and all database handles.
///
/// Integer keys (block index, sub-block id, snapshot height) are stored
/// big-endian so LMDB's byte order matches numeric order.
pub struct LmdbStore {
    pub(crate) env: Env,
    pub(crate) blocks_db: Database<Bytes, Bytes>,
    pub(crate) block_index_db: Database<Bytes, Bytes>,
    pub(crate) sub_blocks_db: Database<Bytes, Bytes>,
    pub(crate) snapshots_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl LmdbStore {
    /// Open or create an LMDB environment at the given directory.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the node is the only process opening this environment and
        // it opens it once, which is the condition heed asks callers to uphold.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(DATABASES.len() as u32)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let blocks_db = env.create_database(&mut wtxn, Some(BLOCKS_DB))?;
        let block_index_db = env.create_database(&mut wtxn, Some(BLOCK_INDEX_DB))?;
        let sub_blocks_db = env.create_database(&mut wtxn, Some(SUB_BLOCKS_DB))?;
        let snapshots_db = env.create_database(&mut wtxn, Some(SNAPSHOTS_DB))?;
        let meta_db = env.create_database(&mut wtxn, Some(META_DB))?;
        wtxn.commit()?;

        info!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(Self {
            env,
            blocks_db,
            block_index_db,
            sub_blocks_db,
            snapshots_db,
            meta_db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn env(&self) -> &Env {
        &self.env
    }
}

pub(crate) fn u64_key(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

pub(crate) fn decode_u64(bytes: &[u8], what: &str) -> Result<u64, LmdbError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Corruption(format!("{what} key is not 8 bytes")))?;
    Ok(u64::from_be_bytes(raw))
}
