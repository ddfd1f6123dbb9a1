//! Metadata storage trait.

use crate::StoreError;

pub const SCHEMA_VERSION_KEY: &str = "schema_version";
pub const CHAIN_TIP_KEY: &str = "chain_tip";

/// Generic key-value store for chain metadata (tip pointer, schema version).
pub trait MetaStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn get_meta(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn delete_meta(&self, key: &str) -> Result<(), StoreError>;

    fn get_schema_version(&self) -> Result<u32, StoreError> {
        let bytes = self.get_meta(SCHEMA_VERSION_KEY)?;
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Corruption("schema version is not 4 bytes".into()))?;
        Ok(u32::from_le_bytes(raw))
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        self.put_meta(SCHEMA_VERSION_KEY, &version.to_le_bytes())
    }
}
