use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("cannot build a merkle tree with no leaves")]
    EmptyMerkleTree,

    #[error("leaf index {index} out of range for tree of {size} leaves")]
    InvalidLeafIndex { index: usize, size: usize },
}
