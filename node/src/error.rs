use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] strata_ledger::LedgerError),

    #[error("consensus error: {0}")]
    Consensus(#[from] strata_consensus::ConsensusError),

    #[error("child-chain error: {0}")]
    Plasma(#[from] strata_plasma::PlasmaError),

    #[error("channel error: {0}")]
    Channel(#[from] strata_channels::ChannelError),

    #[error("store error: {0}")]
    Store(#[from] strata_store::StoreError),

    #[error("storage backend error: {0}")]
    Lmdb(#[from] strata_store_lmdb::LmdbError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("persisted chain is inconsistent: {0}")]
    ChainIntegrity(String),

    #[error("node state lock is poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
