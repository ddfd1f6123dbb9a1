//! Nullable root chain — record submissions without sending them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use strata_plasma::{RootChain, RootChainError, RootChainTx};

/// A root chain that records submitted batch commitments. Can be taken
/// offline to exercise the retry path.
#[derive(Debug, Default)]
pub struct NullRootChain {
    submitted: Mutex<Vec<RootChainTx>>,
    offline: AtomicBool,
}

impl NullRootChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every accepted submission, in order (for assertions).
    pub fn submitted(&self) -> Vec<RootChainTx> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RootChain for NullRootChain {
    fn submit(&self, tx: &RootChainTx) -> Result<(), RootChainError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RootChainError::Unavailable("null root chain is offline".into()));
        }
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::{BatchId, CommitmentHash, Timestamp};

    fn tx() -> RootChainTx {
        RootChainTx {
            batch_id: BatchId::new(1),
            commitment: CommitmentHash::new([1; 32]),
            sub_block_count: 3,
            submitted_at: Timestamp::EPOCH,
        }
    }

    #[test]
    fn records_only_while_online() {
        let root = NullRootChain::new();
        root.set_offline(true);
        assert!(root.submit(&tx()).is_err());
        assert!(root.submitted().is_empty());
        root.set_offline(false);
        root.submit(&tx()).unwrap();
        assert_eq!(root.submitted(), vec![tx()]);
    }
}
