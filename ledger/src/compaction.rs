//! Transaction-cache compaction.
//!
//! A finalized transaction only needs to stay in the duplicate cache while
//! a resubmission of it could still pass the freshness check. Once its
//! timestamp is older than the staleness window plus the retention margin,
//! any replay is rejected as stale, so the record can be evicted. Each call
//! evicts at most `compaction_batch_size` records to bound the work done
//! under the node lock.

use strata_types::{Timestamp, TxHash};
use tracing::debug;

use crate::state::LedgerState;

/// Result of one compaction pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactionResult {
    pub evicted: usize,
    /// Cache size after the pass.
    pub remaining: usize,
}

impl LedgerState {
    /// Ids that are safe to evict at `now`, oldest first, bounded by the batch size.
    pub fn find_compactable(&self, now: Timestamp) -> Vec<TxHash> {
        let horizon = self
            .config
            .staleness_window_secs
            .saturating_add(self.config.tx_retention_secs);

        let mut candidates: Vec<(Timestamp, TxHash)> = self
            .tx_cache
            .iter()
            .filter(|(_, r)| r.tx.status.is_final() && r.tx.timestamp.has_expired(horizon, now))
            .map(|(id, r)| (r.tx.timestamp, *id))
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .take(self.config.compaction_batch_size)
            .map(|(_, id)| id)
            .collect()
    }

    pub fn compact_tx_cache(&mut self, now: Timestamp) -> CompactionResult {
        let evictable = self.find_compactable(now);
        for id in &evictable {
            self.tx_cache.remove(id);
        }
        let result = CompactionResult {
            evicted: evictable.len(),
            remaining: self.tx_cache.len(),
        };
        if result.evicted > 0 {
            debug!(evicted = result.evicted, remaining = result.remaining, "tx cache compacted");
        }
        result
    }
}
