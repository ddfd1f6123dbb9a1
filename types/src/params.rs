//! Chain parameters — batching thresholds, time bounds, and settlement windows.

use crate::network::NetworkId;
use serde::{Deserialize, Serialize};

/// Policy for sealing a block with fewer sub-blocks than the batch threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BlockSealPolicy {
    /// A block is built only from exactly `sub_blocks_per_block` sub-blocks.
    /// Anything left in the accumulator at shutdown stays there.
    Strict,
    /// A non-empty accumulator whose oldest sub-block has waited
    /// `max_wait_secs` is sealed into a partial block. Shutdown also seals.
    TimeBoxedPartial { max_wait_secs: u64 },
}

impl BlockSealPolicy {
    pub fn allows_partial(&self) -> bool {
        matches!(self, Self::TimeBoxedPartial { .. })
    }
}

/// Every tunable of the ledger core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    // ── Sub-block assembly ───────────────────────────────────────────────
    /// Transactions per sub-block before it closes.
    pub max_sub_block_txs: usize,

    /// Age (seconds) after which a non-empty open sub-block closes on the next tick.
    pub sub_block_max_age_secs: u64,

    /// Maximum transactions parked in the pending pool awaiting re-batching.
    pub pending_pool_capacity: usize,

    // ── Block finalization ───────────────────────────────────────────────
    /// Sub-blocks aggregated into one block.
    pub sub_blocks_per_block: usize,

    /// Partial-block policy.
    pub seal_policy: BlockSealPolicy,

    // ── Transaction freshness & cache retention ──────────────────────────
    /// Transactions older than `now - staleness_window_secs` are rejected.
    pub staleness_window_secs: u64,

    /// Extra time a finalized transaction stays in the duplicate cache past
    /// the staleness window.
    pub tx_retention_secs: u64,

    /// Maximum cache entries evicted per compaction pass.
    pub compaction_batch_size: usize,

    // ── Child chain ──────────────────────────────────────────────────────
    /// Finalized sub-blocks committed per child-chain batch.
    pub plasma_batch_size: usize,

    /// Window (seconds) during which an exit can be challenged.
    pub exit_challenge_window_secs: u64,

    /// Attempts at delivering a root-chain transaction before giving up.
    pub root_submit_max_retries: u32,

    // ── State channels ───────────────────────────────────────────────────
    /// Window (seconds) during which a unilateral channel close can be disputed.
    pub channel_dispute_window_secs: u64,
}

impl ChainParams {
    /// Production defaults.
    pub fn live_defaults() -> Self {
        Self {
            max_sub_block_txs: 100,
            sub_block_max_age_secs: 2,
            pending_pool_capacity: 100_000,

            sub_blocks_per_block: 1000,
            seal_policy: BlockSealPolicy::Strict,

            staleness_window_secs: 300,
            tx_retention_secs: 3600,
            compaction_batch_size: 10_000,

            plasma_batch_size: 1000,
            exit_challenge_window_secs: 7 * 24 * 3600, // 1 week
            root_submit_max_retries: 5,

            channel_dispute_window_secs: 24 * 3600, // 1 day
        }
    }

    /// Defaults for a given network. Test and dev networks keep the
    /// 1000-sub-block batch but shorten every window.
    pub fn for_network(network: NetworkId) -> Self {
        let mut params = Self::live_defaults();
        match network {
            NetworkId::Live => {}
            NetworkId::Test => {
                params.exit_challenge_window_secs = 3600;
                params.channel_dispute_window_secs = 600;
            }
            NetworkId::Dev => {
                params.max_sub_block_txs = 10;
                params.plasma_batch_size = 10;
                params.exit_challenge_window_secs = 60;
                params.channel_dispute_window_secs = 30;
                params.seal_policy = BlockSealPolicy::TimeBoxedPartial { max_wait_secs: 30 };
            }
        }
        params
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::live_defaults()
    }
}
