//! Root-chain transport used when no external anchor is wired in.
//!
//! Each submission is logged under the `strata::root_chain` target so a
//! relayer tailing the log can anchor commitments and report receipts back
//! through `StrataNode::acknowledge_batch`.

use strata_plasma::{RootChain, RootChainError, RootChainTx};
use tracing::info;

#[derive(Debug, Default)]
pub struct TracingRootChain;

impl RootChain for TracingRootChain {
    fn submit(&self, tx: &RootChainTx) -> Result<(), RootChainError> {
        info!(
            target: "strata::root_chain",
            batch = %tx.batch_id,
            commitment = %tx.commitment,
            sub_blocks = tx.sub_block_count,
            submitted_at = %tx.submitted_at,
            "batch commitment submitted"
        );
        Ok(())
    }
}
