//! Pre-built [`tracing::Span`] constructors for common node operations.
//!
//! Consistent span names and field sets make it easy to filter and
//! correlate traces across submission, sub-block close and finalization.

use tracing::{info_span, Span};

/// Span covering one transaction submission, through any close or
/// finalization it triggers.
pub fn tx_submit_span(tx_id: &str) -> Span {
    info_span!("tx_submit", tx = %tx_id)
}

/// Span covering periodic work: aged sub-block close, partial seal,
/// re-batching and settlement expiry.
pub fn tick_span(now: u64) -> Span {
    info_span!("tick", now)
}

/// Span covering the bookkeeping for one closed sub-block.
pub fn sub_block_close_span(id: &str, sequence_index: u64) -> Span {
    info_span!("sub_block_close", id = %id, sequence_index)
}

/// Span covering the import of a block proposed by another validator.
pub fn block_import_span(index: u64, hash: &str) -> Span {
    info_span!("block_import", index, hash = %hash)
}

/// Span covering the persistence and fan-out of a finalized block.
pub fn block_finalize_span(index: u64) -> Span {
    info_span!("block_finalize", index)
}

/// Span covering a settlement operation (escrow, channel, exit).
pub fn settlement_span(kind: &'static str, subject: &str) -> Span {
    info_span!("settlement", kind, subject = %subject)
}

/// Span covering startup recovery from the block log.
pub fn recovery_span(blocks: u64) -> Span {
    info_span!("recovery", blocks)
}
