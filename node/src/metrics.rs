//! Prometheus metrics for the Strata node.
//!
//! Counters, gauges and a histogram covering transaction intake, sub-block
//! and block production, and root-chain submission. [`NodeMetrics`] owns a
//! dedicated [`Registry`] that can be encoded into the Prometheus text
//! exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub transactions_accepted: IntCounter,
    pub transactions_rejected: IntCounter,
    pub sub_blocks_closed: IntCounter,
    pub sub_blocks_rejected: IntCounter,
    pub blocks_finalized: IntCounter,
    /// Foreign blocks rejected on import plus local blocks aborted.
    pub blocks_rejected: IntCounter,
    pub root_submissions_failed: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub chain_height: IntGauge,
    pub pending_pool_size: IntGauge,
    /// Sub-blocks accumulated towards the next block.
    pub accumulator_size: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Seconds from the first accumulated sub-block closing to the block
    /// being finalized.
    pub block_finalization_latency_secs: Histogram,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
        };
        let gauge = |name: &str, help: &str| {
            register_int_gauge_with_registry!(Opts::new(name, help), registry)
        };

        let transactions_accepted =
            counter("strata_transactions_accepted_total", "Transactions accepted into a sub-block")?;
        let transactions_rejected =
            counter("strata_transactions_rejected_total", "Transactions rejected on submission")?;
        let sub_blocks_closed = counter("strata_sub_blocks_closed_total", "Sub-blocks closed")?;
        let sub_blocks_rejected =
            counter("strata_sub_blocks_rejected_total", "Sub-blocks rejected on close")?;
        let blocks_finalized =
            counter("strata_blocks_finalized_total", "Blocks finalized or imported")?;
        let blocks_rejected =
            counter("strata_blocks_rejected_total", "Blocks rejected on import or aborted")?;
        let root_submissions_failed = counter(
            "strata_root_submissions_failed_total",
            "Root-chain submissions that failed",
        )?;

        let chain_height = gauge("strata_chain_height", "Index of the last finalized block")?;
        let pending_pool_size =
            gauge("strata_pending_pool_size", "Transactions waiting to be re-batched")?;
        let accumulator_size =
            gauge("strata_accumulator_size", "Sub-blocks accumulated towards the next block")?;

        // Exponential buckets covering 0.5 s to ~2.3 h.
        let block_finalization_latency_secs = register_histogram_with_registry!(
            HistogramOpts::new(
                "strata_block_finalization_latency_secs",
                "Seconds from first accumulated sub-block to block finalization"
            )
            .buckets(prometheus::exponential_buckets(0.5, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            transactions_accepted,
            transactions_rejected,
            sub_blocks_closed,
            sub_blocks_rejected,
            blocks_finalized,
            blocks_rejected,
            root_submissions_failed,
            chain_height,
            pending_pool_size,
            accumulator_size,
            block_finalization_latency_secs,
        })
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_metrics() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.blocks_finalized.inc();
        metrics.chain_height.set(7);
        let text = metrics.encode().unwrap();
        assert!(text.contains("strata_blocks_finalized_total 1"));
        assert!(text.contains("strata_chain_height 7"));
    }

    #[test]
    fn each_instance_has_its_own_registry() {
        let a = NodeMetrics::new().unwrap();
        let b = NodeMetrics::new().unwrap();
        a.transactions_accepted.inc();
        assert_eq!(b.transactions_accepted.get(), 0);
    }
}
