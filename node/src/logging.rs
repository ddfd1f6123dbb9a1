//! Structured logging initialisation for the Strata node.

use strata_utils::init_tracing;

use crate::config::NodeConfig;

/// Initialise the global tracing subscriber from the node's config.
///
/// `RUST_LOG` overrides `log_level` when set. Returns an error if a global
/// subscriber has already been installed.
pub fn init_logging(config: &NodeConfig) -> Result<(), String> {
    init_tracing(config.log_format, &config.log_level)
}
