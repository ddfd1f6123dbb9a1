//! Strata daemon: entry point for running a Strata ledger node.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use strata_crypto::Ed25519Verifier;
use strata_node::{
    init_logging, open_lmdb_store, JsonlAuditSink, NodeConfig, NodeServices, ShutdownController,
    StrataNode, TracingAuditSink, TracingRootChain,
};
use strata_store::AuditSink;
use strata_types::{NetworkId, SystemClock};
use strata_utils::{format_duration, LogFormat};

#[derive(Parser)]
#[command(name = "strata-daemon", about = "Strata ledger node daemon")]
struct Cli {
    /// Network: "live", "test", or "dev".
    /// When a config file is provided, defaults to the file's network value.
    #[arg(long, env = "STRATA_NETWORK")]
    network: Option<String>,

    /// Data directory for the block log and snapshots.
    #[arg(long, env = "STRATA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Identity stamped on the sub-blocks this node produces.
    #[arg(long, env = "STRATA_VALIDATOR_ID")]
    validator_id: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "STRATA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "STRATA_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Append audit records to this JSONL file.
    #[arg(long, env = "STRATA_AUDIT_LOG")]
    audit_log: Option<PathBuf>,

    /// Milliseconds between node ticks.
    #[arg(long, env = "STRATA_TICK_INTERVAL_MS")]
    tick_interval_ms: Option<u64>,

    /// Print Prometheus metrics on shutdown.
    #[arg(long, env = "STRATA_ENABLE_METRICS")]
    metrics: bool,

    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the node until SIGINT or SIGTERM.
    Run,
    /// Print the effective configuration as TOML and exit.
    Config,
}

impl Cli {
    /// Layer flags and env vars over the config file (or the defaults).
    fn into_config(self) -> anyhow::Result<(NodeConfig, Command)> {
        let mut config = match &self.config {
            Some(path) => {
                let path = path.to_string_lossy();
                NodeConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config file {path}"))?
            }
            None => NodeConfig::default(),
        };

        if let Some(network) = &self.network {
            config.network = NetworkId::parse(network)
                .with_context(|| format!("unknown network '{network}'"))?;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(id) = self.validator_id {
            config.validator_id = id;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if self.audit_log.is_some() {
            config.audit_log = self.audit_log;
        }
        if let Some(ms) = self.tick_interval_ms {
            config.tick_interval_ms = ms;
        }
        config.enable_metrics |= self.metrics;
        Ok((config, self.command))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, command) = Cli::parse().into_config()?;

    if let Command::Config = command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    if let Err(e) = init_logging(&config) {
        eprintln!("logging already initialised: {e}");
    }
    run(config).await
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let started = Instant::now();
    tracing::info!(
        network = config.network.as_str(),
        validator = %config.validator_id,
        data_dir = %config.data_dir.display(),
        "starting Strata node"
    );

    let store = open_lmdb_store(&config.data_dir, config.lmdb_map_size)
        .context("opening block store")?;
    let audit: Arc<dyn AuditSink> = match &config.audit_log {
        Some(path) => Arc::new(
            JsonlAuditSink::open(path)
                .with_context(|| format!("opening audit log {}", path.display()))?,
        ),
        None => Arc::new(TracingAuditSink),
    };

    let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
    let enable_metrics = config.enable_metrics;
    let node = StrataNode::open(
        config,
        NodeServices {
            store,
            audit,
            clock: Arc::new(SystemClock),
            root_chain: Arc::new(TracingRootChain),
            verifier: Arc::new(Ed25519Verifier),
        },
    )
    .context("opening node")?;

    let shutdown = Arc::new(ShutdownController::new());
    let mut stop = shutdown.subscribe();
    let signals = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };

    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match node.tick() {
                    Ok(report) if report.blocks_finalized > 0 || report.exits_finalized > 0 || report.channels_settled > 0 => {
                        tracing::debug!(
                            blocks = report.blocks_finalized,
                            batches = report.batches_submitted,
                            exits = report.exits_finalized,
                            channels = report.channels_settled,
                            evicted = report.transactions_evicted,
                            "tick"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "tick failed"),
                }
            }
            _ = stop.recv() => break,
        }
    }

    tracing::info!("shutdown signal received, stopping node");
    node.shutdown().context("shutting down node")?;
    signals.abort();

    if enable_metrics {
        print!("{}", node.metrics().encode().context("encoding metrics")?);
    }
    tracing::info!(
        height = node.get_chain_height()?,
        uptime = %format_duration(started.elapsed().as_secs()),
        "Strata daemon exited cleanly"
    );
    Ok(())
}
