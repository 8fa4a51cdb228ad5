//! Rescache Node - ledger block cache daemon.

use anyhow::Context;
use clap::Parser;
use rescache_node::config::{NodeConfig, Overrides, StorageBackend};
use rescache_node::observability::{init_logging, LogFormat};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Rescache Node - mirrors a ResilientDB ledger and serves it to dashboards
#[derive(Parser, Debug)]
#[command(name = "rescache-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (optional)
    #[arg(short, long, default_value = "rescache.yaml")]
    config: PathBuf,

    /// Ledger base URL, e.g. resilientdb://localhost:18000
    #[arg(long)]
    base_url: Option<String>,

    /// API listen address
    #[arg(long)]
    api_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Block store backend
    #[arg(long, value_enum)]
    storage: Option<StorageBackend>,

    /// Data directory for the RocksDB backend
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            api_addr: self.api_addr,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
            storage: self.storage,
            data_dir: self.data_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = NodeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?
        .apply(args.overrides());

    init_logging(&config.log.level, config.log.format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting rescache node");
    tracing::info!(
        base_url = %config.ledger.base_url,
        api_addr = %config.api.listen_addr,
        storage = ?config.storage.backend,
        batch_size = config.sync.batch_size,
        concurrency = config.sync.concurrency,
        "Node configuration"
    );

    rescache_node::run(config, rescache_node::shutdown_signal())
        .await
        .context("node failed")
}
