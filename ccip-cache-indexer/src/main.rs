//! Cross-chain messaging indexer CLI.
//!
//! Periodically scans the protocol contract on every configured chain,
//! classifies the emitting transactions and caches them as Parquet files.
//!
//! # Usage
//!
//! ```bash
//! # Index every configured chain every `poll_period_secs`
//! ccip-cache-indexer run --config config.toml
//!
//! # Run a single cycle for one chain through a custom RPC endpoint
//! ccip-cache-indexer sync --chain 137 --rpc https://my-rpc.example.com
//!
//! # Print the classified transactions of a wallet as JSON
//! ccip-cache-indexer history --wallet 0x...
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use ccip_cache::{ChainId, TxInfoRecord, WalletAddress};
use ccip_cache_indexer::chains;
use ccip_cache_indexer::config::{ChainSettings, Config};
use ccip_cache_indexer::ingest::{ChainHandle, Ingestor};
use ccip_cache_indexer::parquet::ParquetStore;
use ccip_cache_indexer::resilience::Resilience;
use ccip_cache_indexer::rpc::{AlloyClient, ChainSpec};
use ccip_cache_indexer::scanner::Scanner;
use ccip_cache_indexer::store::Store;
use clap::{Parser, Subcommand};
use tokio::sync::watch;

/// Cross-chain messaging transaction indexer.
#[derive(Debug, Parser)]
#[command(name = "ccip-cache-indexer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Index every configured chain periodically until Ctrl-C.
    Run {
        /// Path to the TOML configuration.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Run exactly one ingestion cycle.
    Sync {
        /// Path to the TOML configuration.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// Sync only this configured chain.
        #[arg(long)]
        chain: Option<ChainId>,

        /// Override the RPC endpoint of the target chain.
        /// Only valid when `--chain` is also specified.
        #[arg(long, requires = "chain")]
        rpc: Option<String>,
    },

    /// Print the stored classifications of a wallet's transactions as JSON.
    History {
        /// Path to the TOML configuration.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// Wallet named as caller by the protocol events.
        #[arg(long)]
        wallet: WalletAddress,
    },

    /// List all known chains.
    Chains,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => cmd_run(&config).await,
        Command::Sync { config, chain, rpc } => cmd_sync(&config, chain, rpc).await,
        Command::History { config, wallet } => cmd_history(&config, wallet),
        Command::Chains => {
            cmd_chains();
            Ok(())
        }
    }
}

/// Connect a client to every chain and wrap them in an ingestor.
fn build_ingestor(
    config: &Config,
    chains: Vec<ChainSettings>,
) -> Result<Ingestor<AlloyClient, ParquetStore>> {
    let handles = chains
        .into_iter()
        .map(|settings| {
            let client = AlloyClient::connect(&settings.rpc_url)?;
            Ok(ChainHandle { settings, client })
        })
        .collect::<Result<Vec<_>>>()?;

    let resilience = Resilience::default();
    Ok(Ingestor::new(
        config.contract_address,
        handles,
        ParquetStore::new(&config.data_dir),
    )
    .with_policy(
        Scanner::new(config.batch_block_limit, resilience),
        resilience,
    ))
}

/// Execute the `run` subcommand.
async fn cmd_run(path: &Path) -> Result<()> {
    let config = Config::load(path)?;
    let chains = config.chain_settings()?;
    tracing::info!(
        chains = chains.len(),
        contract = %config.contract_address,
        data_dir = %config.data_dir.display(),
        period = ?config.poll_period(),
        "starting indexer"
    );
    let ingestor = build_ingestor(&config, chains)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    ingestor.run(config.poll_period(), shutdown_rx).await;
    Ok(())
}

/// Execute the `sync` subcommand.
async fn cmd_sync(path: &Path, chain: Option<ChainId>, rpc: Option<String>) -> Result<()> {
    let config = Config::load(path)?;
    let targets = match chain {
        Some(chain_id) => {
            let mut spec = ChainSpec::new(chain_id);
            if let Some(rpc) = rpc {
                spec = spec.with_rpc(rpc);
            }
            vec![config.select(&spec)?]
        }
        None => config.chain_settings()?,
    };

    tracing::info!(chains = targets.len(), "starting sync");
    let ingestor = build_ingestor(&config, targets)?;

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let report = ingestor.run_cycle(&shutdown_rx).await;
    tracing::info!(
        success = report.succeeded.len(),
        failed = report.failed.len(),
        "sync finished"
    );

    if !report.is_success() {
        bail!("{} chain(s) failed to sync", report.failed.len());
    }
    Ok(())
}

/// Execute the `history` subcommand.
#[allow(clippy::print_stdout, reason = "JSON output is the command's result")]
fn cmd_history(path: &Path, wallet: WalletAddress) -> Result<()> {
    let config = Config::load(path)?;
    let store = ParquetStore::new(&config.data_dir);

    let hashes = store.tx_hashes_by_caller(wallet)?;
    let records: Vec<TxInfoRecord> = store
        .tx_infos(&hashes, &config.excluded_selectors)?
        .iter()
        .map(TxInfoRecord::from)
        .collect();

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Execute the `chains` subcommand.
#[allow(clippy::print_stdout, reason = "the table is the command's result")]
fn cmd_chains() {
    println!("{:<12} {:<20} {:<8} RPC", "Chain ID", "Name", "Type");
    println!("{}", "-".repeat(80));

    for chain in chains::ALL {
        let net_type = if chain.is_testnet { "test" } else { "main" };
        println!(
            "{:<12} {:<20} {:<8} {}",
            chain.chain_id, chain.name, net_type, chain.default_rpc,
        );
    }
}
