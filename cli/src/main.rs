//! paindex — protocol adapter indexer CLI.
//!
//! Commands:
//!   run              — index every configured contract until Ctrl-C
//!   status           — cursors and row counts of the configured store
//!   reset            — forget a pair's cursor so it re-syncs from its start block
//!   decode-log       — decode a single raw protocol adapter log
//!   decode-calldata  — decode `execute(Transaction)` calldata
//!   info             — event topics and selectors this build understands

mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use paindex_abi::{decode_log, CalldataDecoder, EventClassifier, EventKind};
use paindex_core::{PairKey, RawLog};
use paindex_evm::{JobConfig, JsonRpcEvmClient, Scheduler, SyncEngineBuilder};
use paindex_rpc::KeyedRateLimiter;

use crate::config::{open_store, CliConfig};
use crate::logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "paindex",
    about = "Indexer for the EVM protocol adapter contract",
    long_about = "paindex follows protocol adapter deployments on EVM chains, decodes their \
                  events and execute() calldata, and keeps a linked entity graph of \
                  transactions, actions, compliance units and resources.",
    version
)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every configured (network, contract) pair until interrupted
    Run {
        #[arg(short, long, default_value = "paindex.yaml")]
        config: PathBuf,

        /// Seconds between stalled-job reports
        #[arg(long, default_value_t = 60)]
        report_interval: u64,
    },

    /// Show cursors and row counts
    Status {
        #[arg(short, long, default_value = "paindex.yaml")]
        config: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Delete a pair's cursor; the next run starts from the configured start block
    Reset {
        #[arg(short, long, default_value = "paindex.yaml")]
        config: PathBuf,

        #[arg(long)]
        network: String,

        #[arg(long)]
        contract: String,
    },

    /// Decode one raw log
    #[command(name = "decode-log")]
    DecodeLog {
        /// Topics as hex strings (topic0 first)
        #[arg(long, num_args = 1..)]
        topics: Vec<String>,

        /// Log data as hex
        #[arg(long)]
        data: String,

        #[arg(long, default_value = "0x0")]
        block: String,
    },

    /// Decode execute(Transaction) calldata
    #[command(name = "decode-calldata")]
    DecodeCalldata {
        /// Calldata as hex, including the selector
        #[arg(long)]
        input: String,
    },

    /// Show supported events and selectors
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            report_interval,
        } => {
            let config = load(&config, cli.verbose)?;
            cmd_run(config, Duration::from_secs(report_interval.max(1))).await
        }
        Commands::Status { config, json } => {
            let config = load(&config, cli.verbose)?;
            cmd_status(config, json).await
        }
        Commands::Reset {
            config,
            network,
            contract,
        } => {
            let config = load(&config, cli.verbose)?;
            cmd_reset(config, &network, &contract).await
        }
        Commands::DecodeLog {
            topics,
            data,
            block,
        } => {
            init_tracing(&cli_log(cli.verbose));
            cmd_decode_log(topics, data, block)
        }
        Commands::DecodeCalldata { input } => {
            init_tracing(&cli_log(cli.verbose));
            cmd_decode_calldata(&input)
        }
        Commands::Info => cmd_info(),
    }
}

fn cli_log(verbose: bool) -> LogConfig {
    LogConfig {
        level: if verbose { "debug" } else { "warn" }.into(),
        ..LogConfig::default()
    }
}

fn load(path: &Path, verbose: bool) -> Result<CliConfig> {
    let mut config = CliConfig::load(path)?;
    if verbose {
        config.log.level = "debug".into();
    }
    init_tracing(&config.log);
    Ok(config)
}

// ─── run ──────────────────────────────────────────────────────────────────────

async fn cmd_run(config: CliConfig, report_interval: Duration) -> Result<()> {
    let indexer = config.indexer;
    if indexer.contracts.is_empty() {
        bail!("no contracts configured");
    }

    let store = open_store(&indexer.storage).await?;
    let limiter = Arc::new(KeyedRateLimiter::new(10.0));
    let job_config = JobConfig::from_sync(&indexer.sync);
    let scheduler = Scheduler::new();

    for contract in &indexer.contracts {
        let network = indexer
            .network(&contract.network)
            .ok_or_else(|| anyhow!("unknown network '{}'", contract.network))?;
        let client = JsonRpcEvmClient::http(network, &indexer.sync, limiter.clone())
            .with_context(|| format!("RPC client for network '{}'", network.name))?;
        let engine = SyncEngineBuilder::from_config(network, contract, &indexer.sync)
            .client(Arc::new(client))
            .store(store.clone())
            .build()
            .with_context(|| format!("sync engine for {}", contract.key()))?;
        scheduler.spawn(Arc::new(engine), job_config.clone()).await;
    }
    info!(pairs = indexer.contracts.len(), "indexer running, Ctrl-C to stop");

    let mut ticker = tokio::time::interval(report_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for Ctrl-C")?;
                break;
            }
            _ = ticker.tick() => {
                for (pair, status) in scheduler.stalled() {
                    if let Some(err) = status.stall_error() {
                        warn!(%pair, error = %err, "pair needs attention");
                    }
                }
            }
        }
    }

    info!("shutting down");
    scheduler.shutdown().await;
    Ok(())
}

// ─── status / reset ───────────────────────────────────────────────────────────

async fn cmd_status(config: CliConfig, json: bool) -> Result<()> {
    let store = open_store(&config.indexer.storage).await?;
    let cursors = store.list_cursors().await?;
    let stats = store.stats().await?;

    if json {
        let out = serde_json::json!({ "cursors": cursors, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Cursors:");
    if cursors.is_empty() {
        println!("  (none)");
    }
    for c in &cursors {
        println!(
            "  {:<12} {}  logs={}  transactions={}",
            c.network,
            c.contract,
            block_or_dash(c.logs_block),
            block_or_dash(c.transactions_block),
        );
    }
    println!();
    println!("Rows:");
    println!("  transactions           {}", stats.transactions);
    println!("  actions                {}", stats.actions);
    println!("  compliance units       {}", stats.compliance_units);
    println!("  logic inputs           {}", stats.logic_inputs);
    println!("  resources              {}", stats.resources);
    println!("  payloads               {}", stats.payloads);
    println!("  commitment tree roots  {}", stats.commitment_tree_roots);
    println!("  forwarder calls        {}", stats.forwarder_calls);
    println!("  decode failures        {}", stats.decode_failures);
    Ok(())
}

fn block_or_dash(block: Option<u64>) -> String {
    block.map_or_else(|| "-".to_string(), |b| b.to_string())
}

async fn cmd_reset(config: CliConfig, network: &str, contract: &str) -> Result<()> {
    let pair = PairKey::new(network, contract);
    if !config.indexer.contracts.iter().any(|c| c.key() == pair) {
        warn!(%pair, "pair is not in the config file");
    }
    let store = open_store(&config.indexer.storage).await?;
    if store.load_cursor(&pair).await?.is_none() {
        println!("no cursor stored for {pair}");
        return Ok(());
    }
    store.delete_cursor(&pair).await?;
    println!("✓ cursor for {pair} deleted");
    Ok(())
}

// ─── decode ───────────────────────────────────────────────────────────────────

fn cmd_decode_log(topics: Vec<String>, data: String, block: String) -> Result<()> {
    let topic0 = topics.first().context("at least one topic is required")?;
    let kind = EventClassifier::new()
        .classify(topic0)
        .ok_or_else(|| anyhow!("topic0 {topic0} is not a protocol adapter event"))?;

    let log = RawLog {
        address: "0x0000000000000000000000000000000000000000".into(),
        topics,
        data,
        block_number: block,
        block_hash: None,
        tx_hash: format!("0x{}", "00".repeat(32)),
        log_index: "0x0".into(),
        removed: None,
        block_timestamp: None,
        tx_input: None,
    };
    let decoded = decode_log(kind, &log).with_context(|| format!("decode {}", kind.name()))?;
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}

fn cmd_decode_calldata(input: &str) -> Result<()> {
    let decoder = CalldataDecoder::new();
    match decoder.decode_hex(input)? {
        Some(tx) => println!("{}", serde_json::to_string_pretty(&tx)?),
        None => bail!(
            "selector is not execute(Transaction) (expected 0x{})",
            hex::encode(decoder.selector())
        ),
    }
    Ok(())
}

// ─── info ─────────────────────────────────────────────────────────────────────

fn cmd_info() -> Result<()> {
    println!("paindex v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Events:");
    for kind in EventKind::ALL {
        println!("  {:<26} {}", kind.name(), kind.topic0());
    }
    println!();
    println!("Calldata:");
    println!(
        "  execute(Transaction)       0x{}",
        hex::encode(CalldataDecoder::new().selector())
    );
    println!();
    println!("Storage backends: memory, sqlite");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_decode_log() {
        let cli = Cli::try_parse_from([
            "paindex",
            "decode-log",
            "--topics",
            "0xaa",
            "0xbb",
            "--data",
            "0x",
        ])
        .unwrap();
        match cli.command {
            Commands::DecodeLog { topics, block, .. } => {
                assert_eq!(topics, vec!["0xaa", "0xbb"]);
                assert_eq!(block, "0x0");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn reset_requires_network_and_contract() {
        assert!(Cli::try_parse_from(["paindex", "reset", "--network", "sepolia"]).is_err());
    }

    #[test]
    fn unknown_topic_is_an_error() {
        let err = cmd_decode_log(vec![format!("0x{}", "12".repeat(32))], "0x".into(), "0x1".into())
            .unwrap_err();
        assert!(err.to_string().contains("not a protocol adapter event"));
    }
}
