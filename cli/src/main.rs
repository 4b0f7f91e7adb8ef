//! chaincrawl CLI: run contract crawlers and inspect their state.
//!
//! Usage:
//! ```bash
//! chaincrawl run    --config crawler.yaml [--contract pair]... [--memory]
//! chaincrawl status --config crawler.yaml
//! chaincrawl decode --kind u64 --value AAAAAAAAAAU=
//! chaincrawl info
//! ```

mod logging;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chaincrawl_core::codec::{self, ScalarKind};
use chaincrawl_core::{
    CancellationToken, CheckpointRepository, CrawlEngine, CrawlerConfig, EventSink, LogConfig,
};
use chaincrawl_http::{HttpClientConfig, HttpLedgerClient};
use chaincrawl_storage::{InMemoryStorage, SqliteStorage};

// ─── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "chaincrawl",
    about = "Checkpointed MultiversX contract event crawler",
    long_about = "Crawls the transaction history of configured smart contracts,\n\
                  extracts tracked events and stores them together with a\n\
                  resumable checkpoint.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the configured contracts until interrupted (Ctrl-C)
    Run {
        /// Path to the crawler YAML configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Only crawl these contracts (repeatable; default: all)
        #[arg(long = "contract")]
        contracts: Vec<String>,

        /// Keep checkpoints and events in memory instead of SQLite
        #[arg(long)]
        memory: bool,
    },

    /// Show the stored checkpoint of every configured contract
    Status {
        /// Path to the crawler YAML configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Decode a base64 event payload value
    Decode {
        /// Value kind: u8, u32, u64, i32, i64, biguint, bigint, address
        #[arg(short, long)]
        kind: String,

        /// Base64 value; omit to see the kind's missing-value sentinel
        #[arg(short, long)]
        value: Option<String>,
    },

    /// Show version and supported value kinds
    Info,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            contracts,
            memory,
        } => cmd_run(&config, &contracts, memory).await,
        Commands::Status { config } => cmd_status(&config).await,
        Commands::Decode { kind, value } => cmd_decode(&kind, value.as_deref()),
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<CrawlerConfig> {
    CrawlerConfig::from_file(path)
        .with_context(|| format!("loading config {}", path.display()))
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(path: &Path, only: &[String], memory: bool) -> Result<()> {
    let config = load_config(path)?;
    logging::init_tracing(&config.log);

    let names = if only.is_empty() {
        config.contract_names()
    } else {
        only.to_vec()
    };
    if names.is_empty() {
        bail!("no contracts configured under `abi`");
    }

    if memory {
        tracing::warn!("running with in-memory storage; progress is lost on exit");
        run_engines(&config, &names, Arc::new(InMemoryStorage::new())).await
    } else {
        let url = config.sqlite_url()?;
        let store = SqliteStorage::open(url)
            .await
            .with_context(|| format!("opening database {url}"))?;
        run_engines(&config, &names, Arc::new(store)).await
    }
}

/// Spawn one engine per contract and wait for all of them to stop.
async fn run_engines<R>(config: &CrawlerConfig, names: &[String], store: Arc<R>) -> Result<()>
where
    R: CheckpointRepository + EventSink<R::Tx> + 'static,
{
    let root = CancellationToken::new();
    let settings = config.crawl_settings()?;
    let mut handles = Vec::with_capacity(names.len());

    for name in names {
        let contract = config
            .tracked_contract(name)
            .with_context(|| format!("contract {name}"))?;
        // Each engine owns its client and retry policy.
        let client = HttpLedgerClient::new(
            config.api_url()?,
            HttpClientConfig {
                retry: config.retry_policy(),
                request_timeout: config.request_timeout(),
            },
        )?;
        let mut engine = CrawlEngine::new(
            contract,
            settings.clone(),
            Arc::new(client),
            store.clone(),
            store.clone(),
        )?
        .with_cancellation(root.child_token());

        let name = name.clone();
        handles.push(tokio::spawn(async move {
            let result = engine.run().await;
            (name, result)
        }));
    }

    let shutdown = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping crawlers");
            shutdown.cancel();
        }
    });

    let mut failed = 0usize;
    for handle in handles {
        let (name, result) = handle.await.map_err(|e| anyhow!("crawler task panicked: {e}"))?;
        match result {
            Ok(()) => tracing::info!(contract = %name, "crawler stopped"),
            Err(e) => {
                failed += 1;
                tracing::error!(contract = %name, error = %e, "crawler failed");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} crawler(s) stopped with an error");
    }
    Ok(())
}

async fn cmd_status(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    logging::init_tracing(&LogConfig {
        level: "warn".into(),
        ..config.log.clone()
    });

    let store = SqliteStorage::open(config.sqlite_url()?).await?;
    let checkpoints = store.checkpoints().await?;

    println!("{:<20} {:<24} {:>12}  {}", "CONTRACT", "ABI", "PROCESSED", "UPDATED");
    for name in config.contract_names() {
        let contract = config.tracked_contract(&name)?;
        let stored = checkpoints
            .iter()
            .find(|c| c.entity_key == contract.entity_key());
        match stored {
            Some(c) => println!(
                "{:<20} {:<24} {:>12}  {}",
                name, c.entity_key, c.processed_count, c.updated_at
            ),
            None => println!(
                "{:<20} {:<24} {:>12}  never",
                name,
                contract.entity_key(),
                0
            ),
        }
    }
    println!("events stored: {}", store.event_count().await?);
    Ok(())
}

fn cmd_decode(kind: &str, value: Option<&str>) -> Result<()> {
    let kind: ScalarKind = kind.parse()?;
    let decoded = codec::decode(value, kind)?;
    println!("{decoded}");
    Ok(())
}

fn cmd_info() {
    println!("chaincrawl v{}", env!("CARGO_PKG_VERSION"));
    println!("Checkpointed MultiversX contract event crawler");
    println!();
    println!("Storage backends: sqlite, memory");
    println!("Address prefix:   {}", codec::ADDRESS_HRP);
    println!();
    println!("Value kinds (missing-value sentinel):");
    for kind in ScalarKind::ALL {
        println!("  {:<8} {:?}", kind.as_str(), kind.missing_sentinel());
    }
}
