//! peerlearn: mentorship marketplace backend on the Arkiv data network.
//!
//! Usage:
//!   peerlearn init              Write a default config and signing wallet
//!   peerlearn serve             Run the HTTP API
//!   peerlearn status            Show config, signer and chain head
//!   peerlearn explore           Build the explorer index once
//!   peerlearn tx <hash>         Resolve a transaction's block and status
//!   peerlearn perf              Time both read paths and summarize

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use peerlearn::arkiv::{ArkivClient, Ledger, MemoryLedger};
use peerlearn::clock::{Clock, SystemClock};
use peerlearn::config::{self, PeerlearnConfig};
use peerlearn::identity::SigningWallet;
use peerlearn::metrics::{summarize, PerfOperation, SnapshotScheduler, SourceSummary};
use peerlearn::server::{self, AppState};
use peerlearn::types::{PerfMethod, TxStatus};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "peerlearn")]
#[command(version = "0.1.0")]
#[command(about = "Mentorship marketplace backend on the Arkiv data network")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to peerlearn home directory.
    #[arg(long, default_value = "~/.peerlearn")]
    home: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config (if absent) and create the signing wallet.
    Init,

    /// Run the HTTP API.
    Serve {
        /// Use an in-process ledger instead of the configured RPC endpoint.
        #[arg(long)]
        memory: bool,

        /// Override the configured listen address.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Show config, signer and chain head.
    Status,

    /// Build the explorer index once and print its counts.
    Explore {
        /// Restrict counts to one space.
        #[arg(long)]
        space: Option<String>,
    },

    /// Resolve a transaction's block and status.
    Tx {
        hash: String,
    },

    /// Time matched operations over both read paths and print a summary.
    Perf {
        /// One operation (listAsks, listOffers, listProfiles, network).
        #[arg(long)]
        operation: Option<String>,

        /// Paths to time (arkiv, graphql, both).
        #[arg(long, default_value = "both")]
        method: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Resolve home directory
    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    match cli.command {
        Commands::Init => cmd_init(&home_dir),
        Commands::Serve { memory, listen } => cmd_serve(&home_dir, memory, listen).await,
        Commands::Status => cmd_status(&home_dir).await,
        Commands::Explore { space } => cmd_explore(&home_dir, space).await,
        Commands::Tx { hash } => cmd_tx(&home_dir, &hash).await,
        Commands::Perf { operation, method } => cmd_perf(&home_dir, operation, &method).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(home_dir)
        .with_context(|| format!("Failed to create home directory: {}", home_dir.display()))?;

    let config_path = config::config_path(home_dir);
    let cfg = if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        config::load_config(&config_path)?
    } else {
        let cfg = PeerlearnConfig {
            wallet_path: home_dir.join("wallet.json").display().to_string(),
            ..Default::default()
        };
        config::save_config(&cfg, &config_path)?;
        println!("{} Wrote {}", ">>>".green().bold(), config_path.display());
        cfg
    };

    let wallet_path = PathBuf::from(cfg.resolved_wallet_path());
    let wallet = SigningWallet::load_or_create(&wallet_path)
        .with_context(|| format!("Failed to load or create wallet at {}", wallet_path.display()))?;
    println!("  Signer: {}", wallet.address);
    Ok(())
}

async fn cmd_serve(home_dir: &Path, memory: bool, listen: Option<String>) -> Result<()> {
    let (cfg, wallet) = bootstrap(home_dir)?;
    let ledger: Arc<dyn Ledger> = if memory {
        warn!("Using the in-process ledger; nothing will be persisted");
        Arc::new(MemoryLedger::new())
    } else {
        Arc::new(ArkivClient::new(&cfg.arkiv_rpc_url))
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::from_config(&cfg, ledger, Arc::new(wallet), clock.clone()));
    let addr = listen.unwrap_or_else(|| cfg.listen_addr.clone());

    println!(
        "{} Serving peerlearn on {} (signer: {}, spaces: {})",
        ">>>".green().bold(),
        addr,
        state.signer_address(),
        cfg.spaces.join(", "),
    );

    let cancel = CancellationToken::new();

    // Spawn the snapshot scheduler (token is checked inside the loop)
    let scheduler_handle = if cfg.snapshots.enabled {
        let mut scheduler =
            SnapshotScheduler::new(state.snapshotter.clone(), &cfg.snapshots, clock)?;
        let scheduler_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = scheduler.run(scheduler_cancel).await {
                error!("Snapshot scheduler error: {}", e);
            }
        }))
    } else {
        None
    };

    let server_cancel = cancel.clone();
    let server_state = state.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run(server_state, &addr, server_cancel).await {
            error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    cancel.cancel();

    let shutdown_timeout = tokio::time::Duration::from_secs(10);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        if let Some(handle) = scheduler_handle {
            if let Err(e) = handle.await {
                warn!("Scheduler task join error: {}", e);
            }
        }
        if let Err(e) = server_handle.await {
            warn!("Server task join error: {}", e);
        }
    })
    .await;

    state.explorer.shutdown();
    info!("Shutdown complete");
    Ok(())
}

async fn cmd_status(home_dir: &Path) -> Result<()> {
    let (cfg, wallet) = bootstrap(home_dir)?;
    let client = ArkivClient::new(&cfg.arkiv_rpc_url);

    println!();
    println!("{}", "=== peerlearn Status ===".bold());
    println!();
    println!("  {}:", "Signer".bold());
    println!("    Address:  {}", wallet.address);
    println!();
    println!("  {}:", "Network".bold());
    println!("    RPC:      {}", cfg.arkiv_rpc_url);
    match client.chain_id().await {
        Ok(id) => println!("    Chain:    {}", id),
        Err(e) => println!("    Chain:    {}", format!("unreachable ({e})").red()),
    }
    match client.block_number().await {
        Ok(n) => println!("    Head:     {}", n),
        Err(e) => println!("    Head:     {}", format!("unreachable ({e})").red()),
    }
    let graphql = cfg.graphql_endpoint().unwrap_or("disabled");
    println!("    GraphQL:  {}", graphql);
    println!();
    println!("  {}:", "Spaces".bold());
    for space in &cfg.spaces {
        let marker = if *space == cfg.default_space { " (default)" } else { "" };
        println!("    {}{}", space, marker.dimmed());
    }
    println!();
    println!("  {}:", "Snapshots".bold());
    if cfg.snapshots.enabled {
        println!(
            "    {} {} [{}]",
            "enabled".green(),
            cfg.snapshots.schedule,
            cfg.snapshots.operations.join(", ")
        );
    } else {
        println!("    {}", "disabled".dimmed());
    }
    println!();

    Ok(())
}

async fn cmd_explore(home_dir: &Path, space: Option<String>) -> Result<()> {
    let state = remote_state(home_dir)?;
    let index = state
        .explorer
        .get_index(space.as_deref())
        .await
        .context("Failed to build explorer index")?;
    let counts = &index.counts;

    println!();
    println!(
        "{} (version {})",
        "=== Explorer Index ===".bold(),
        index.version
    );
    println!();
    println!("  Profiles:          {}", counts.profiles);
    println!("  Asks:              {} ({} lite)", counts.asks, counts.lite_asks);
    println!("  Offers:            {} ({} lite)", counts.offers, counts.lite_offers);
    println!("  Skills:            {}", counts.skills);
    println!("  Sessions:          {}", counts.sessions);
    println!("  Feedback:          {}", counts.feedback);
    println!("  Learner quests:    {}", counts.learner_quests);
    println!("  Quest progress:    {}", counts.quest_progress);
    println!("  Assessments:       {}", counts.assessment_results);
    println!("  Badges:            {}", counts.badges);
    println!("  Reflections:       {}", counts.reflections);
    println!("  Skill links:       {}", counts.skill_links);
    println!("  Quest telemetry:   {}", counts.quest_telemetry);
    println!("  {}:             {}", "Total".bold(), counts.total);
    println!();
    Ok(())
}

async fn cmd_tx(home_dir: &Path, hash: &str) -> Result<()> {
    let state = remote_state(home_dir)?;
    let Some(meta) = state.tx_meta.get(hash).await else {
        anyhow::bail!("Could not resolve transaction {hash}");
    };

    println!();
    println!("  Tx:        {}", hash);
    println!("  Status:    {}", colorize_status(meta.status));
    match meta.block_number {
        Some(n) => println!("  Block:     {}", n),
        None => println!("  Block:     {}", "-".dimmed()),
    }
    if let Some(ts) = meta.block_timestamp {
        println!("  Mined at:  {}", ts.to_rfc3339());
    }
    println!();
    Ok(())
}

async fn cmd_perf(home_dir: &Path, operation: Option<String>, method: &str) -> Result<()> {
    let state = remote_state(home_dir)?;
    let method: PerfMethod = method.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let operations = match operation.as_deref() {
        Some(op) => vec![op.parse::<PerfOperation>().map_err(|e| anyhow::anyhow!(e))?],
        None => PerfOperation::ALL.to_vec(),
    };

    let samples = state.seeder.seed(&operations, method).await;
    if samples.is_empty() {
        anyhow::bail!("No samples recorded; check the RPC and GraphQL endpoints");
    }

    println!();
    println!("{}", "=== Read Path Timings ===".bold());
    for op in &operations {
        let summary = summarize(&samples, Some(op.as_str()));
        println!();
        println!("  {}:", op.as_str().bold());
        print_source("arkiv", summary.arkiv.as_ref());
        print_source("graphql", summary.graphql.as_ref());
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bootstrap the runtime: load config and the signing wallet.
fn bootstrap(home_dir: &Path) -> Result<(PeerlearnConfig, SigningWallet)> {
    let config_path = config::config_path(home_dir);

    if !config_path.exists() {
        eprintln!(
            "{} No config found at {:?}. Run `peerlearn init` first.",
            "Error:".red().bold(),
            config_path
        );
        std::process::exit(1);
    }

    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let wallet_path = PathBuf::from(cfg.resolved_wallet_path());
    let wallet = SigningWallet::load_or_create(&wallet_path)
        .with_context(|| format!("Failed to load or create wallet at {}", wallet_path.display()))?;

    Ok((cfg, wallet))
}

/// Application state over the configured RPC endpoint.
fn remote_state(home_dir: &Path) -> Result<AppState> {
    let (cfg, wallet) = bootstrap(home_dir)?;
    let ledger: Arc<dyn Ledger> = Arc::new(ArkivClient::new(&cfg.arkiv_rpc_url));
    Ok(AppState::from_config(&cfg, ledger, Arc::new(wallet), Arc::new(SystemClock)))
}

fn print_source(name: &str, summary: Option<&SourceSummary>) {
    match summary {
        Some(s) => println!(
            "    {:<8} {:>8.1}ms  {:>8.0} bytes  {:.0} req",
            name, s.avg_duration_ms, s.avg_payload_bytes, s.avg_http_requests
        ),
        None => println!("    {:<8} {}", name, "no sample".dimmed()),
    }
}

fn colorize_status(status: TxStatus) -> String {
    match status {
        TxStatus::Success => "success".green().to_string(),
        TxStatus::Pending => "pending".yellow().to_string(),
        TxStatus::Failed => "failed".red().to_string(),
    }
}
