//! pagewalk main entry point
//!
//! This is the command-line interface for the pagewalk harvester.

use anyhow::Context;
use clap::Parser;
use pagewalk::config::{load_config_with_hash, Config};
use pagewalk::crawler::Harvester;
use pagewalk::output::{load_statistics, log_report, print_statistics};
use pagewalk::sites::unique_owners;
use pagewalk::storage::open_storage;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// pagewalk: a recency-bounded pagination harvester
///
/// pagewalk walks forum discussion listings, topic reply threads and
/// fan-app feeds (albums, chat channels, broadcasts) until items fall
/// outside the configured recency window, and stores every record in SQLite.
#[derive(Parser, Debug)]
#[command(name = "pagewalk")]
#[command(version = "1.0.0")]
#[command(about = "A recency-bounded pagination harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Walk replies of every stored topic again, not only unfinished ones
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_harvest(config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagewalk=info,warn"),
            1 => EnvFilter::new("pagewalk=debug,info"),
            2 => EnvFilter::new("pagewalk=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== pagewalk Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent walks: {}",
        config.crawler.max_concurrent_walks
    );
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);
    match config.crawler.max_pages {
        Some(max) => println!("  Max pages per walk: {}", max),
        None => println!("  Max pages per walk: unlimited"),
    }
    println!(
        "  Stop on short page: {}",
        config.crawler.stop_on_short_page
    );
    println!(
        "  Stop on stale item: {}",
        config.crawler.stop_on_stale_item
    );
    println!("  All or nothing: {}", config.crawler.all_or_nothing);

    println!("\nRecency:");
    println!("  Cutoff: {:?}", config.recency.cutoff()?);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nForum Groups ({}):", config.forum.len());
    for forum in &config.forum {
        println!("  - {} at {}", forum.group_id, forum.base_url);
    }

    let owners = unique_owners(&config.album);
    println!("\nAlbum Owners ({}):", owners.len());
    for owner in &owners {
        println!(
            "  - {} ({}) via {}, {} per page",
            owner.owner_id, owner.owner_name, owner.api_url, owner.page_size
        );
    }

    match &config.fanclub {
        Some(fanclub) => {
            println!("\nFan-app account at {}:", fanclub.api_base);
            println!("  Channels: {}", fanclub.channels);
            println!("  Broadcasts: {}", fanclub.lives);
        }
        None => println!("\nFan-app account: not configured"),
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (all topics will be walked again)");
    }

    tracing::info!(
        "Forum groups: {}, album owners: {}",
        config.forum.len(),
        config.album.len()
    );

    let harvester = Harvester::new(config, config_hash, fresh)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping walks");
            on_signal.cancel();
        }
    });

    match harvester.run(&cancel).await {
        Ok(report) => {
            log_report(&report);
            tracing::info!("Harvest finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
