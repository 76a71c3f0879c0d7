//! Paper-Harvest main entry point
//!
//! This is the command-line interface for the Paper-Harvest news harvester.

use anyhow::Context;
use clap::Parser;
use paper_harvest::config::{load_config_with_hash, Config};
use paper_harvest::crawler::Coordinator;
use paper_harvest::output::{
    load_statistics, print_merge_summary, print_run_summary, print_statistics,
};
use paper_harvest::staging::StagingArea;
use paper_harvest::storage::{SqliteStorage, Storage};
use paper_harvest::telemetry::init_logging;
use std::path::{Path, PathBuf};
use tracing::Instrument;

/// Paper-Harvest: an incremental news category harvester
///
/// Paper-Harvest walks the paginated listings of every configured category,
/// fetches the articles it has not seen before, and merges links and
/// article bodies into a SQLite database through a resumable staging area.
#[derive(Parser, Debug)]
#[command(name = "paper-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An incremental news category harvester", long_about = None)]
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

    /// Only discover and stage new links
    #[arg(long, group = "mode")]
    discover: bool,

    /// Only fetch content for staged links
    #[arg(long, group = "mode")]
    fetch: bool,

    /// Only merge staged links and content into the database
    #[arg(long, group = "mode")]
    merge: bool,

    /// Show statistics from the database and exit
    #[arg(long, group = "mode")]
    stats: bool,

    /// Validate config and show what would be harvested without harvesting
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Delete every stored link and content row, keeping categories
    #[arg(long, group = "mode")]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let _log_guard = init_logging(cli.verbose, cli.quiet, &config.logging)
        .context("Failed to initialize logging")?;
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }
    if cli.stats {
        return handle_stats(&config);
    }
    if cli.reset {
        return handle_reset(&config);
    }

    let span = tracing::info_span!("run", config = %config_hash);
    handle_pipeline(&cli, config).instrument(span).await
}

/// Handles the --dry-run mode: shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Paper-Harvest Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Link selector: {}", config.site.link_selector);
    println!(
        "  Date selector: {} ({})",
        config.site.date_selector, config.site.date_format
    );
    println!(
        "  Body selector: {} > {}",
        config.site.body_selector, config.site.paragraph_selector
    );

    println!("\nCrawler:");
    println!("  Max pages per category: {}", config.crawler.max_pages);
    println!("  Empty streak limit: {}", config.crawler.empty_streak_limit);
    println!(
        "  Concurrent categories: {}",
        config.crawler.max_category_workers
    );
    println!("  Page timeout: {}ms", config.crawler.page_timeout_ms);

    println!("\nFetcher:");
    println!("  Workers: {}", config.fetcher.workers);
    println!(
        "  Navigation timeout: {}ms",
        config.fetcher.navigation_timeout_ms
    );
    println!(
        "  Scrolls: up to {} every {}ms, settle {}ms",
        config.fetcher.max_scrolls, config.fetcher.scroll_pause_ms, config.fetcher.settle_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Staging: {}", config.output.staging_dir);
    if let Some(archive) = &config.output.archive_dir {
        println!("  Archive: {}", archive);
    }

    println!("\nSeed Categories ({}):", config.categories.len());
    for entry in &config.categories {
        println!("  - [{}] {}", entry.id, entry.url);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let staging = StagingArea::open(&config.output.staging_dir)?;
    let stats = load_statistics(&storage, Some(&staging))?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the --reset mode: empties the links and contents tables
fn handle_reset(config: &Config) -> anyhow::Result<()> {
    let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let report = storage.reset().context("Failed to reset database")?;

    println!(
        "Reset {}: {} links and {} contents deleted",
        config.output.database_path, report.links, report.contents
    );
    Ok(())
}

/// Runs the selected pipeline stages
async fn handle_pipeline(cli: &Cli, config: Config) -> anyhow::Result<()> {
    let coordinator = Coordinator::new(config).context("Failed to initialize harvester")?;

    if cli.discover {
        let reports = coordinator.discover_all().await?;
        let total: usize = reports.values().map(|r| r.outcome.links.len()).sum();
        println!("{} new links staged across {} categories", total, reports.len());
    } else if cli.fetch {
        let reports = coordinator.fetch_all_staged().await?;
        for (name, report) in &reports {
            println!(
                "{}: {} fetched, {} failed, {} already staged",
                name, report.success_count, report.failure_count, report.skipped
            );
        }
    } else if cli.merge {
        let (links, contents) = coordinator.merge()?;
        print_merge_summary("Links", &links);
        print_merge_summary("Contents", &contents);
    } else {
        let summary = coordinator.run().await?;
        print_run_summary(&summary);
    }

    Ok(())
}
