//! Metallum-Crawler main entry point
//!
//! This is the command-line interface for the Metallum-Crawler catalog crawler.

use anyhow::Context;
use clap::Parser;
use metallum_crawler::config::{load_config_with_hash, Config};
use metallum_crawler::crawler::{CrawlResult, Coordinator};
use metallum_crawler::output::{
    generate_markdown_summary, generate_summary, print_result, print_statistics,
};
use metallum_crawler::render::{build_http_client, HttpSession, SessionRenderer};
use metallum_crawler::sink::open_sink;
use metallum_crawler::storage::SqliteStorage;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Metallum-Crawler: a resumable crawler for the band catalog
///
/// Metallum-Crawler walks every alphabetical partition of the band listing,
/// follows its server-side pagination, and writes each band once to a SQLite
/// table or CSV file. Interrupted runs resume from per-partition checkpoints.
#[derive(Parser, Debug)]
#[command(name = "metallum-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A resumable crawler for partitioned, paginated catalogs", long_about = None)]
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

    /// Resume from checkpoints, overriding the configuration
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding checkpoints and records
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

/// Exit code of a run interrupted by Ctrl-C
const EXIT_CANCELLED: u8 = 130;

/// Largest exit code reported for failed partitions
const MAX_FAILURE_EXIT: usize = 100;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)?;
        return Ok(ExitCode::SUCCESS);
    }
    if cli.stats {
        handle_stats(&config)?;
        return Ok(ExitCode::SUCCESS);
    }
    if cli.export_summary {
        handle_export_summary(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let resume = if cli.fresh {
        false
    } else if cli.resume {
        true
    } else {
        config.crawler.resume_from_checkpoint
    };

    let result = handle_crawl(config, &config_hash, resume).await?;
    Ok(exit_code(&result))
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("metallum_crawler=info,warn"),
            1 => EnvFilter::new("metallum_crawler=debug,info"),
            2 => EnvFilter::new("metallum_crawler=trace,debug"),
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

/// Maps a finished run to the process exit code
fn exit_code(result: &CrawlResult) -> ExitCode {
    if result.cancelled {
        return ExitCode::from(EXIT_CANCELLED);
    }
    match result.failures.len() {
        0 => ExitCode::SUCCESS,
        n => ExitCode::from(n.min(MAX_FAILURE_EXIT) as u8),
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Metallum-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Base URL: {}", config.crawler.base_url);
    println!("  Sessions: {}", config.crawler.sessions);
    println!("  Page load timeout: {}ms", config.crawler.page_load_timeout_ms);
    println!("  Politeness delay: {}ms", config.crawler.politeness_delay_ms);
    println!("  Max attempts per operation: {}", config.crawler.max_retries);
    println!(
        "  Max pages per partition: {}",
        config.crawler.max_pages_per_partition
    );
    println!(
        "  Resume from checkpoint: {}",
        config.crawler.resume_from_checkpoint
    );

    println!("\nRetry:");
    println!("  Base delay: {}ms", config.retry.base_delay_ms);
    println!("  Multiplier: {}", config.retry.multiplier);
    println!("  Max delay: {}ms", config.retry.max_delay_ms);
    println!("  Jitter: {}", config.retry.jitter);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nSelectors:");
    println!("  Listing: {}", config.selectors.listing);
    println!("  Rows: {}", config.selectors.rows);
    println!("  Next button: {}", config.selectors.next_button);
    println!("  Disabled class: {}", config.selectors.disabled_class);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    match &config.output.csv_path {
        Some(csv) => println!("  Records: CSV file {}", csv),
        None => println!("  Records: table `bands` in the database"),
    }
    if let Some(summary) = &config.output.summary_path {
        println!("  Summary: {}", summary);
    }

    let base_url = Url::parse(&config.crawler.base_url)?;
    let partitions = config.partitions()?;
    println!("\nPartitions ({}):", partitions.len());
    for partition in &partitions {
        println!("  - {:>4}: {}", partition.label(), partition.url(&base_url)?);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} partitions", partitions.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let mut sink = open_sink(&config.output)?;

    let summary = generate_summary(&storage, sink.as_mut(), &config.partitions()?)?;
    print_statistics(&summary);

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    let summary_path = config
        .output
        .summary_path
        .as_deref()
        .context("output.summary-path is not set")?;

    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", summary_path);
    println!();

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let mut sink = open_sink(&config.output)?;

    tracing::info!("Loading crawl data from database...");
    let summary = generate_summary(&storage, sink.as_mut(), &config.partitions()?)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(summary_path))?;

    println!("✓ Summary exported to: {}", summary_path);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, resume: bool) -> anyhow::Result<CrawlResult> {
    if resume {
        tracing::info!("Starting crawl (resuming from checkpoints when present)");
    } else {
        tracing::info!("Starting fresh crawl (discarding previous state)");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current page");
            on_signal.cancel();
        }
    });

    let client = build_http_client(&config.user_agent, config.crawler.page_load_timeout())?;
    let mut renderers = Vec::with_capacity(config.crawler.sessions as usize);
    for _ in 0..config.crawler.sessions {
        let session = HttpSession::new(
            client.clone(),
            config.crawler.poll_interval(),
            config.crawler.politeness_delay(),
        );
        renderers.push(SessionRenderer::from_config(session, &config)?);
    }

    let coordinator = Coordinator::new(config.clone(), config_hash, resume, cancel)?;
    let result = coordinator.run(renderers).await?;

    print_result(&result);

    if let Some(summary_path) = &config.output.summary_path {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let mut sink = open_sink(&config.output)?;
        let summary = generate_summary(&storage, sink.as_mut(), coordinator.partitions())?
            .with_result(&result);
        generate_markdown_summary(&summary, Path::new(summary_path))?;
        tracing::info!("Summary written to {}", summary_path);
    }

    if !result.failures.is_empty() {
        println!("\n{} partition(s) failed", result.failures.len());
    }

    Ok(result)
}
