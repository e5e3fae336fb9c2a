//! Shelf-Scout main entry point
//!
//! This is the command-line interface for the Shelf-Scout product crawler.

use clap::Parser;
use futures::StreamExt;
use shelf_scout::config::{load_config_with_hash, Config, SearchConfig};
use shelf_scout::matching::{find_missing, CategoryMapper, KnownSet};
use shelf_scout::output::{print_missing_report, print_statistics, write_record};
use shelf_scout::{Orchestrator, ProductRecord, ScoutError};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shelf-Scout: A polite product listing crawler
///
/// Shelf-Scout walks a product search listing, enriches every listed item
/// from its desktop and mobile detail pages, and prints one JSON record per
/// item on stdout. With a known-set file it also reports which crawled
/// models are not yet on record.
#[derive(Parser, Debug)]
#[command(name = "shelf-scout")]
#[command(version)]
#[command(about = "A polite product listing crawler", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Known-set TOML file to diff crawled models against
    #[arg(long, value_name = "FILE")]
    known: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let known = match &cli.known {
        Some(path) => {
            let known = KnownSet::load(path)?;
            tracing::info!(
                "Loaded known-set from {} ({} categories)",
                path.display(),
                known.counts().len()
            );
            Some(known)
        }
        None => None,
    };

    if cli.dry_run {
        handle_dry_run(&config, known.as_ref());
    } else {
        handle_crawl(config, known).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_scout=info,warn"),
            1 => EnvFilter::new("shelf_scout=debug,info"),
            2 => EnvFilter::new("shelf_scout=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // stdout carries the records
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, known: Option<&KnownSet>) {
    let search = SearchConfig::from_config(config);

    println!("=== Shelf-Scout Dry Run ===\n");

    println!("Search:");
    println!("  Keyword: {}", search.keyword);
    println!("  Max pages: {}", search.max_pages);
    println!("  Page size: {}", search.page_size);
    println!("  Concurrency: {}", search.concurrency);
    println!("  Short-circuit on short page: {}", search.short_circuit);

    println!("\nNetwork:");
    println!("  Minimum interval: {:?}", search.min_interval);
    println!("  Jitter: up to {:?}", search.jitter);
    println!("  Request timeout: {:?}", search.request_timeout);
    println!(
        "  Retries: {} (backoff {:?} to {:?})",
        search.retry_ceiling, search.backoff_base, search.backoff_cap
    );
    println!("  Rotation: {:?}", search.rotation);
    if search.proxy_pool.is_empty() {
        println!("  Proxies: none (direct)");
    } else {
        println!(
            "  Proxies ({}, partitioned: {}):",
            search.proxy_pool.len(),
            search.partition_by_proxy
        );
        for proxy in &search.proxy_pool {
            println!("    - {}", proxy);
        }
    }
    println!("  Header templates: {}", search.header_templates.len());

    println!("\nEndpoints:");
    println!("  Listing: {}", search.endpoints.listing_url);
    println!("  Desktop detail: {}", search.endpoints.pc_detail_url);
    println!("  Mobile detail: {}", search.endpoints.mobile_detail_url);

    println!("\nCategories ({}):", config.categories.len());
    for entry in &config.categories {
        println!("  - {} ({})", entry.name, entry.brands.join(", "));
    }

    if let Some(known) = known {
        println!("\nKnown-set:");
        for (category, count) in known.counts() {
            println!("  - {}: {} models", category, count);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would request up to {} listing pages ({} items)",
        search.max_pages,
        u64::from(search.max_pages) * u64::from(search.page_size)
    );
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    known: Option<KnownSet>,
) -> Result<(), Box<dyn std::error::Error>> {
    let search = SearchConfig::from_config(&config);
    tracing::info!(
        "Crawling \"{}\": up to {} pages, concurrency {}, {} proxies",
        search.keyword,
        search.max_pages,
        search.concurrency,
        search.proxy_pool.len()
    );

    let orchestrator = Orchestrator::with_reqwest(search)?;
    let handle = orchestrator.handle();

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, winding down");
            ctrl_c.cancel();
        }
    });

    let mut records = orchestrator.run();
    let mut collected: Vec<ProductRecord> = Vec::new();
    let mut failure: Option<ScoutError> = None;
    let stdout = std::io::stdout();

    while let Some(item) = records.next().await {
        match item {
            Ok(record) => {
                let mut out = stdout.lock();
                let written = write_record(&mut out, &record)
                    .and_then(|()| out.flush().map_err(ScoutError::from));
                if let Err(e) = written {
                    tracing::error!("Failed to write record: {}", e);
                    handle.cancel();
                    break;
                }
                if known.is_some() {
                    collected.push(record);
                }
            }
            Err(e) => {
                tracing::error!("Crawl failed: {}", e);
                failure = Some(e);
            }
        }
    }

    let report = records.finish().await?;
    print_statistics(&report.progress, &report.stop_reason);

    if let Some(known) = known {
        let mapper = CategoryMapper::from_config(&config);
        if mapper.is_empty() {
            tracing::warn!("No [[category]] entries configured; skipping known-set diff");
        } else {
            print_missing_report(&find_missing(&collected, &mapper, &known));
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => {
            tracing::info!("Crawl completed: {}", report.stop_reason);
            Ok(())
        }
    }
}
