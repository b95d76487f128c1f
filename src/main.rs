//! Listing-Harvest main entry point
//!
//! This is the command-line interface for the listing harvester.

use clap::Parser;
use listing_harvest::cache::ResponseCache;
use listing_harvest::config::{load_or_default, validate, validate_page_range, Config};
use listing_harvest::export::write_csv;
use listing_harvest::fanout::{dedup_by_identity, FanoutDriver};
use listing_harvest::pagination::SitemapOracle;
use listing_harvest::store::{FileStore, StorePaths};
use listing_harvest::{HttpFetcher, Orchestrator, PropertyRecord, ScrapeOptions};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Listing-Harvest: a resumable real-estate listing scraper
///
/// Pages through the listing API, checkpointing progress so an interrupted
/// run resumes where it stopped, then exports the collected listings as CSV.
#[derive(Parser, Debug)]
#[command(name = "listing-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable real-estate listing scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Starting page number
    #[arg(long)]
    start_page: Option<u32>,

    /// Ending page number (estimated from the sitemap when omitted)
    #[arg(long)]
    end_page: Option<u32>,

    /// Number of properties to collect before saving
    #[arg(long)]
    batch_size: Option<usize>,

    /// Number of concurrent workers for --parallel
    #[arg(long)]
    workers: Option<usize>,

    /// Requests per second across all workers
    #[arg(long)]
    rate_limit: Option<f64>,

    /// Split the page range across concurrent workers
    #[arg(long)]
    parallel: bool,

    /// Serve repeated page requests from the response cache
    #[arg(long)]
    use_cache: bool,

    /// Remove every cached response before starting
    #[arg(long)]
    clear_cache: bool,

    /// Only retry previously failed pages
    #[arg(long, conflicts_with_all = ["parallel", "export_only"])]
    retry_failed_only: bool,

    /// Disable automatic last page detection
    #[arg(long)]
    disable_auto_detect: bool,

    /// Skip retrying failed pages
    #[arg(long)]
    no_retry: bool,

    /// Export the already collected data to CSV without scraping
    #[arg(long, conflicts_with = "parallel")]
    export_only: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match load_or_default(cli.config.as_deref()) {
        Ok(config) => apply_overrides(config, &cli),
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    let scraping = !cli.export_only && !cli.retry_failed_only;
    let checked = validate(&config).and_then(|()| {
        if scraping {
            validate_page_range(&config, cli.end_page)
        } else {
            Ok(())
        }
    });
    if let Err(e) = checked {
        tracing::error!("Invalid command-line options: {}", e);
        return Err(e.into());
    }

    let started = Instant::now();

    if cli.clear_cache {
        clear_cache(&config);
    }

    let records = if cli.export_only {
        load_collected(&config)?
    } else {
        let cache = open_cache(&config, cli.use_cache);
        if cli.retry_failed_only {
            handle_retry_failed(&config, &cli, cache).await?
        } else if cli.parallel {
            handle_parallel(&config, &cli, cache).await?
        } else {
            handle_single(&config, &cli, cache).await?
        }
    };

    let unique = dedup_by_identity(records);
    tracing::info!("Collected {} unique properties", unique.len());

    let csv_path = config.output.directory.join(&config.output.processed_file);
    let rows = write_csv(&unique, &csv_path)?;

    tracing::info!("Total execution time: {:?}", started.elapsed());
    if !cli.quiet {
        println!("✓ {} properties exported to {}", rows, csv_path.display());
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvest=info,warn"),
            1 => EnvFilter::new("listing_harvest=debug,info"),
            2 => EnvFilter::new("listing_harvest=trace,debug"),
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

/// Command-line flags win over the configuration file
fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(output) = &cli.output {
        config.output.directory = output.clone();
    }
    if let Some(start_page) = cli.start_page {
        config.scrape.start_page = start_page;
    }
    if let Some(batch_size) = cli.batch_size {
        config.scrape.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        config.fanout.workers = workers;
    }
    if let Some(rate_limit) = cli.rate_limit {
        config.fanout.rate_limit = rate_limit;
    }
    config
}

fn scrape_options(config: &Config, cli: &Cli) -> ScrapeOptions {
    ScrapeOptions {
        end_page: cli.end_page,
        retry_failed: !cli.no_retry,
        detect_last_page: !cli.disable_auto_detect,
        ..ScrapeOptions::from_config(config)
    }
}

fn clear_cache(config: &Config) {
    let dir = &config.output.cache_dir;
    if !dir.exists() {
        tracing::info!("Cache directory does not exist: {}", dir.display());
        return;
    }

    match ResponseCache::open(dir) {
        Ok(cache) => {
            let removed = cache.clear();
            tracing::info!("Cleared {} entries from cache directory {}", removed, dir.display());
        }
        Err(e) => tracing::warn!("Failed to open cache directory {}: {}", dir.display(), e),
    }
}

/// Opens the response cache and sweeps expired entries, if caching is on
fn open_cache(config: &Config, enabled: bool) -> Option<ResponseCache> {
    if !enabled {
        return None;
    }

    match ResponseCache::with_ttl(&config.output.cache_dir, config.output.cache_ttl()) {
        Ok(cache) => {
            let swept = cache.sweep_expired();
            tracing::info!(
                "Using response cache at {} ({} expired entries removed)",
                cache.dir().display(),
                swept
            );
            Some(cache)
        }
        Err(e) => {
            tracing::warn!("Cache unavailable, continuing without it: {}", e);
            None
        }
    }
}

fn sitemap_oracle(config: &Config, fetcher: &HttpFetcher) -> SitemapOracle {
    SitemapOracle::new(
        fetcher.client().clone(),
        &config.api.base_url,
        &config.api.sitemap_path,
        config.filters.page_size,
        config.scrape.default_end_page,
    )
    .with_user_agents(config.api.user_agents.clone())
}

/// Handles the default mode: one orchestrator over the whole range
async fn handle_single(
    config: &Config,
    cli: &Cli,
    cache: Option<ResponseCache>,
) -> Result<Vec<PropertyRecord>, Box<dyn std::error::Error>> {
    tracing::info!("Starting single-process scrape");

    let fetcher = HttpFetcher::from_config(config, cache)?;
    let oracle = sitemap_oracle(config, &fetcher);
    let store = FileStore::new(StorePaths::from_output(&config.output));

    let mut orchestrator = Orchestrator::new(fetcher, store, scrape_options(config, cli))
        .with_sitemap_oracle(oracle);
    let records = orchestrator.run().await;

    tracing::info!(
        "Scrape ended in state {:?} after page {} with {} failed pages",
        orchestrator.phase(),
        orchestrator.last_completed_page(),
        orchestrator.failed_pages().len()
    );
    Ok(records)
}

/// Handles --parallel: fan the range out over concurrent workers
async fn handle_parallel(
    config: &Config,
    cli: &Cli,
    cache: Option<ResponseCache>,
) -> Result<Vec<PropertyRecord>, Box<dyn std::error::Error>> {
    let end_page = match cli.end_page {
        Some(end_page) => end_page,
        None if cli.disable_auto_detect => config.scrape.default_end_page,
        None => {
            let sitemap_fetcher = HttpFetcher::from_config(config, None)?;
            sitemap_oracle(config, &sitemap_fetcher).estimate_upper_bound().await
        }
    };

    let options = ScrapeOptions {
        batch_size: config.fanout.worker_batch_size,
        ..scrape_options(config, cli)
    };

    let driver = FanoutDriver::new(&config.output.directory, options);
    let records = driver
        .run(
            config.scrape.start_page,
            end_page,
            config.fanout.workers,
            config.fanout.rate_limit,
            |_, _| HttpFetcher::from_config(config, cache.clone()),
        )
        .await?;
    Ok(records)
}

/// Handles --retry-failed-only: re-fetch the pages in the failed ledger
async fn handle_retry_failed(
    config: &Config,
    cli: &Cli,
    cache: Option<ResponseCache>,
) -> Result<Vec<PropertyRecord>, Box<dyn std::error::Error>> {
    let fetcher = HttpFetcher::from_config(config, cache)?;
    let store = FileStore::new(StorePaths::from_output(&config.output));

    let mut orchestrator = Orchestrator::new(fetcher, store, scrape_options(config, cli));
    Ok(orchestrator.retry_failed_only().await)
}

/// Handles --export-only: read back what earlier runs collected
fn load_collected(config: &Config) -> Result<Vec<PropertyRecord>, Box<dyn std::error::Error>> {
    let store = FileStore::new(StorePaths::from_output(&config.output));
    tracing::info!("Loading collected data from {}", store.paths().data.display());

    let records = store.load_records()?;
    tracing::info!("Loaded {} properties", records.len());
    Ok(records)
}
