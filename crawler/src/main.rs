use anyhow::{anyhow, Context, Result};
use clap::Parser;
use sift_core::store::DEFAULT_METADATA_BATCH;
use sift_core::{BufferedDocumentStore, DataPaths, FsDocumentStore, FsObjectStore};
use sift_crawler::{CrawlConfig, Crawler, HttpFetcher};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl a web graph into the page and metadata stores")]
struct Cli {
    /// Seed URL (repeatable)
    #[arg(long = "seed")]
    seeds: Vec<String>,
    /// File with seed URLs, one per line
    #[arg(long)]
    seeds_file: Option<PathBuf>,
    /// Links deeper than this are not followed
    #[arg(long, default_value_t = 1)]
    max_depth: u32,
    /// Job queue capacity
    #[arg(long, default_value_t = 1000)]
    buffer_size: usize,
    /// Retry rounds for jobs that found the queue full
    #[arg(long, default_value_t = 10)]
    max_rounds: usize,
    /// Number of workers (defaults to available CPUs)
    #[arg(long)]
    workers: Option<usize>,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    #[arg(long, default_value = "sift-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Root of the data directory shared with the indexer and server
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let mut seeds = args.seeds.clone();
    if let Some(path) = &args.seeds_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read seeds file {}", path.display()))?;
        seeds.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }
    if seeds.is_empty() {
        return Err(anyhow!("no seeds given (use --seed or --seeds-file)"));
    }

    let paths = DataPaths::new(&args.data_dir);
    let pages = FsObjectStore::open(paths.pages())?.with_extension("html");
    let docs = BufferedDocumentStore::new(
        FsDocumentStore::open(paths.metadata())?,
        DEFAULT_METADATA_BATCH,
    );
    let fetcher = HttpFetcher::new(&args.user_agent, Duration::from_secs(args.timeout_secs))?;

    let defaults = CrawlConfig::default();
    let config = CrawlConfig {
        seeds,
        max_depth: args.max_depth,
        workers: args.workers.unwrap_or(defaults.workers),
        buffer_size: args.buffer_size,
        max_rounds: args.max_rounds,
    };
    let crawler = Crawler::new(config, Arc::new(fetcher), Arc::new(pages), Arc::new(docs));
    let report = crawler.run()?;
    tracing::info!(
        visited = report.visited,
        fetched = report.fetched,
        failed = report.failed,
        dropped = report.dropped,
        data_dir = %args.data_dir.display(),
        "done"
    );
    Ok(())
}
