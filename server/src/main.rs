use anyhow::Result;
use axum::Router;
use clap::Parser;
use sift_core::Bm25Params;
use sift_server::{build_app, open_state, RankingConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Root of the data directory written by the crawler and indexer
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// BM25 term frequency saturation
    #[arg(long, default_value_t = 1.2)]
    k1: f64,
    /// BM25 length normalization
    #[arg(long, default_value_t = 0.75)]
    b: f64,
    /// Cached result sets kept in memory
    #[arg(long, default_value_t = 1000)]
    cache_capacity: usize,
    /// Scoring workers per query (defaults to available CPUs)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let defaults = RankingConfig::default();
    let config = RankingConfig {
        bm25: Bm25Params::new(args.k1, args.b),
        cache_capacity: args.cache_capacity,
        workers: args.workers.unwrap_or(defaults.workers),
        ..defaults
    };
    let state = open_state(&args.data_dir, config)?;
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
