use anyhow::Result;
use clap::{Parser, Subcommand};
use sift_core::{DataPaths, FsDocumentStore, FsObjectStore, SledStore};
use sift_indexer::IndexBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build the BM25 inverted index from crawled pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every page under the data directory
    Build {
        /// Root of the data directory written by the crawler
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        /// Number of analysis workers (defaults to available CPUs)
        #[arg(long)]
        workers: Option<usize>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { data_dir, workers } => build_index(&data_dir, workers),
    }
}

fn build_index(data_dir: &Path, workers: Option<usize>) -> Result<()> {
    let paths = DataPaths::new(data_dir);
    let pages = FsObjectStore::open(paths.pages())?.with_extension("html");
    let docs = FsDocumentStore::open(paths.metadata())?;
    let kv = SledStore::open(paths.index())?;

    let mut builder = IndexBuilder::new(Arc::new(pages), Arc::new(docs), Arc::new(kv));
    if let Some(n) = workers {
        builder = builder.with_workers(n);
    }
    let report = builder.build()?;
    tracing::info!(
        documents = report.documents,
        terms = report.terms,
        failed = report.failed,
        failed_writes = report.failed_writes,
        index = %paths.index().display(),
        "index written"
    );
    Ok(())
}
