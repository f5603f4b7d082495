pub mod fetch;
pub mod frontier;
pub mod scheduler;

pub use fetch::{Extractor, Fetcher, HtmlExtractor, HttpFetcher};
pub use frontier::{InFlight, Job, SkippedJobs, Visited};
pub use scheduler::{content_hash, CrawlConfig, CrawlReport, Crawler};
