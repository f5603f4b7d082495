//! Crawl scheduler: a bounded job queue drained by a fixed pool of OS threads.
//!
//! Workers never block on the queue. Children that do not fit go to the
//! skipped list and are retried in rounds once the pool goes idle. The
//! in-flight counter is raised before every enqueue attempt and lowered when
//! the attempt fails or the job completes, so it only reaches zero when no
//! job is queued or running.

use crate::fetch::{Extractor, Fetcher, HtmlExtractor};
use crate::frontier::{InFlight, Job, SkippedJobs, Visited};
use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::select;
use sha2::{Digest, Sha256};
use sift_core::{DocMetadata, DocumentStore, ObjectStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub workers: usize,
    /// Capacity of the job queue.
    pub buffer_size: usize,
    pub max_rounds: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_depth: 1,
            workers: num_cpus::get(),
            buffer_size: 1000,
            max_rounds: 10,
        }
    }
}

/// Counters for one run.
///
/// `discovered == enqueued + skipped` and `skipped == requeued + dropped`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Distinct URLs claimed by a worker.
    pub visited: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Jobs whose URL had already been claimed.
    pub duplicates: usize,
    /// Links within the depth bound.
    pub discovered: usize,
    /// Links discarded for exceeding the depth bound.
    pub beyond_depth: usize,
    /// Links that went straight into the queue.
    pub enqueued: usize,
    /// Links that found the queue full.
    pub skipped: usize,
    pub requeued: usize,
    pub dropped: usize,
    pub rounds: usize,
}

#[derive(Default)]
struct Counters {
    fetched: AtomicUsize,
    failed: AtomicUsize,
    duplicates: AtomicUsize,
    discovered: AtomicUsize,
    beyond_depth: AtomicUsize,
    enqueued: AtomicUsize,
    skipped: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// State shared by the scheduler thread and every worker for one run.
struct RunState {
    jobs: Sender<Job>,
    visited: Visited,
    skipped: SkippedJobs,
    in_flight: InFlight,
    counters: Counters,
}

impl RunState {
    /// Non-blocking enqueue. Gives the job back if the queue refused it.
    fn try_enqueue(&self, job: Job) -> Result<(), Job> {
        self.in_flight.add();
        match self.jobs.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                self.in_flight.done();
                Err(job)
            }
        }
    }
}

pub struct Crawler {
    config: CrawlConfig,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    pages: Arc<dyn ObjectStore>,
    docs: Arc<dyn DocumentStore>,
}

impl Crawler {
    pub fn new(
        config: CrawlConfig,
        fetcher: Arc<dyn Fetcher>,
        pages: Arc<dyn ObjectStore>,
        docs: Arc<dyn DocumentStore>,
    ) -> Self {
        Self { config, fetcher, extractor: Arc::new(HtmlExtractor), pages, docs }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawls from the configured seeds until the frontier is exhausted or the
    /// retry rounds run out. Only a failure to start the worker pool is an error.
    pub fn run(&self) -> Result<CrawlReport> {
        let cfg = &self.config;
        let workers = cfg.workers.max(1);
        let (jobs_tx, jobs_rx) = channel::bounded::<Job>(cfg.buffer_size.max(1));
        let state = RunState {
            jobs: jobs_tx,
            visited: Visited::new(),
            skipped: SkippedJobs::new(),
            in_flight: InFlight::new(),
            counters: Counters::default(),
        };
        info!(
            seeds = cfg.seeds.len(),
            max_depth = cfg.max_depth,
            workers,
            buffer = cfg.buffer_size,
            "crawl starting"
        );

        let (rounds, requeued, dropped) = thread::scope(|s| -> Result<(usize, usize, usize)> {
            // Dropping the sender is the close signal; it goes out of scope on
            // every exit path before the scope joins the workers.
            let (stop_tx, stop_rx) = channel::bounded::<()>(0);
            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let jobs = jobs_rx.clone();
                let stop = stop_rx.clone();
                let state = &state;
                let handle = thread::Builder::new()
                    .name(format!("crawl-worker-{id}"))
                    .spawn_scoped(s, move || self.worker(id, jobs, stop, state))
                    .with_context(|| format!("spawn crawl worker {id}"))?;
                handles.push(handle);
            }

            for seed in &cfg.seeds {
                state.in_flight.add();
                if state.jobs.send(Job::new(seed.as_str(), 0)).is_err() {
                    state.in_flight.done();
                    return Err(anyhow!("job queue closed while seeding"));
                }
            }

            let mut rounds = 0;
            let mut requeued = 0;
            while rounds < cfg.max_rounds {
                state.in_flight.wait_idle();
                if state.skipped.is_empty() {
                    break;
                }
                let batch = state.skipped.drain();
                rounds += 1;
                let total = batch.len();
                let mut queued = 0;
                for job in batch {
                    match state.try_enqueue(job) {
                        Ok(()) => queued += 1,
                        Err(job) => state.skipped.push(job),
                    }
                }
                requeued += queued;
                info!(round = rounds, queued, still_skipped = total - queued, "retry round");
            }

            state.in_flight.wait_idle();
            let dropped = state.skipped.drain().len();
            if dropped > 0 {
                warn!(dropped, "retry rounds exhausted, dropping skipped jobs");
            }

            drop(stop_tx);
            for handle in handles {
                handle.join().map_err(|_| anyhow!("crawl worker panicked"))?;
            }
            Ok((rounds, requeued, dropped))
        })?;

        if let Err(err) = self.docs.flush() {
            warn!(error = %err, "metadata flush failed");
        }

        let c = &state.counters;
        let report = CrawlReport {
            visited: state.visited.len(),
            fetched: c.fetched.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            discovered: c.discovered.load(Ordering::Relaxed),
            beyond_depth: c.beyond_depth.load(Ordering::Relaxed),
            enqueued: c.enqueued.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            requeued,
            dropped,
            rounds,
        };
        info!(?report, "crawl finished");
        Ok(report)
    }

    fn worker(&self, id: usize, jobs: Receiver<Job>, stop: Receiver<()>, state: &RunState) {
        loop {
            select! {
                recv(jobs) -> msg => match msg {
                    Ok(job) => {
                        self.process(&job, state);
                        state.in_flight.done();
                    }
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            }
        }
        debug!(worker = id, "crawl worker exiting");
    }

    fn process(&self, job: &Job, state: &RunState) {
        let max_depth = self.config.max_depth;
        if job.depth > max_depth {
            debug!(%job, "beyond max depth, not fetching");
            return;
        }
        if state.visited.check_and_mark(&job.url) {
            bump(&state.counters.duplicates);
            return;
        }

        let body = match self.fetcher.fetch(&job.url) {
            Ok(body) => body,
            Err(err) => {
                warn!(url = %job.url, error = %err, "fetch failed");
                bump(&state.counters.failed);
                return;
            }
        };
        bump(&state.counters.fetched);

        let page = self.extractor.extract(&job.url, &body);
        for link in &page.links {
            let child = job.child(link.as_str());
            if child.depth > max_depth {
                bump(&state.counters.beyond_depth);
                continue;
            }
            bump(&state.counters.discovered);
            match state.try_enqueue(child) {
                Ok(()) => bump(&state.counters.enqueued),
                Err(child) => {
                    bump(&state.counters.skipped);
                    state.skipped.push(child);
                }
            }
        }

        let hash = content_hash(&body);
        if let Err(err) = self.pages.put_bytes(&hash, &body) {
            warn!(url = %job.url, %hash, error = %err, "page write failed");
        }
        let meta = DocMetadata {
            url: job.url.clone(),
            depth: job.depth,
            title: page.title,
            hash,
            images: page.images,
            content_length: body.len(),
            crawled_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            first_paragraph: page.first_paragraph,
        };
        if let Err(err) = self.docs.put_metadata(&meta) {
            warn!(url = %job.url, error = %err, "metadata write failed");
        }
        debug!(%job, links = page.links.len(), "page stored");
    }
}

/// Lowercase hex SHA-256 of a page body.
pub fn content_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(b"").len(), 64);
    }

    #[test]
    fn default_config_matches_cli_defaults() {
        let cfg = CrawlConfig::default();
        assert_eq!(cfg.max_depth, 1);
        assert_eq!(cfg.buffer_size, 1000);
        assert_eq!(cfg.max_rounds, 10);
        assert!(cfg.workers >= 1);
    }
}
