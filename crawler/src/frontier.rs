//! Shared state for one crawl run: visited set, skipped jobs, in-flight barrier.
//!
//! Each structure has its own lock and no method holds two of them.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    pub url: String,
    pub depth: u32,
}

impl Job {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self { url: url.into(), depth }
    }

    pub fn child(&self, url: impl Into<String>) -> Self {
        Self { url: url.into(), depth: self.depth + 1 }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (depth {})", self.url, self.depth)
    }
}

#[derive(Default)]
pub struct Visited {
    urls: Mutex<HashSet<String>>,
}

impl Visited {
    pub fn new() -> Self { Self::default() }

    /// Marks `url` as visited. Returns true if it already was.
    pub fn check_and_mark(&self, url: &str) -> bool {
        let mut urls = self.urls.lock();
        if urls.contains(url) {
            return true;
        }
        urls.insert(url.to_string());
        false
    }

    pub fn contains(&self, url: &str) -> bool { self.urls.lock().contains(url) }

    pub fn len(&self) -> usize { self.urls.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Jobs that found the queue full.
#[derive(Default)]
pub struct SkippedJobs {
    jobs: Mutex<Vec<Job>>,
}

impl SkippedJobs {
    pub fn new() -> Self { Self::default() }

    pub fn push(&self, job: Job) { self.jobs.lock().push(job); }

    /// Takes every pending job, leaving the list empty.
    pub fn drain(&self) -> Vec<Job> { std::mem::take(&mut *self.jobs.lock()) }

    pub fn len(&self) -> usize { self.jobs.lock().len() }

    pub fn is_empty(&self) -> bool { self.jobs.lock().is_empty() }
}

/// Count of jobs enqueued but not yet completed, with a wait-for-zero barrier.
#[derive(Default)]
pub struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub fn new() -> Self { Self::default() }

    pub fn add(&self) { *self.count.lock() += 1; }

    pub fn done(&self) {
        let mut count = self.count.lock();
        match count.checked_sub(1) {
            Some(n) => *count = n,
            None => tracing::warn!("in-flight counter already at zero"),
        }
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub fn get(&self) -> usize { *self.count.lock() }

    /// Blocks until the count reaches zero.
    pub fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}
