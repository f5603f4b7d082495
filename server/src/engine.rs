//! Query evaluation: BM25 over stored postings, phrase bonus, cached
//! candidate sets and paginated top-k.
//!
//! A cache miss scores every (term, posting) pair on a scoped worker pool.
//! Results funnel through one channel into a single accumulator on the
//! calling thread. The full unsorted candidate set is cached under the raw
//! query string; pagination always runs on the cached set.

use crate::topk::{self, Candidate};
use anyhow::{Context, Result};
use crossbeam::channel;
use parking_lot::{Mutex, RwLock};
use sift_core::bm25::{self, Bm25Params};
use sift_core::tokenizer;
use sift_core::{IndexStore, KeyValueStore, LruCache, Posting, Stats};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

const JOB_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub bm25: Bm25Params,
    /// Bonus per adjacent position pair.
    pub phrase_weight: f64,
    /// Adjacent pairs counted per query term pair.
    pub phrase_cap: usize,
    pub cache_capacity: usize,
    pub workers: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            phrase_weight: 0.5,
            phrase_cap: 3,
            cache_capacity: 1000,
            workers: num_cpus::get(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub results: Vec<Candidate>,
    /// Candidates across all pages.
    pub total: usize,
}

struct ScoreJob<'a> {
    doc: &'a str,
    tf: u32,
    idf: f64,
}

pub struct RankingEngine {
    index: IndexStore<Arc<dyn KeyValueStore>>,
    config: RankingConfig,
    stats: RwLock<Stats>,
    cache: Mutex<LruCache<String, Arc<Vec<Candidate>>>>,
}

impl RankingEngine {
    /// Loads corpus stats once. A store with no stats yet ranks against an
    /// empty corpus until `reset`.
    pub fn new(kv: Arc<dyn KeyValueStore>, config: RankingConfig) -> Result<Self> {
        let index = IndexStore::new(kv);
        let stats = load_stats(&index)?;
        Ok(Self {
            index,
            cache: Mutex::new(LruCache::new(config.cache_capacity)),
            config,
            stats: RwLock::new(stats),
        })
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.stats.read().clone()
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drops every cached result set and reloads stats from the store.
    pub fn reset(&self) -> Result<()> {
        let stats = load_stats(&self.index)?;
        *self.stats.write() = stats;
        self.cache.lock().clear();
        Ok(())
    }

    /// Ranks `query` and returns page `page` (1-based) of `count` results.
    pub fn search(&self, query: &str, page: usize, count: usize) -> Result<SearchPage> {
        let terms = tokenizer::query_terms(query);
        if terms.is_empty() {
            return Ok(SearchPage::default());
        }

        let cached = self.cache.lock().get(query).cloned();
        let candidates = match cached {
            Some(hit) => {
                debug!(query, "result cache hit");
                hit
            }
            None => {
                let scored = Arc::new(self.score(query, &terms)?);
                if let Some((evicted, _)) = self.cache.lock().put(query.to_string(), scored.clone()) {
                    debug!(%evicted, "result cache eviction");
                }
                scored
            }
        };

        Ok(SearchPage { results: topk::paginate(&candidates, page, count), total: candidates.len() })
    }

    fn score(&self, query: &str, terms: &[String]) -> Result<Vec<Candidate>> {
        let stats = self.stats();
        let mut postings: HashMap<&str, Vec<Posting>> = HashMap::with_capacity(terms.len());
        for term in terms {
            let list = self
                .index
                .load_postings_for_term(term)
                .with_context(|| format!("load postings for {term:?}"))?;
            postings.insert(term.as_str(), list);
        }

        let mut jobs = Vec::new();
        for (term, list) in &postings {
            let idf = bm25::idf(stats.total_docs, list.len() as u64);
            debug!(term, postings = list.len(), idf, "scoring term");
            jobs.extend(list.iter().map(|p| ScoreJob { doc: p.doc_id.as_str(), tf: p.count, idf }));
        }

        let mut acc = self.score_postings(jobs, stats.avg_doc_length)?;
        self.apply_phrase_bonus(query, &postings, &mut acc);

        Ok(acc
            .into_iter()
            .map(|(doc, (score, matched))| Candidate { doc: doc.to_string(), score, matched })
            .collect())
    }

    /// Fans `jobs` out to the worker pool and folds the results into
    /// doc -> (score, matched terms).
    fn score_postings<'a>(&self, jobs: Vec<ScoreJob<'a>>, avg_doc_len: f64) -> Result<HashMap<&'a str, (f64, u32)>> {
        let mut acc: HashMap<&'a str, (f64, u32)> = HashMap::new();
        if jobs.is_empty() {
            return Ok(acc);
        }
        let workers = self.config.workers.clamp(1, jobs.len());
        let params = self.config.bm25;

        thread::scope(|s| -> Result<()> {
            let (job_tx, job_rx) = channel::bounded::<ScoreJob<'a>>(JOB_BUFFER);
            let (res_tx, res_rx) = channel::bounded::<(&'a str, f64)>(JOB_BUFFER);

            for id in 0..workers {
                let rx = job_rx.clone();
                let tx = res_tx.clone();
                thread::Builder::new()
                    .name(format!("rank-worker-{id}"))
                    .spawn_scoped(s, move || {
                        for job in rx {
                            let doc_len = match self.index.load_doc_length(job.doc) {
                                Ok(Some(len)) => len as f64,
                                Ok(None) => {
                                    warn!(doc = job.doc, "document length missing, skipping");
                                    continue;
                                }
                                Err(err) => {
                                    warn!(doc = job.doc, error = %err, "document length unreadable, skipping");
                                    continue;
                                }
                            };
                            let score = params.term_score(job.idf, job.tf, doc_len, avg_doc_len);
                            if tx.send((job.doc, score)).is_err() {
                                break;
                            }
                        }
                    })
                    .with_context(|| format!("spawn rank worker {id}"))?;
            }
            drop(job_rx);
            drop(res_tx);

            s.spawn(move || {
                for job in jobs {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            for (doc, score) in res_rx {
                let entry = acc.entry(doc).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
            Ok(())
        })?;
        Ok(acc)
    }

    /// Adds `phrase_weight` per adjacent position pair, up to `phrase_cap`
    /// pairs, for each pair of neighbouring query terms. Only documents that
    /// matched at least two terms are considered.
    fn apply_phrase_bonus(&self, query: &str, postings: &HashMap<&str, Vec<Posting>>, acc: &mut HashMap<&str, (f64, u32)>) {
        let pairs = adjacent_term_pairs(query);
        if pairs.is_empty() {
            return;
        }
        let positions: HashMap<&str, HashMap<&str, &[u32]>> = postings
            .iter()
            .map(|(term, list)| {
                let by_doc = list.iter().map(|p| (p.doc_id.as_str(), p.positions.as_slice())).collect::<HashMap<_, _>>();
                (*term, by_doc)
            })
            .collect();

        for (doc, (score, matched)) in acc.iter_mut() {
            if *matched < 2 {
                continue;
            }
            for (first, second) in &pairs {
                let (Some(p1), Some(p2)) = (
                    positions.get(first.as_str()).and_then(|m| m.get(*doc)),
                    positions.get(second.as_str()).and_then(|m| m.get(*doc)),
                ) else {
                    continue;
                };
                let hits = bm25::adjacent_pairs(p1, p2).min(self.config.phrase_cap);
                *score += self.config.phrase_weight * hits as f64;
            }
        }
    }
}

fn load_stats(index: &IndexStore<Arc<dyn KeyValueStore>>) -> Result<Stats> {
    match index.load_stats().context("load index stats")? {
        Some(stats) => Ok(stats),
        None => {
            warn!("no index stats found, ranking against an empty corpus");
            Ok(Stats::default())
        }
    }
}

/// Distinct ordered pairs of neighbouring query terms, skipping a term
/// followed by itself.
fn adjacent_term_pairs(query: &str) -> Vec<(String, String)> {
    let seq: Vec<String> = tokenizer::tokenize(query).into_iter().map(|(t, _)| t).collect();
    let mut seen = HashSet::new();
    seq.windows(2)
        .filter(|w| w[0] != w[1])
        .map(|w| (w[0].clone(), w[1].clone()))
        .filter(|pair| seen.insert(pair.clone()))
        .collect()
}
