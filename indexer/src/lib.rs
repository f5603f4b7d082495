//! Parallel index build: stored pages in, postings and corpus stats out.
//!
//! A feeder thread streams metadata to a pool of analysis workers over a
//! bounded channel. Workers send one `PartialIndex` per document to the
//! calling thread, which is the only writer of the `InvertedIndex`.

use anyhow::{Context, Result};
use crossbeam::channel;
use sift_core::html;
use sift_core::tokenizer;
use sift_core::{DocMetadata, DocumentStore, IndexStore, InvertedIndex, KeyValueStore, ObjectStore, PartialIndex, Stats};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

const FEED_BUFFER: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Distinct documents merged into the index.
    pub documents: usize,
    /// Documents skipped because their body was missing or unreadable.
    pub failed: usize,
    /// Documents whose content hash was already merged.
    pub duplicates: usize,
    pub terms: usize,
    pub avg_doc_length: f64,
    pub failed_writes: usize,
}

pub struct IndexBuilder {
    pages: Arc<dyn ObjectStore>,
    docs: Arc<dyn DocumentStore>,
    index: IndexStore<Arc<dyn KeyValueStore>>,
    workers: usize,
}

impl IndexBuilder {
    pub fn new(pages: Arc<dyn ObjectStore>, docs: Arc<dyn DocumentStore>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { pages, docs, index: IndexStore::new(kv), workers: num_cpus::get() }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Indexes every stored document and persists the result. Fails only if
    /// the metadata cannot be listed or the worker pool cannot start.
    pub fn build(&self) -> Result<BuildReport> {
        let metas = self.docs.list_metadata().context("list document metadata")?;
        info!(documents = metas.len(), workers = self.workers, "index build starting");

        let (index, failed, duplicates) = self.merge_all(metas)?;
        let terms = index.term_count();
        let documents = index.total_docs() as usize;
        let stats = Stats {
            built_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            ..index.stats()
        };
        let failed_writes = self.persist(index, &stats);

        let report = BuildReport {
            documents,
            failed,
            duplicates,
            terms,
            avg_doc_length: stats.avg_doc_length,
            failed_writes,
        };
        info!(?report, "index build complete");
        Ok(report)
    }

    fn merge_all(&self, metas: Vec<DocMetadata>) -> Result<(InvertedIndex, usize, usize)> {
        let failed = AtomicUsize::new(0);
        let (index, duplicates) = thread::scope(|s| -> Result<(InvertedIndex, usize)> {
            let (meta_tx, meta_rx) = channel::bounded::<DocMetadata>(FEED_BUFFER);
            let (part_tx, part_rx) = channel::bounded::<PartialIndex>(FEED_BUFFER);

            for id in 0..self.workers {
                let rx = meta_rx.clone();
                let tx = part_tx.clone();
                let failed = &failed;
                thread::Builder::new()
                    .name(format!("index-worker-{id}"))
                    .spawn_scoped(s, move || {
                        for meta in rx {
                            match self.analyze_document(&meta) {
                                Ok(Some(partial)) => {
                                    if tx.send(partial).is_err() {
                                        break;
                                    }
                                }
                                Ok(None) => {
                                    warn!(hash = %meta.hash, url = %meta.url, "page body missing, skipping");
                                    failed.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(err) => {
                                    warn!(hash = %meta.hash, error = %err, "document analysis failed, skipping");
                                    failed.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                    })
                    .with_context(|| format!("spawn index worker {id}"))?;
            }
            drop(meta_rx);
            drop(part_tx);

            s.spawn(move || {
                for meta in metas {
                    if meta_tx.send(meta).is_err() {
                        break;
                    }
                }
            });

            let mut index = InvertedIndex::new();
            let mut duplicates = 0;
            for partial in part_rx {
                let hash = partial.doc_id.clone();
                if !index.merge(partial) {
                    debug!(%hash, "duplicate content hash");
                    duplicates += 1;
                }
            }
            Ok((index, duplicates))
        })?;
        Ok((index, failed.into_inner(), duplicates))
    }

    fn analyze_document(&self, meta: &DocMetadata) -> Result<Option<PartialIndex>> {
        let Some(body) = self
            .pages
            .get_bytes(&meta.hash)
            .with_context(|| format!("load page {}", meta.hash))?
        else {
            return Ok(None);
        };
        let text = html::visible_text(&body);
        Ok(Some(PartialIndex {
            doc_id: meta.hash.clone(),
            content_length: body.len(),
            analysis: tokenizer::analyze(&text),
        }))
    }

    /// Writes postings per term, then document lengths, then stats. Returns
    /// the number of keys that failed to write.
    fn persist(&self, index: InvertedIndex, stats: &Stats) -> usize {
        let (postings, lengths) = index.into_parts();
        let mut failed_writes = 0;
        for (term, list) in &postings {
            if let Err(err) = self.index.save_postings_for_term(term, list) {
                warn!(%term, error = %err, "postings write failed");
                failed_writes += 1;
            }
        }
        for (hash, length) in &lengths {
            if let Err(err) = self.index.save_doc_length(hash, *length) {
                warn!(%hash, error = %err, "doc length write failed");
                failed_writes += 1;
            }
        }
        if let Err(err) = self.index.save_stats(stats) {
            warn!(error = %err, "stats write failed");
            failed_writes += 1;
        }
        if let Err(err) = self.index.flush() {
            warn!(error = %err, "index flush failed");
        }
        failed_writes
    }
}
