use anyhow::{anyhow, Result};
use sift_core::memory::{MemoryDocumentStore, MemoryKv, MemoryObjectStore};
use sift_core::{DocMetadata, DocumentStore, IndexStore, KeyValueStore, ObjectStore};
use sift_indexer::IndexBuilder;
use std::sync::Arc;

struct Corpus {
    pages: Arc<MemoryObjectStore>,
    docs: Arc<MemoryDocumentStore>,
    kv: Arc<MemoryKv>,
}

impl Corpus {
    fn new() -> Self {
        Self {
            pages: Arc::new(MemoryObjectStore::new()),
            docs: Arc::new(MemoryDocumentStore::new()),
            kv: Arc::new(MemoryKv::new()),
        }
    }

    fn add(&self, hash: &str, body: &str) {
        self.pages.put_bytes(hash, body.as_bytes()).unwrap();
        self.add_metadata_only(hash);
    }

    fn add_metadata_only(&self, hash: &str) {
        let meta = DocMetadata {
            hash: hash.to_string(),
            url: format!("https://site.test/{hash}"),
            ..Default::default()
        };
        self.docs.put_metadata(&meta).unwrap();
    }

    fn builder(&self) -> IndexBuilder {
        IndexBuilder::new(self.pages.clone(), self.docs.clone(), self.kv.clone()).with_workers(3)
    }

    fn index(&self) -> IndexStore<Arc<MemoryKv>> {
        IndexStore::new(self.kv.clone())
    }
}

fn page(text: &str) -> String {
    format!("<html><head><title>ignored heading</title></head><body><p>{text}</p><script>var bird = 1;</script></body></html>")
}

#[test]
fn postings_carry_counts_and_positions() {
    let corpus = Corpus::new();
    let a = page("cat dog cat");
    let b = page("dog bird");
    corpus.add("a", &a);
    corpus.add("b", &b);

    let report = corpus.builder().build().unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.failed_writes, 0);
    assert_eq!(report.terms, 3);

    let index = corpus.index();
    let cat = index.load_postings_for_term("cat").unwrap();
    assert_eq!(cat.len(), 1);
    assert_eq!(cat[0].doc_id, "a");
    assert_eq!(cat[0].count, 2);
    assert_eq!(cat[0].positions, vec![0, 2]);

    let mut dog: Vec<String> = index.load_postings_for_term("dog").unwrap().into_iter().map(|p| p.doc_id).collect();
    dog.sort();
    assert_eq!(dog, vec!["a", "b"]);

    for term in ["cat", "dog", "bird"] {
        for posting in index.load_postings_for_term(term).unwrap() {
            assert_eq!(posting.count as usize, posting.positions.len());
            assert!(posting.positions.windows(2).all(|w| w[0] < w[1]));
        }
    }
    assert!(index.load_postings_for_term("ignor").unwrap().is_empty());
}

#[test]
fn stats_and_doc_lengths_use_body_bytes() {
    let corpus = Corpus::new();
    let a = page("cat dog cat");
    let b = page("dog bird");
    corpus.add("a", &a);
    corpus.add("b", &b);

    let report = corpus.builder().build().unwrap();
    let expected_avg = (a.len() + b.len()) as f64 / 2.0;
    assert!((report.avg_doc_length - expected_avg).abs() < 1e-9);

    let index = corpus.index();
    assert_eq!(index.load_doc_length("a").unwrap(), Some(a.len() as u32));
    assert_eq!(index.load_doc_length("b").unwrap(), Some(b.len() as u32));
    let stats = index.load_stats().unwrap().expect("stats written");
    assert_eq!(stats.total_docs, 2);
    assert!((stats.avg_doc_length - expected_avg).abs() < 1e-9);
    assert!(!stats.built_at.is_empty());
}

#[test]
fn empty_corpus_writes_zero_stats() {
    let corpus = Corpus::new();
    let report = corpus.builder().build().unwrap();
    assert_eq!(report.documents, 0);
    assert_eq!(report.terms, 0);
    assert_eq!(report.avg_doc_length, 0.0);

    let stats = corpus.index().load_stats().unwrap().expect("stats written");
    assert_eq!(stats.total_docs, 0);
    assert_eq!(stats.avg_doc_length, 0.0);
}

#[test]
fn missing_body_skips_only_that_document() {
    let corpus = Corpus::new();
    corpus.add("a", &page("cat"));
    corpus.add_metadata_only("gone");

    let report = corpus.builder().build().unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(corpus.index().load_doc_length("gone").unwrap(), None);
    assert_eq!(corpus.index().load_stats().unwrap().unwrap().total_docs, 1);
}

/// Lists every record twice, as a store holding two crawls of one page would.
struct Doubled(Arc<MemoryDocumentStore>);

impl DocumentStore for Doubled {
    fn list_metadata(&self) -> Result<Vec<DocMetadata>> {
        let once = self.0.list_metadata()?;
        Ok(once.iter().cloned().chain(once.iter().cloned()).collect())
    }
    fn get_metadata(&self, hash: &str) -> Result<Option<DocMetadata>> { self.0.get_metadata(hash) }
    fn get_batch_metadata(&self, hashes: &[String]) -> Result<Vec<DocMetadata>> { self.0.get_batch_metadata(hashes) }
    fn put_metadata(&self, meta: &DocMetadata) -> Result<()> { self.0.put_metadata(meta) }
}

#[test]
fn duplicate_hashes_are_indexed_once() {
    let corpus = Corpus::new();
    let a = page("cat cat");
    corpus.add("a", &a);

    let builder = IndexBuilder::new(corpus.pages.clone(), Arc::new(Doubled(corpus.docs.clone())), corpus.kv.clone());
    let report = builder.build().unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(corpus.index().load_postings_for_term("cat").unwrap().len(), 1);
    assert!((report.avg_doc_length - a.len() as f64).abs() < 1e-9);
}

#[test]
fn rebuild_replaces_postings_per_term() {
    let corpus = Corpus::new();
    corpus.add("a", &page("cat"));
    corpus.builder().build().unwrap();
    corpus.add("b", &page("cat"));
    corpus.builder().build().unwrap();

    let mut docs: Vec<String> = corpus.index().load_postings_for_term("cat").unwrap().into_iter().map(|p| p.doc_id).collect();
    docs.sort();
    assert_eq!(docs, vec!["a", "b"]);
    assert_eq!(corpus.index().load_stats().unwrap().unwrap().total_docs, 2);
}

struct ReadOnlyKv;

impl KeyValueStore for ReadOnlyKv {
    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> { Ok(None) }
    fn set(&self, key: &[u8], _value: &[u8]) -> Result<()> {
        Err(anyhow!("read-only store rejected {}", String::from_utf8_lossy(key)))
    }
}

#[test]
fn write_failures_are_counted_not_fatal() {
    let corpus = Corpus::new();
    corpus.add("a", &page("cat dog"));
    corpus.add("b", &page("bird"));

    let builder = IndexBuilder::new(corpus.pages.clone(), corpus.docs.clone(), Arc::new(ReadOnlyKv));
    let report = builder.build().unwrap();
    assert_eq!(report.documents, 2);
    // three terms, two doc lengths, one stats record
    assert_eq!(report.failed_writes, 6);
}
