use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::tokenizer::Analysis;

/// Lowercase hex SHA-256 of a document body.
pub type DocHash = String;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub url: String,
    pub depth: u32,
    pub title: String,
    pub hash: DocHash,
    #[serde(default)]
    pub images: Vec<String>,
    pub content_length: usize,
    /// RFC 3339 timestamp of the fetch.
    pub crawled_at: String,
    #[serde(default)]
    pub first_paragraph: String,
}

impl DocMetadata {
    /// Stand-in for an indexed document whose metadata record is gone.
    pub fn hash_only(hash: &str) -> Self {
        Self { hash: hash.to_string(), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocHash,
    pub count: u32,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc_id: impl Into<DocHash>, positions: Vec<u32>) -> Self {
        Self { doc_id: doc_id.into(), count: positions.len() as u32, positions }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub avg_doc_length: f64,
    pub total_docs: u64,
    #[serde(default)]
    pub built_at: String,
}

/// What one indexing worker produces for one document.
#[derive(Debug, Clone)]
pub struct PartialIndex {
    pub doc_id: DocHash,
    pub content_length: usize,
    pub analysis: Analysis,
}

/// In-memory inverted index for a single build. Fed by exactly one merging
/// consumer; postings are appended, so their order within a term follows
/// arrival order and carries no meaning.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>,
    doc_lengths: HashMap<DocHash, u32>,
    seen: HashSet<DocHash>,
    total_length: u64,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Merge one document. Returns false, and changes nothing, when the same
    /// content hash was already merged in this build.
    pub fn merge(&mut self, partial: PartialIndex) -> bool {
        if !self.seen.insert(partial.doc_id.clone()) {
            return false;
        }
        let PartialIndex { doc_id, content_length, analysis } = partial;
        for (term, positions) in analysis.positions {
            self.postings.entry(term).or_default().push(Posting::new(doc_id.clone(), positions));
        }
        self.total_length += content_length as u64;
        self.doc_lengths.insert(doc_id, content_length.min(u32::MAX as usize) as u32);
        true
    }

    pub fn total_docs(&self) -> u64 { self.seen.len() as u64 }

    pub fn term_count(&self) -> usize { self.postings.len() }

    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(Vec::as_slice)
    }

    pub fn stats(&self) -> Stats {
        let total_docs = self.total_docs();
        let avg_doc_length = if total_docs == 0 { 0.0 } else { self.total_length as f64 / total_docs as f64 };
        Stats { avg_doc_length, total_docs, built_at: String::new() }
    }

    /// Hands the merged postings and document lengths over for persistence.
    pub fn into_parts(self) -> (HashMap<String, Vec<Posting>>, HashMap<DocHash, u32>) {
        (self.postings, self.doc_lengths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::analyze;

    fn partial(doc_id: &str, text: &str, len: usize) -> PartialIndex {
        PartialIndex { doc_id: doc_id.into(), content_length: len, analysis: analyze(text) }
    }

    #[test]
    fn merge_appends_one_posting_per_term() {
        let mut idx = InvertedIndex::new();
        assert!(idx.merge(partial("a", "cat dog cat", 100)));
        assert!(idx.merge(partial("b", "dog bird", 50)));

        let cat = idx.postings("cat").unwrap();
        assert_eq!(cat.len(), 1);
        assert_eq!(cat[0].count, 2);
        assert_eq!(cat[0].positions, vec![0, 2]);

        let mut dog: Vec<&str> = idx.postings("dog").unwrap().iter().map(|p| p.doc_id.as_str()).collect();
        dog.sort();
        assert_eq!(dog, vec!["a", "b"]);
        assert_eq!(idx.term_count(), 3);
    }

    #[test]
    fn stats_average_content_length() {
        let mut idx = InvertedIndex::new();
        idx.merge(partial("a", "cat", 100));
        idx.merge(partial("b", "dog", 50));
        let stats = idx.stats();
        assert_eq!(stats.total_docs, 2);
        assert!((stats.avg_doc_length - 75.0).abs() < 1e-9);
    }

    #[test]
    fn empty_index_has_zero_average() {
        let stats = InvertedIndex::new().stats();
        assert_eq!(stats.total_docs, 0);
        assert_eq!(stats.avg_doc_length, 0.0);
    }

    #[test]
    fn duplicate_hash_is_merged_once() {
        let mut idx = InvertedIndex::new();
        assert!(idx.merge(partial("a", "cat", 10)));
        assert!(!idx.merge(partial("a", "cat", 10)));
        assert_eq!(idx.postings("cat").unwrap().len(), 1);
        assert_eq!(idx.total_docs(), 1);
        assert_eq!(idx.stats().avg_doc_length, 10.0);
    }
}
