//! Prefix suggestions from the n-grams of previously served queries.

use parking_lot::RwLock;
use std::collections::BTreeMap;

pub const DEFAULT_LIMIT: usize = 10;
pub const CANDIDATE_CAP: usize = 200;

/// Counts of lowercase word 1-, 2- and 3-grams, kept in lexicographic order
/// so a prefix lookup is a range scan.
#[derive(Default)]
pub struct Suggester {
    ngrams: RwLock<BTreeMap<String, u64>>,
}

impl Suggester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ngrams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&self, query: &str) {
        let grams = ngrams(query);
        if grams.is_empty() {
            return;
        }
        let mut map = self.ngrams.write();
        for gram in grams {
            *map.entry(gram).or_insert(0) += 1;
        }
    }

    /// Up to `limit` n-grams starting with `prefix`, most frequent first.
    /// Only the first `CANDIDATE_CAP` matches in lexicographic order compete.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let map = self.ngrams.read();
        let mut candidates: Vec<(&String, u64)> = map
            .range(prefix.clone()..)
            .take_while(|(gram, _)| gram.starts_with(&prefix))
            .take(CANDIDATE_CAP)
            .map(|(gram, count)| (gram, *count))
            .collect();
        // stable sort keeps the alphabetical order among equal counts
        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates.into_iter().take(limit).map(|(gram, _)| gram.clone()).collect()
    }
}

fn ngrams(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let mut out = Vec::new();
    for n in 1..=3 {
        for window in words.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}
