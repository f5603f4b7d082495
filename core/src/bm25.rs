//! BM25 Okapi scoring and the adjacent-position count used for phrase bonuses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f64,
    /// Length normalization.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Params {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }

    /// The more aggressive setting some deployments ran with.
    pub fn steep() -> Self {
        Self { k1: 2.0, b: 0.9 }
    }

    /// Score contribution of one term in one document.
    ///
    /// # Arguments
    /// * `idf` - from [`idf`]
    /// * `tf` - occurrences of the term in the document
    /// * `doc_len` - length of the document
    /// * `avg_doc_len` - corpus average; a zero average means "no normalization"
    pub fn term_score(&self, idf: f64, tf: u32, doc_len: f64, avg_doc_len: f64) -> f64 {
        let f = tf as f64;
        let ratio = if avg_doc_len > 0.0 { doc_len / avg_doc_len } else { 1.0 };
        let top = f * (self.k1 + 1.0);
        let mut bottom = f + self.k1 * (1.0 - self.b + self.b * ratio);
        if bottom == 0.0 {
            bottom = 0.5;
        }
        idf * (top / bottom)
    }
}

/// IDF: ln((N - n_t + 0.5) / (n_t + 0.5) + 1). Non-negative whenever n_t <= N.
pub fn idf(total_docs: u64, docs_with_term: u64) -> f64 {
    let n = total_docs as f64;
    let nt = docs_with_term as f64;
    let top = n - nt + 0.5;
    let mut bottom = nt + 0.5;
    if bottom == 0.0 {
        bottom = 0.5;
    }
    (top / bottom + 1.0).ln()
}

/// Number of pairs (p1, p2) with p2 == p1 + 1. Both inputs must be sorted
/// ascending; runs in O(len(first) + len(second)).
pub fn adjacent_pairs(first: &[u32], second: &[u32]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < first.len() && j < second.len() {
        let want = first[i] as u64 + 1;
        let have = second[j] as u64;
        if have == want {
            count += 1;
            i += 1;
            j += 1;
        } else if have < want {
            j += 1;
        } else {
            i += 1;
        }
    }
    count
}
