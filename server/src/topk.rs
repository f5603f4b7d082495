//! Bounded-heap top-k selection and page slicing over scored candidates.

use ordered_float::OrderedFloat;
use sift_core::DocHash;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One document's accumulated score for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub doc: DocHash,
    pub score: f64,
    /// Distinct query terms found in the document.
    pub matched: u32,
}

/// Greater means ranked earlier: score, then matched terms, then doc hash
/// ascending. The trailing index maps a key back into the candidate slice.
type RankKey<'a> = (OrderedFloat<f64>, u32, Reverse<&'a str>, usize);

fn rank_key(idx: usize, c: &Candidate) -> RankKey<'_> {
    (OrderedFloat(c.score), c.matched, Reverse(c.doc.as_str()), idx)
}

/// The best `k` candidates in rank order. O(n log k).
pub fn top_k(candidates: &[Candidate], k: usize) -> Vec<Candidate> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<RankKey<'_>>> = BinaryHeap::with_capacity(k.min(candidates.len()) + 1);
    for (idx, c) in candidates.iter().enumerate() {
        heap.push(Reverse(rank_key(idx, c)));
        if heap.len() > k {
            heap.pop();
        }
    }
    // into_sorted_vec is ascending in Reverse order, i.e. best first.
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse((_, _, _, idx))| candidates[idx].clone())
        .collect()
}

/// Page `page` (1-based, 0 treated as 1) of `count` results. Only the best
/// `page * count` candidates are ever ordered.
pub fn paginate(candidates: &[Candidate], page: usize, count: usize) -> Vec<Candidate> {
    let page = page.max(1);
    let offset = (page - 1).saturating_mul(count);
    if count == 0 || offset >= candidates.len() {
        return Vec::new();
    }
    let best = top_k(candidates, page.saturating_mul(count));
    let end = (offset + count).min(best.len());
    best[offset..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(doc: &str, score: f64, matched: u32) -> Candidate {
        Candidate { doc: doc.to_string(), score, matched }
    }

    fn docs(list: &[Candidate]) -> Vec<&str> {
        list.iter().map(|c| c.doc.as_str()).collect()
    }

    #[test]
    fn top_k_orders_by_score_then_matched_then_hash() {
        let all = vec![
            cand("d", 1.0, 1),
            cand("a", 3.0, 1),
            cand("c", 2.0, 2),
            cand("b", 2.0, 2),
            cand("e", 2.0, 3),
        ];
        assert_eq!(docs(&top_k(&all, 10)), vec!["a", "e", "b", "c", "d"]);
        assert_eq!(docs(&top_k(&all, 2)), vec!["a", "e"]);
        assert!(top_k(&all, 0).is_empty());
    }

    #[test]
    fn pages_are_contiguous_slices_of_the_ranking() {
        let all: Vec<Candidate> = (0..25).map(|i| cand(&format!("doc{i:02}"), i as f64, 1)).collect();
        let first = paginate(&all, 1, 10);
        let third = paginate(&all, 3, 10);
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].doc, "doc24");
        assert_eq!(first[9].doc, "doc15");
        assert_eq!(docs(&third), vec!["doc04", "doc03", "doc02", "doc01", "doc00"]);
        assert!(paginate(&all, 4, 10).is_empty());
    }

    #[test]
    fn page_zero_is_first_page() {
        let all = vec![cand("a", 1.0, 1), cand("b", 2.0, 1)];
        assert_eq!(docs(&paginate(&all, 0, 1)), vec!["b"]);
        assert!(paginate(&all, 1, 0).is_empty());
        assert!(paginate(&[], 1, 10).is_empty());
    }
}
