use sift_core::tokenizer::{analyze, query_terms, tokenize};

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! The café's menu.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // Unicode normalization keeps the accented form intact
    assert!(words.iter().any(|w| w.starts_with("caf")));
}

#[test]
fn it_filters_stopwords() {
    let toks = tokenize("The quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn index_and_query_sides_agree() {
    let doc = analyze("Searching engines index searchable documents");
    for term in query_terms("SEARCH engine documents") {
        assert!(doc.term_freqs.contains_key(&term), "query term {term} missing from document terms");
    }
}

#[test]
fn positions_are_strictly_increasing() {
    let doc = analyze("rust is fast and rust is safe, rust rust");
    for positions in doc.positions.values() {
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
    assert_eq!(doc.term_freqs["rust"], 4);
}
