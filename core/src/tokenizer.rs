use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize text into (term, position) using NFKC normalization, lowercase, stopword removal, and stemming.
///
/// Positions count every matched word, stop words included, so two terms are
/// adjacent in the source text exactly when their positions differ by one.
pub fn tokenize(text: &str) -> Vec<(String, u32)> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let mut tokens = Vec::new();
    for (pos, mat) in RE.find_iter(&normalized).enumerate() {
        let token = mat.as_str();
        if is_stopword(token) { continue; }
        let stem = STEMMER.stem(token).to_string();
        tokens.push((stem, pos as u32));
    }
    tokens
}

/// Per-document view of a token stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub term_freqs: HashMap<String, u32>,
    /// Strictly increasing per term.
    pub positions: HashMap<String, Vec<u32>>,
    pub token_count: usize,
}

impl Analysis {
    pub fn is_empty(&self) -> bool { self.token_count == 0 }
}

/// Term frequencies and positions for `text`. Indexing and querying both go
/// through here, so a term indexed as `t` is always queryable as `t`.
pub fn analyze(text: &str) -> Analysis {
    let mut analysis = Analysis::default();
    for (term, pos) in tokenize(text) {
        *analysis.term_freqs.entry(term.clone()).or_insert(0) += 1;
        analysis.positions.entry(term).or_default().push(pos);
        analysis.token_count += 1;
    }
    analysis
}

/// Distinct query terms in first-occurrence order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter_map(|(term, _)| seen.insert(term.clone()).then_some(term))
        .collect()
}
