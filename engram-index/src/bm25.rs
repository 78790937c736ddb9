//! Okapi BM25 lexical scorer.
//!
//! Corpus statistics (document frequency, document count, average length)
//! are maintained incrementally as memories are ingested; idf is computed
//! against the statistics current at query time.

use std::collections::HashMap;

const K1: f64 = 1.5;
const B: f64 = 0.75;

/// Lowercase, replace non-alphanumerics with spaces, split on whitespace,
/// and drop tokens of length <= 2.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Corpus-level BM25 state.
#[derive(Debug, Clone, Default)]
pub struct Bm25Stats {
    doc_freq: HashMap<String, usize>,
    doc_count: usize,
    total_tokens: usize,
}

impl Bm25Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one document into the corpus statistics.
    pub fn add_document(&mut self, text: &str) {
        let tokens = tokenize(text);
        self.total_tokens += tokens.len();
        self.doc_count += 1;

        let mut seen: HashMap<&str, ()> = HashMap::new();
        for token in &tokens {
            if seen.insert(token.as_str(), ()).is_none() {
                *self.doc_freq.entry(token.clone()).or_insert(0) += 1;
            }
        }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// Average document length in tokens over the corpus.
    pub fn avgdl(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.doc_count as f64
        }
    }

    /// idf(t) = ln((N - df + 0.5) / (df + 0.5) + 1). Never negative.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.doc_count as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }

    /// BM25 score of `doc` against `query`. Zero when no query token
    /// appears in the document, or when the corpus is empty.
    pub fn score(&self, query: &str, doc: &str) -> f64 {
        if self.doc_count == 0 {
            return 0.0;
        }
        let doc_tokens = tokenize(doc);
        if doc_tokens.is_empty() {
            return 0.0;
        }
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for t in &doc_tokens {
            *term_freq.entry(t.as_str()).or_insert(0) += 1;
        }

        let dl = doc_tokens.len() as f64;
        let avgdl = self.avgdl().max(f64::MIN_POSITIVE);

        let mut total = 0.0;
        for term in tokenize(query) {
            let tf = term_freq.get(term.as_str()).copied().unwrap_or(0) as f64;
            if tf == 0.0 {
                continue;
            }
            let idf = self.idf(&term);
            total += idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avgdl));
        }
        total
    }

    /// Score a slice of documents, keeping their input indices.
    pub fn batch_score<'a>(&self, query: &str, docs: &[&'a str]) -> Vec<(usize, &'a str, f64)> {
        docs.iter()
            .enumerate()
            .map(|(i, doc)| (i, *doc, self.score(query, doc)))
            .collect()
    }
}
