//! Query evaluation.
//!
//! A query is tokenized with the index-time stop words, each term is weighted
//! by `idf = ln((N + 1) / (df + 1)) + 1`, and documents are scored by the sum
//! of `tf * idf` with `tf = occurrences / document tokens`. A term repeated in
//! the query is counted once per occurrence. Both evaluation orders read the
//! same index statistics and must produce the same score for every document:
//!
//! - term-at-a-time walks each term's postings and accumulates per document;
//! - document-at-a-time walks every document and sums over the query terms.
//!
//! Optionally the scores are normalized to the best candidate and multiplied
//! by `1 + authority`, where documents without an authority score use `1.0`.

mod snippet;

pub use snippet::generate_snippet;

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::store::DocumentStore;
use crate::tokenizer::{tokenize, StopWords};
use crate::DocId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strategy {
    #[default]
    #[serde(rename = "term")]
    TermAtATime,
    #[serde(rename = "document")]
    DocumentAtATime,
}

impl Strategy {
    /// Parse, falling back to term-at-a-time for anything unrecognised.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            tracing::warn!(method = s, "unknown search strategy, using term-at-a-time");
            Strategy::TermAtATime
        })
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "term" => Ok(Strategy::TermAtATime),
            "document" | "doc" => Ok(Strategy::DocumentAtATime),
            other => Err(Error::invalid_config(format!("unknown search strategy: {other}"))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::TermAtATime => f.write_str("term"),
            Strategy::DocumentAtATime => f.write_str("document"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub snippet: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    /// Candidates before truncation to the page size.
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
}

pub struct QueryEngine<S> {
    store: S,
    config: SearchConfig,
    stop_words: StopWords,
    total_documents: usize,
    idf_cache: RwLock<HashMap<String, f64>>,
}

impl<S: DocumentStore> QueryEngine<S> {
    /// `stop_words` is only used when the store does not record the set its index was built with.
    pub fn new(store: S, config: SearchConfig, stop_words: StopWords) -> Result<Self> {
        let stop_words = match store.stop_words()? {
            Some(indexed) => {
                if indexed != stop_words {
                    tracing::warn!("configured stop words differ from the index; using the index's");
                }
                indexed
            }
            None => stop_words,
        };
        let total_documents = store.document_count()?;
        tracing::info!(total_documents, "query engine ready");
        Ok(Self { store, config, stop_words, total_documents, idf_cache: RwLock::new(HashMap::new()) })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Ranked results capped at the configured page size.
    pub fn search(&self, query: &str, strategy: Strategy, use_authority: bool) -> Result<Vec<SearchHit>> {
        Ok(self.search_page(query, strategy, use_authority, self.config.results_per_page)?.hits)
    }

    pub fn search_page(&self, query: &str, strategy: Strategy, use_authority: bool, limit: usize) -> Result<SearchPage> {
        let terms = self.query_terms(query);
        if terms.is_empty() {
            return Ok(SearchPage::default());
        }

        let mut scores = match strategy {
            Strategy::TermAtATime => self.score_term_at_a_time(&terms),
            Strategy::DocumentAtATime => self.score_document_at_a_time(&terms)?,
        };
        if use_authority {
            self.apply_authority(&mut scores);
        }

        let ranked = rank(scores);
        let total_hits = ranked.len();
        let hits = ranked.into_iter().take(limit).map(|(doc_id, score)| self.hit(doc_id, score, &terms)).collect();
        tracing::info!(query, %strategy, use_authority, total_hits, "search complete");
        Ok(SearchPage { total_hits, hits })
    }

    /// Query terms in query order, repeats kept.
    pub fn query_terms(&self, query: &str) -> Vec<String> {
        tokenize(query, &self.stop_words)
    }

    pub fn stop_words(&self) -> &StopWords {
        &self.stop_words
    }

    /// Inverse document frequency, cached per term. Terms in no document weigh 0.
    pub fn idf(&self, term: &str) -> Result<f64> {
        if let Some(&idf) = self.idf_cache.read().get(term) {
            return Ok(idf);
        }
        let df = self.store.document_frequency(term)?;
        let idf = if df == 0 {
            0.0
        } else {
            ((self.total_documents as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0
        };
        self.idf_cache.write().insert(term.to_string(), idf);
        Ok(idf)
    }

    /// Terms with a positive weight, in query order. Lookup failures drop the term.
    fn weighted_terms<'a>(&self, terms: &'a [String]) -> Vec<(&'a str, f64)> {
        terms
            .iter()
            .filter_map(|term| match self.idf(term) {
                Ok(idf) if idf > 0.0 => Some((term.as_str(), idf)),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(term = term.as_str(), %err, "skipping term");
                    None
                }
            })
            .collect()
    }

    fn score_term_at_a_time(&self, terms: &[String]) -> HashMap<DocId, f64> {
        let mut scores: HashMap<DocId, f64> = HashMap::new();
        let mut lengths: HashMap<DocId, Option<u32>> = HashMap::new();
        for (term, idf) in self.weighted_terms(terms) {
            let postings = match self.store.postings(term) {
                Ok(p) => p,
                Err(err) => {
                    tracing::warn!(term, %err, "skipping term");
                    continue;
                }
            };
            for (doc_id, occurrences) in postings {
                let length = *lengths.entry(doc_id).or_insert_with(|| match self.store.document_length(doc_id) {
                    Ok(len) => len,
                    Err(err) => {
                        tracing::warn!(doc_id, %err, "skipping document");
                        None
                    }
                });
                let Some(length) = length.filter(|&l| l > 0) else { continue };
                let tf = occurrences as f64 / length as f64;
                *scores.entry(doc_id).or_insert(0.0) += tf * idf;
            }
        }
        scores
    }

    fn score_document_at_a_time(&self, terms: &[String]) -> Result<HashMap<DocId, f64>> {
        let weighted = self.weighted_terms(terms);
        let mut scores: HashMap<DocId, f64> = HashMap::new();
        if weighted.is_empty() {
            return Ok(scores);
        }
        for doc in self.store.documents()? {
            match self.score_document(doc.id, &weighted) {
                Ok(Some(score)) => {
                    scores.insert(doc.id, score);
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(doc_id = doc.id, %err, "skipping document"),
            }
        }
        Ok(scores)
    }

    /// Sum of `tf * idf` for one document, `None` when it matches no term or has no tokens.
    fn score_document(&self, doc_id: DocId, weighted: &[(&str, f64)]) -> Result<Option<f64>> {
        let Some(length) = self.store.document_length(doc_id)?.filter(|&l| l > 0) else {
            return Ok(None);
        };
        let mut score = 0.0;
        let mut matched = false;
        for &(term, idf) in weighted {
            let occurrences = self.store.occurrences(term, doc_id)?;
            if occurrences > 0 {
                score += occurrences as f64 / length as f64 * idf;
                matched = true;
            }
        }
        Ok(matched.then_some(score))
    }

    fn apply_authority(&self, scores: &mut HashMap<DocId, f64>) {
        if scores.is_empty() {
            return;
        }
        let authority = self.store.authority_scores().unwrap_or_else(|err| {
            tracing::warn!(%err, "authority scores unavailable, using neutral weights");
            HashMap::new()
        });
        let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
        for (doc_id, score) in scores.iter_mut() {
            if max > 0.0 {
                *score /= max;
            }
            *score *= 1.0 + authority.get(doc_id).copied().unwrap_or(1.0);
        }
    }

    fn hit(&self, doc_id: DocId, score: f64, terms: &[String]) -> SearchHit {
        let snippet = match self.store.content(doc_id) {
            Ok(content) => generate_snippet(&content.unwrap_or_default(), terms, self.config.snippet_length),
            Err(err) => {
                tracing::warn!(doc_id, %err, "no snippet");
                String::new()
            }
        };
        let (title, url) = match self.store.document(doc_id) {
            Ok(Some(d)) => (d.title, d.url),
            _ => (String::new(), String::new()),
        };
        SearchHit { doc_id, score, snippet, title, url }
    }
}

/// Score descending, then document id ascending.
fn rank(scores: HashMap<DocId, f64>) -> Vec<(DocId, f64)> {
    let mut ranked: Vec<(DocId, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_all;
    use crate::store::{MemoryStore, ScoreSink};
    use crate::pagerank::AuthorityScores;
    use crate::tokenizer::{default_stop_words, StopWords};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_document("http://a", "A", "rust rust systems");
        store.add_document("http://b", "B", "rust web");
        store.add_document("http://c", "C", "gardening tips");
        build_all(&mut store, &default_stop_words()).unwrap();
        store
    }

    fn engine(store: &MemoryStore) -> QueryEngine<&MemoryStore> {
        QueryEngine::new(store, SearchConfig::default(), default_stop_words()).unwrap()
    }

    #[test]
    fn idf_is_smoothed_and_cached() {
        let s = store();
        let e = engine(&s);
        let expected = (4.0f64 / 3.0).ln() + 1.0;
        assert!((e.idf("rust").unwrap() - expected).abs() < 1e-12);
        assert_eq!(e.idf("missing").unwrap(), 0.0);
        assert_eq!(e.idf_cache.read().len(), 2);
    }

    #[test]
    fn tf_is_normalized_by_document_length() {
        let s = store();
        let e = engine(&s);
        let hits = e.search("rust", Strategy::TermAtATime, false).unwrap();
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![0, 1]);
        let idf = e.idf("rust").unwrap();
        assert!((hits[0].score - 2.0 / 3.0 * idf).abs() < 1e-12);
        assert!((hits[1].score - 0.5 * idf).abs() < 1e-12);
    }

    #[test]
    fn strategies_agree_exactly() {
        let s = store();
        let e = engine(&s);
        for q in ["rust", "rust web systems", "gardening rust", "nothing"] {
            let a = e.search(q, Strategy::TermAtATime, false).unwrap();
            let b = e.search(q, Strategy::DocumentAtATime, false).unwrap();
            let pa: Vec<(DocId, f64)> = a.iter().map(|h| (h.doc_id, h.score)).collect();
            let pb: Vec<(DocId, f64)> = b.iter().map(|h| (h.doc_id, h.score)).collect();
            assert_eq!(pa, pb, "query {q}");
        }
    }

    #[test]
    fn stop_word_query_is_empty() {
        let s = store();
        assert!(engine(&s).search("the and of", Strategy::DocumentAtATime, true).unwrap().is_empty());
    }

    #[test]
    fn authority_multiplies_normalized_scores() {
        let mut s = store();
        s.record(&AuthorityScores::new(1, HashMap::from([(0, 0.1), (1, 0.9)]))).unwrap();
        let e = engine(&s);
        let hits = e.search("rust", Strategy::TermAtATime, true).unwrap();
        assert_eq!(hits[0].doc_id, 1);
        let b = hits.iter().find(|h| h.doc_id == 1).unwrap();
        let a = hits.iter().find(|h| h.doc_id == 0).unwrap();
        assert!((a.score - 1.1).abs() < 1e-12);
        assert!((b.score - 0.75 * 1.9).abs() < 1e-12);
    }

    #[test]
    fn missing_authority_defaults_to_one() {
        let s = store();
        let e = engine(&s);
        let hits = e.search("rust", Strategy::TermAtATime, true).unwrap();
        assert!((hits[0].score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn page_size_truncates_but_counts_all() {
        let s = store();
        let e = engine(&s);
        let page = e.search_page("rust", Strategy::TermAtATime, false, 1).unwrap();
        assert_eq!(page.total_hits, 2);
        assert_eq!(page.hits.len(), 1);
    }

    #[test]
    fn hits_carry_metadata_and_snippet() {
        let s = store();
        let hits = engine(&s).search("web", Strategy::DocumentAtATime, false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "B");
        assert_eq!(hits[0].url, "http://b");
        assert_eq!(hits[0].snippet, "rust web");
    }

    fn pairs(hits: &[SearchHit]) -> Vec<(DocId, f64)> {
        hits.iter().map(|h| (h.doc_id, h.score)).collect()
    }

    #[test]
    fn index_stop_words_override_configured_ones() {
        let mut s = MemoryStore::new();
        s.add_document("http://a", "A", "the machine and the learning of the machine");
        s.add_document("http://b", "B", "machine");
        build_all(&mut s, &default_stop_words()).unwrap();

        let e = QueryEngine::new(&s, SearchConfig::default(), StopWords::new()).unwrap();
        assert_eq!(e.stop_words(), &default_stop_words());
        assert!(e.search("the of", Strategy::TermAtATime, false).unwrap().is_empty());
        for use_authority in [false, true] {
            let term = e.search("machine", Strategy::TermAtATime, use_authority).unwrap();
            let doc = e.search("machine", Strategy::DocumentAtATime, use_authority).unwrap();
            assert_eq!(pairs(&term), pairs(&doc));
        }
    }

    #[test]
    fn unindexed_content_change_does_not_split_strategies() {
        let mut s = store();
        s.add_document("http://a", "A", "rust rust rust rust systems web web web");
        let e = engine(&s);
        let term = e.search("rust web", Strategy::TermAtATime, false).unwrap();
        let doc = e.search("rust web", Strategy::DocumentAtATime, false).unwrap();
        assert_eq!(pairs(&term), pairs(&doc));
        // still the indexed statistics: "rust rust systems"
        let idf = e.idf("rust").unwrap();
        let a = term.iter().find(|h| h.doc_id == 0).unwrap();
        assert!((a.score - 2.0 / 3.0 * idf).abs() < 1e-12);
    }

    #[test]
    fn repeated_query_terms_add_up() {
        let mut s = MemoryStore::new();
        s.add_document("http://a", "A", "machine machine learning");
        s.add_document("http://b", "B", "learning learning learning machine");
        build_all(&mut s, &default_stop_words()).unwrap();
        let e = engine(&s);

        let once = e.search("machine learning", Strategy::TermAtATime, false).unwrap();
        assert_eq!(once.len(), 2);
        assert!(once.iter().all(|h| (h.score - 1.0).abs() < 1e-12));

        for strategy in [Strategy::TermAtATime, Strategy::DocumentAtATime] {
            let hits = e.search("machine machine learning", strategy, false).unwrap();
            assert_eq!(hits[0].doc_id, 0);
            assert!((hits[0].score - 5.0 / 3.0).abs() < 1e-12);
            assert!((hits[1].score - 5.0 / 4.0).abs() < 1e-12);

            let hits = e.search("learning learning machine", strategy, false).unwrap();
            assert_eq!(hits[0].doc_id, 1);
        }
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("TERM".parse::<Strategy>().unwrap(), Strategy::TermAtATime);
        assert_eq!("document".parse::<Strategy>().unwrap(), Strategy::DocumentAtATime);
        assert_eq!(Strategy::parse_lenient("bogus"), Strategy::TermAtATime);
    }

    #[test]
    fn ties_break_by_document_id() {
        let mut scores = HashMap::new();
        scores.insert(5, 1.0);
        scores.insert(2, 1.0);
        scores.insert(9, 2.0);
        assert_eq!(rank(scores), vec![(9, 2.0), (2, 1.0), (5, 1.0)]);
    }
}
