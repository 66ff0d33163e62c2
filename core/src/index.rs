use crate::error::Result;
use crate::store::{DocumentStore, IndexSink};
use crate::tokenizer::{tokenize, StopWords};
use crate::{DocId, TermId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    /// Raw occurrence count of the term in the document.
    pub frequency: u32,
    /// Zero-based token positions, ascending.
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermEntry {
    pub word: String,
    /// Occurrences across the whole corpus. Auxiliary, not used for ranking.
    pub frequency: u64,
}

/// Per-document term statistics produced from a token sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTerms {
    pub length: u32,
    pub terms: BTreeMap<String, Vec<u32>>,
}

impl DocumentTerms {
    pub fn frequency(&self, term: &str) -> u32 {
        self.terms.get(term).map_or(0, |p| p.len() as u32)
    }
}

/// Count occurrences and record positions for every distinct term.
pub fn analyze<S: AsRef<str>>(tokens: &[S]) -> DocumentTerms {
    let mut terms: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (pos, token) in tokens.iter().enumerate() {
        terms.entry(token.as_ref().to_string()).or_default().push(pos as u32);
    }
    DocumentTerms { length: tokens.len() as u32, terms }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InvertedIndex {
    dictionary: HashMap<String, TermId>,
    terms: Vec<TermEntry>,
    // postings keyed by doc id so iteration order is stable
    postings: HashMap<TermId, BTreeMap<DocId, Posting>>,
    doc_terms: HashMap<DocId, Vec<TermId>>,
    doc_lengths: HashMap<DocId, u32>,
    stop_words: Option<BTreeSet<String>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every posting of `doc_id` with the given statistics.
    pub fn replace_document(&mut self, doc_id: DocId, analyzed: &DocumentTerms) {
        self.remove_document(doc_id);

        let mut ids = Vec::with_capacity(analyzed.terms.len());
        for (word, positions) in &analyzed.terms {
            let tid = self.term_id_or_insert(word);
            self.terms[tid as usize].frequency += positions.len() as u64;
            let posting = Posting { doc_id, frequency: positions.len() as u32, positions: positions.clone() };
            self.postings.entry(tid).or_default().insert(doc_id, posting);
            ids.push(tid);
        }
        self.doc_terms.insert(doc_id, ids);
        self.doc_lengths.insert(doc_id, analyzed.length);
    }

    /// Drop a document's postings and take its occurrences back out of the term counters.
    pub fn remove_document(&mut self, doc_id: DocId) {
        let Some(old) = self.doc_terms.remove(&doc_id) else { return };
        for tid in old {
            if let Some(plist) = self.postings.get_mut(&tid) {
                if let Some(p) = plist.remove(&doc_id) {
                    let entry = &mut self.terms[tid as usize];
                    entry.frequency = entry.frequency.saturating_sub(p.frequency as u64);
                }
                if plist.is_empty() {
                    self.postings.remove(&tid);
                }
            }
        }
        self.doc_lengths.remove(&doc_id);
    }

    fn term_id_or_insert(&mut self, word: &str) -> TermId {
        if let Some(&tid) = self.dictionary.get(word) {
            return tid;
        }
        let tid = self.terms.len() as TermId;
        self.terms.push(TermEntry { word: word.to_string(), frequency: 0 });
        self.dictionary.insert(word.to_string(), tid);
        tid
    }

    pub fn term_id(&self, word: &str) -> Option<TermId> {
        self.dictionary.get(word).copied()
    }

    pub fn term(&self, tid: TermId) -> Option<&TermEntry> {
        self.terms.get(tid as usize)
    }

    pub fn postings(&self, word: &str) -> impl Iterator<Item = &Posting> {
        self.term_id(word).and_then(|tid| self.postings.get(&tid)).into_iter().flat_map(|m| m.values())
    }

    pub fn posting(&self, word: &str, doc_id: DocId) -> Option<&Posting> {
        self.postings.get(&self.term_id(word)?)?.get(&doc_id)
    }

    pub fn document_frequency(&self, word: &str) -> usize {
        self.term_id(word).and_then(|tid| self.postings.get(&tid)).map_or(0, |m| m.len())
    }

    pub fn document_length(&self, doc_id: DocId) -> Option<u32> {
        self.doc_lengths.get(&doc_id).copied()
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn num_postings(&self) -> usize {
        self.postings.values().map(|m| m.len()).sum()
    }

    pub fn set_stop_words(&mut self, stop_words: &StopWords) {
        let words: BTreeSet<String> = stop_words.iter().cloned().collect();
        if self.stop_words.as_ref().is_some_and(|old| *old != words) && !self.doc_lengths.is_empty() {
            tracing::warn!("stop words changed; documents indexed earlier keep their old postings");
        }
        self.stop_words = Some(words);
    }

    pub fn stop_words(&self) -> Option<StopWords> {
        self.stop_words.as_ref().map(|w| w.iter().cloned().collect())
    }

    pub fn num_documents(&self) -> usize {
        self.doc_lengths.len()
    }
}

/// Outcome of indexing a batch of documents.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: Vec<DocId>,
    pub tokens: u64,
}

/// Tokenize one stored document and replace its postings.
pub fn build_index<S>(store: &mut S, doc_id: DocId, stop_words: &StopWords) -> Result<DocumentTerms>
where
    S: DocumentStore + IndexSink,
{
    store.record_stop_words(stop_words)?;
    let content = store.content(doc_id)?.unwrap_or_default();
    let tokens = tokenize(&content, stop_words);
    let analyzed = analyze(&tokens);
    store.replace_postings(doc_id, &analyzed)?;
    tracing::debug!(doc_id, length = analyzed.length, terms = analyzed.terms.len(), "indexed document");
    Ok(analyzed)
}

/// Index every document in the store. A document that fails is logged and skipped.
pub fn build_all<S>(store: &mut S, stop_words: &StopWords) -> Result<IndexReport>
where
    S: DocumentStore + IndexSink,
{
    store.record_stop_words(stop_words)?;
    let docs = store.documents()?;
    let mut report = IndexReport::default();
    for doc in docs {
        match build_index(store, doc.id, stop_words) {
            Ok(analyzed) => {
                report.indexed += 1;
                report.tokens += analyzed.length as u64;
            }
            Err(err) => {
                tracing::warn!(doc_id = doc.id, %err, "skipping document");
                report.failed.push(doc.id);
            }
        }
    }
    tracing::info!(indexed = report.indexed, failed = report.failed.len(), tokens = report.tokens, "index build complete");
    Ok(report)
}
