//! Storage collaborator contract and the in-memory implementation.
//!
//! The algorithmic components only talk to storage through [`DocumentStore`]
//! (reads), [`IndexSink`] (postings writes) and [`ScoreSink`] (authority
//! writes). [`MemoryStore`] implements all three and is what the binaries
//! persist as a snapshot.

use crate::error::{Error, Result};
use crate::index::{DocumentTerms, InvertedIndex};
use crate::pagerank::AuthorityScores;
use crate::tokenizer::StopWords;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    pub title: String,
    pub content: String,
    /// Length of `content` in characters.
    pub content_length: usize,
}

/// The `(id, url, title)` view used for enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: DocId,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: DocId,
    pub target_url: String,
    /// Resolved once a document with `target_url` exists.
    pub target: Option<DocId>,
}

pub trait DocumentStore {
    fn documents(&self) -> Result<Vec<DocumentRef>>;
    fn document_count(&self) -> Result<usize>;
    fn document(&self, id: DocId) -> Result<Option<DocumentRef>>;
    fn content(&self, id: DocId) -> Result<Option<String>>;
    fn outgoing_links(&self, id: DocId) -> Result<Vec<Link>>;
    fn incoming_links(&self, id: DocId) -> Result<Vec<DocId>>;
    /// `(document, occurrences)` for every document containing `term`.
    fn postings(&self, term: &str) -> Result<Vec<(DocId, u32)>>;
    /// Indexed occurrences of `term` in one document, 0 when absent.
    fn occurrences(&self, term: &str, id: DocId) -> Result<u32>;
    fn document_frequency(&self, term: &str) -> Result<usize>;
    /// Token count recorded when the document was indexed.
    fn document_length(&self, id: DocId) -> Result<Option<u32>>;
    fn term_frequency(&self, term: &str) -> Result<u64>;
    /// Stop words the index was built with, if it has been built.
    fn stop_words(&self) -> Result<Option<StopWords>>;
    fn authority_scores(&self) -> Result<HashMap<DocId, f64>>;
}

pub trait IndexSink {
    fn replace_postings(&mut self, id: DocId, terms: &DocumentTerms) -> Result<()>;
    fn record_stop_words(&mut self, stop_words: &StopWords) -> Result<()>;
}

pub trait ScoreSink {
    /// Overwrite the stored score of every document in `scores`.
    fn record(&mut self, scores: &AuthorityScores) -> Result<()>;
}

/// Discards every update.
pub struct NullSink;

impl ScoreSink for NullSink {
    fn record(&mut self, _scores: &AuthorityScores) -> Result<()> {
        Ok(())
    }
}

/// Keeps every recorded iteration, oldest first.
impl ScoreSink for Vec<AuthorityScores> {
    fn record(&mut self, scores: &AuthorityScores) -> Result<()> {
        self.push(scores.clone());
        Ok(())
    }
}

macro_rules! forward_document_store {
    ($($ty:ty),*) => {$(
        impl<T: DocumentStore + ?Sized> DocumentStore for $ty {
            fn documents(&self) -> Result<Vec<DocumentRef>> { (**self).documents() }
            fn document_count(&self) -> Result<usize> { (**self).document_count() }
            fn document(&self, id: DocId) -> Result<Option<DocumentRef>> { (**self).document(id) }
            fn content(&self, id: DocId) -> Result<Option<String>> { (**self).content(id) }
            fn outgoing_links(&self, id: DocId) -> Result<Vec<Link>> { (**self).outgoing_links(id) }
            fn incoming_links(&self, id: DocId) -> Result<Vec<DocId>> { (**self).incoming_links(id) }
            fn postings(&self, term: &str) -> Result<Vec<(DocId, u32)>> { (**self).postings(term) }
            fn occurrences(&self, term: &str, id: DocId) -> Result<u32> { (**self).occurrences(term, id) }
            fn document_frequency(&self, term: &str) -> Result<usize> { (**self).document_frequency(term) }
            fn document_length(&self, id: DocId) -> Result<Option<u32>> { (**self).document_length(id) }
            fn term_frequency(&self, term: &str) -> Result<u64> { (**self).term_frequency(term) }
            fn stop_words(&self) -> Result<Option<StopWords>> { (**self).stop_words() }
            fn authority_scores(&self) -> Result<HashMap<DocId, f64>> { (**self).authority_scores() }
        }
    )*};
}

forward_document_store!(&T, Arc<T>);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub links: usize,
    pub resolved_links: usize,
    pub terms: usize,
    pub postings: usize,
    pub scored_documents: usize,
    pub last_iteration: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    documents: BTreeMap<DocId, Document>,
    by_url: HashMap<String, DocId>,
    links: BTreeMap<DocId, Vec<Link>>,
    // target url -> (source, position in `links[source]`) of links not yet resolved
    pending: HashMap<String, Vec<(DocId, usize)>>,
    incoming: HashMap<DocId, Vec<DocId>>,
    index: InvertedIndex,
    authority: HashMap<DocId, (f64, u32)>,
    next_id: DocId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, or replace title and content of the one with the same URL.
    ///
    /// Links already pointing at `url` are resolved to the returned id.
    pub fn add_document(&mut self, url: &str, title: &str, content: &str) -> DocId {
        let content_length = content.chars().count();
        if let Some(&id) = self.by_url.get(url) {
            if let Some(doc) = self.documents.get_mut(&id) {
                doc.title = title.to_string();
                doc.content = content.to_string();
                doc.content_length = content_length;
            }
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.documents.insert(
            id,
            Document { id, url: url.to_string(), title: title.to_string(), content: content.to_string(), content_length },
        );
        self.by_url.insert(url.to_string(), id);

        for (source, pos) in self.pending.remove(url).unwrap_or_default() {
            if let Some(link) = self.links.get_mut(&source).and_then(|out| out.get_mut(pos)) {
                link.target = Some(id);
                self.incoming.entry(id).or_default().push(source);
            }
        }
        id
    }

    /// Record an edge. A repeated `(source, target_url)` pair is ignored.
    pub fn add_link(&mut self, source: DocId, target_url: &str) -> Result<()> {
        if !self.documents.contains_key(&source) {
            return Err(Error::NotFound(source));
        }
        let target = self.by_url.get(target_url).copied();
        let out = self.links.entry(source).or_default();
        if out.iter().any(|l| l.target_url == target_url) {
            return Ok(());
        }
        match target {
            Some(t) => self.incoming.entry(t).or_default().push(source),
            None => self.pending.entry(target_url.to_string()).or_default().push((source, out.len())),
        }
        out.push(Link { source, target_url: target_url.to_string(), target });
        Ok(())
    }

    pub fn document_id(&self, url: &str) -> Option<DocId> {
        self.by_url.get(url).copied()
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn authority(&self, id: DocId) -> Option<(f64, u32)> {
        self.authority.get(&id).copied()
    }

    pub fn stats(&self) -> StoreStats {
        let all_links = self.links.values().flatten();
        let (links, resolved_links) =
            all_links.fold((0, 0), |(n, r), l| (n + 1, r + usize::from(l.target.is_some())));
        StoreStats {
            documents: self.documents.len(),
            links,
            resolved_links,
            terms: self.index.num_terms(),
            postings: self.index.num_postings(),
            scored_documents: self.authority.len(),
            last_iteration: self.authority.values().map(|(_, it)| *it).max().unwrap_or(0),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn documents(&self) -> Result<Vec<DocumentRef>> {
        Ok(self
            .documents
            .values()
            .map(|d| DocumentRef { id: d.id, url: d.url.clone(), title: d.title.clone() })
            .collect())
    }

    fn document_count(&self) -> Result<usize> {
        Ok(self.documents.len())
    }

    fn document(&self, id: DocId) -> Result<Option<DocumentRef>> {
        Ok(self.documents.get(&id).map(|d| DocumentRef { id: d.id, url: d.url.clone(), title: d.title.clone() }))
    }

    fn content(&self, id: DocId) -> Result<Option<String>> {
        Ok(self.documents.get(&id).map(|d| d.content.clone()))
    }

    fn outgoing_links(&self, id: DocId) -> Result<Vec<Link>> {
        Ok(self.links.get(&id).cloned().unwrap_or_default())
    }

    fn incoming_links(&self, id: DocId) -> Result<Vec<DocId>> {
        let mut sources = self.incoming.get(&id).cloned().unwrap_or_default();
        sources.sort_unstable();
        Ok(sources)
    }

    fn postings(&self, term: &str) -> Result<Vec<(DocId, u32)>> {
        Ok(self.index.postings(term).map(|p| (p.doc_id, p.frequency)).collect())
    }

    fn occurrences(&self, term: &str, id: DocId) -> Result<u32> {
        Ok(self.index.posting(term, id).map_or(0, |p| p.frequency))
    }

    fn document_frequency(&self, term: &str) -> Result<usize> {
        Ok(self.index.document_frequency(term))
    }

    fn document_length(&self, id: DocId) -> Result<Option<u32>> {
        Ok(self.index.document_length(id))
    }

    fn term_frequency(&self, term: &str) -> Result<u64> {
        Ok(self.index.term_id(term).and_then(|tid| self.index.term(tid)).map_or(0, |t| t.frequency))
    }

    fn stop_words(&self) -> Result<Option<StopWords>> {
        Ok(self.index.stop_words())
    }

    fn authority_scores(&self) -> Result<HashMap<DocId, f64>> {
        Ok(self.authority.iter().map(|(id, (score, _))| (*id, *score)).collect())
    }
}

impl IndexSink for MemoryStore {
    fn replace_postings(&mut self, id: DocId, terms: &DocumentTerms) -> Result<()> {
        if !self.documents.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        self.index.replace_document(id, terms);
        Ok(())
    }

    fn record_stop_words(&mut self, stop_words: &StopWords) -> Result<()> {
        self.index.set_stop_words(stop_words);
        Ok(())
    }
}

impl ScoreSink for MemoryStore {
    fn record(&mut self, scores: &AuthorityScores) -> Result<()> {
        for (id, score) in scores.iter() {
            self.authority.insert(id, (score, scores.iteration));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::analyze;

    #[test]
    fn same_url_replaces_content_and_keeps_id() {
        let mut store = MemoryStore::new();
        let a = store.add_document("http://a", "A", "old text");
        let b = store.add_document("http://a", "A2", "new");
        assert_eq!(a, b);
        assert_eq!(store.get(a).unwrap().content, "new");
        assert_eq!(store.get(a).unwrap().content_length, 3);
        assert_eq!(store.document_count().unwrap(), 1);
    }

    #[test]
    fn links_resolve_retroactively() {
        let mut store = MemoryStore::new();
        let a = store.add_document("http://a", "A", "");
        store.add_link(a, "http://b").unwrap();
        assert_eq!(store.outgoing_links(a).unwrap()[0].target, None);

        let b = store.add_document("http://b", "B", "");
        assert_eq!(store.outgoing_links(a).unwrap()[0].target, Some(b));
        assert_eq!(store.incoming_links(b).unwrap(), vec![a]);
    }

    #[test]
    fn incoming_links_are_indexed_as_links_resolve() {
        let mut store = MemoryStore::new();
        let c = store.add_document("http://c", "C", "");
        let a = store.add_document("http://a", "A", "");
        store.add_link(a, "http://b").unwrap();
        store.add_link(c, "http://b").unwrap();
        store.add_link(a, "http://c").unwrap();
        let b = store.add_document("http://b", "B", "");
        store.add_link(b, "http://c").unwrap();

        assert_eq!(store.incoming_links(b).unwrap(), vec![c, a]);
        assert_eq!(store.incoming_links(c).unwrap(), vec![a, b]);
        assert!(store.pending.is_empty());
        assert_eq!(store.stats().resolved_links, 4);

        // re-adding a known url must not resolve anything twice
        store.add_document("http://b", "B2", "x");
        assert_eq!(store.incoming_links(b).unwrap().len(), 2);
    }

    #[test]
    fn occurrence_and_frequency_lookups_read_the_index() {
        let mut store = MemoryStore::new();
        let a = store.add_document("http://a", "A", "");
        let b = store.add_document("http://b", "B", "");
        store.replace_postings(a, &analyze(&["x", "y", "x"])).unwrap();
        store.replace_postings(b, &analyze(&["x"])).unwrap();
        assert_eq!(store.occurrences("x", a).unwrap(), 2);
        assert_eq!(store.occurrences("y", b).unwrap(), 0);
        assert_eq!(store.document_frequency("x").unwrap(), 2);
        assert_eq!(store.document_frequency("zzz").unwrap(), 0);
        assert_eq!(store.document_length(a).unwrap(), Some(3));
    }

    #[test]
    fn stop_words_are_unset_until_recorded() {
        let mut store = MemoryStore::new();
        assert_eq!(store.stop_words().unwrap(), None);
        let words: StopWords = ["the".to_string()].into_iter().collect();
        store.record_stop_words(&words).unwrap();
        assert_eq!(store.stop_words().unwrap(), Some(words));
    }

    #[test]
    fn duplicate_links_are_ignored() {
        let mut store = MemoryStore::new();
        let a = store.add_document("http://a", "A", "");
        store.add_link(a, "http://x").unwrap();
        store.add_link(a, "http://x").unwrap();
        assert_eq!(store.outgoing_links(a).unwrap().len(), 1);
        assert!(matches!(store.add_link(99, "http://x"), Err(Error::NotFound(99))));
    }

    #[test]
    fn record_overwrites_with_iteration_tag() {
        let mut store = MemoryStore::new();
        let a = store.add_document("http://a", "A", "");
        store.record(&AuthorityScores::new(1, HashMap::from([(a, 0.5)]))).unwrap();
        store.record(&AuthorityScores::new(2, HashMap::from([(a, 0.25)]))).unwrap();
        assert_eq!(store.authority(a), Some((0.25, 2)));
        assert_eq!(store.stats().last_iteration, 2);
    }

    #[test]
    fn postings_require_known_document() {
        let mut store = MemoryStore::new();
        assert!(store.replace_postings(5, &analyze(&["x"])).is_err());
        let a = store.add_document("http://a", "A", "x");
        store.replace_postings(a, &analyze(&["x", "x"])).unwrap();
        assert_eq!(store.postings("x").unwrap(), vec![(a, 2)]);
        assert_eq!(store.term_frequency("x").unwrap(), 2);
    }
}
