//! Directed link graph over dense vertex indices.
//!
//! Document ids are mapped to `0..n` once; adjacency is stored as index
//! lists so both authority engines can walk the graph without hashing.

use crate::error::Result;
use crate::store::DocumentStore;
use crate::DocId;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    doc_ids: Vec<DocId>,
    index_of: HashMap<DocId, usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl LinkGraph {
    /// Build from vertex ids and `(source, target)` document pairs.
    ///
    /// Pairs naming an id outside `doc_ids` are skipped.
    pub fn from_edges(doc_ids: impl IntoIterator<Item = DocId>, edges: impl IntoIterator<Item = (DocId, DocId)>) -> Self {
        let doc_ids: Vec<DocId> = doc_ids.into_iter().collect();
        let index_of: HashMap<DocId, usize> = doc_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut outgoing = vec![Vec::new(); doc_ids.len()];
        let mut incoming = vec![Vec::new(); doc_ids.len()];
        for (src, dst) in edges {
            if let (Some(&s), Some(&t)) = (index_of.get(&src), index_of.get(&dst)) {
                outgoing[s].push(t);
                incoming[t].push(s);
            }
        }
        Self { doc_ids, index_of, outgoing, incoming }
    }

    /// Load every document and its resolved outgoing links.
    pub fn from_store<S: DocumentStore + ?Sized>(store: &S) -> Result<Self> {
        let docs = store.documents()?;
        let mut edges = Vec::new();
        for doc in &docs {
            for link in store.outgoing_links(doc.id)? {
                if let Some(target) = link.target {
                    edges.push((doc.id, target));
                }
            }
        }
        let graph = Self::from_edges(docs.iter().map(|d| d.id), edges);
        tracing::debug!(vertices = graph.len(), edges = graph.edge_count(), "link graph loaded");
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.iter().map(Vec::len).sum()
    }

    pub fn doc_id(&self, index: usize) -> DocId {
        self.doc_ids[index]
    }

    pub fn doc_ids(&self) -> &[DocId] {
        &self.doc_ids
    }

    pub fn index_of(&self, doc: DocId) -> Option<usize> {
        self.index_of.get(&doc).copied()
    }

    pub fn outgoing(&self, index: usize) -> &[usize] {
        &self.outgoing[index]
    }

    pub fn incoming(&self, index: usize) -> &[usize] {
        &self.incoming[index]
    }

    pub fn out_degree(&self, index: usize) -> usize {
        self.outgoing[index].len()
    }

    /// Vertices without outgoing edges.
    pub fn dangling(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&i| self.outgoing[i].is_empty())
    }
}
