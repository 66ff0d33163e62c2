//! Link-aware full-text search.
//!
//! Documents are tokenized into an inverted index, the link graph between them
//! is scored for authority by one of two PageRank engines, and queries combine
//! TF-IDF relevance with those scores.

pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod pagerank;
pub mod persist;
pub mod search;
pub mod store;
pub mod tokenizer;

pub type TermId = u32;
pub type DocId = u32;

pub use config::{Config, PageRankConfig, SearchConfig};
pub use error::{Error, Result};
pub use graph::LinkGraph;
pub use index::{InvertedIndex, Posting};
pub use pagerank::{compute_authority, AuthorityEngine, AuthorityScores, EngineKind};
pub use search::{QueryEngine, SearchHit, Strategy};
pub use store::{DocumentStore, MemoryStore};
