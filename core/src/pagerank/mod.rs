//! Link-graph authority (PageRank) scores.
//!
//! Both engines compute the same recurrence
//!
//! ```text
//! PR(i) = (1 - d) / N + d * sum_{j -> i} PR(j) / outdegree(j)
//! ```
//!
//! starting from `1/N`. Mass held by documents without outgoing edges is not
//! redistributed, so the scores sum to exactly 1 only when no such document
//! exists.
//!
//! - [`pregel::PregelEngine`] runs bulk-synchronous supersteps of vertex
//!   message passing and halts when every vertex is inactive.
//! - [`mapreduce::MapReduceEngine`] runs a map, reduce and combine pass per
//!   iteration and halts on the RMS change between iterations.
//!
//! Every iteration is pushed to a [`ScoreSink`], so partial progress is
//! visible while a run is still going.

pub mod mapreduce;
pub mod pregel;

use crate::config::PageRankConfig;
use crate::error::{Error, Result};
use crate::graph::LinkGraph;
use crate::store::{DocumentStore, ScoreSink};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use mapreduce::MapReduceEngine;
pub use pregel::PregelEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Pregel,
    #[default]
    MapReduce,
}

impl FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pregel" => Ok(EngineKind::Pregel),
            "mapreduce" | "map-reduce" => Ok(EngineKind::MapReduce),
            other => Err(Error::invalid_config(format!("unknown authority engine: {other}"))),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Pregel => f.write_str("pregel"),
            EngineKind::MapReduce => f.write_str("mapreduce"),
        }
    }
}

/// One version of the score vector, tagged with the iteration that produced it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthorityScores {
    pub iteration: u32,
    pub converged: bool,
    /// L1 norm of the change made by the last iteration.
    pub residual: f64,
    scores: HashMap<DocId, f64>,
}

impl AuthorityScores {
    pub fn new(iteration: u32, scores: HashMap<DocId, f64>) -> Self {
        Self { iteration, converged: false, residual: 0.0, scores }
    }

    /// Map dense per-vertex values back to document ids.
    pub fn from_dense(graph: &LinkGraph, iteration: u32, values: &[f64]) -> Self {
        let scores = values.iter().enumerate().map(|(i, v)| (graph.doc_id(i), *v)).collect();
        Self::new(iteration, scores)
    }

    pub fn get(&self, doc: DocId) -> Option<f64> {
        self.scores.get(&doc).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.scores.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, f64)> + '_ {
        self.scores.iter().map(|(id, s)| (*id, *s))
    }

    /// Highest scores first, ties broken by ascending document id.
    pub fn top(&self, n: usize) -> Vec<(DocId, f64)> {
        let mut ranked: Vec<(DocId, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Largest absolute per-document difference; a document missing on one side counts as 0.
    pub fn max_abs_diff(&self, other: &AuthorityScores) -> f64 {
        self.scores
            .keys()
            .chain(other.scores.keys())
            .map(|id| (self.get(*id).unwrap_or(0.0) - other.get(*id).unwrap_or(0.0)).abs())
            .fold(0.0, f64::max)
    }

    /// Bound on the distance of these scores from the exact fixed point.
    ///
    /// The update is a contraction with factor `damping` in the L1 norm, so the
    /// error after a step is at most `d / (1 - d)` times that step's change.
    pub fn error_bound(&self, damping: f64) -> f64 {
        damping / (1.0 - damping) * self.residual
    }
}

pub trait AuthorityEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Run to convergence or the iteration cap, recording every iteration in `sink`.
    fn compute(&self, graph: &LinkGraph, sink: &mut dyn ScoreSink) -> AuthorityScores;
}

pub fn engine_for(kind: EngineKind, config: &PageRankConfig) -> Box<dyn AuthorityEngine> {
    match kind {
        EngineKind::Pregel => Box::new(PregelEngine::new(config.clone())),
        EngineKind::MapReduce => Box::new(MapReduceEngine::new(config.clone())),
    }
}

/// Build the link graph from `store`, run the selected engine and persist each iteration back into it.
pub fn compute_authority<S>(store: &mut S, kind: EngineKind, config: &PageRankConfig) -> Result<AuthorityScores>
where
    S: DocumentStore + ScoreSink,
{
    let graph = LinkGraph::from_store(&*store)?;
    let engine = engine_for(kind, config);
    Ok(engine.compute(&graph, store))
}

/// Scores from both engines over the same graph.
#[derive(Debug, Clone)]
pub struct EngineComparison {
    pub pregel: AuthorityScores,
    pub mapreduce: AuthorityScores,
    pub max_difference: f64,
    /// Sum of both engines' error bounds; the difference can never exceed it.
    pub bound: f64,
}

impl EngineComparison {
    pub fn agrees(&self) -> bool {
        self.max_difference <= self.bound + 1e-12
    }
}

pub fn compare_engines(graph: &LinkGraph, config: &PageRankConfig) -> EngineComparison {
    let pregel = PregelEngine::new(config.clone()).compute(graph, &mut crate::store::NullSink);
    let mapreduce = MapReduceEngine::new(config.clone()).compute(graph, &mut crate::store::NullSink);
    let max_difference = pregel.max_abs_diff(&mapreduce);
    let bound = pregel.error_bound(config.damping) + mapreduce.error_bound(config.damping);
    tracing::info!(
        pregel_iterations = pregel.iteration,
        mapreduce_iterations = mapreduce.iteration,
        max_difference,
        bound,
        "compared authority engines"
    );
    EngineComparison { pregel, mapreduce, max_difference, bound }
}

/// Push one iteration to the sink. A failed write is logged and the run continues.
pub(crate) fn publish(sink: &mut dyn ScoreSink, scores: &AuthorityScores) {
    if let Err(err) = sink.record(scores) {
        tracing::warn!(iteration = scores.iteration, %err, "failed to persist authority scores");
    }
}

/// Base term `(1 - d) / N`.
pub(crate) fn teleport(config: &PageRankConfig, n: usize) -> f64 {
    (1.0 - config.damping) / n as f64
}
