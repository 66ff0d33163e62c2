//! Map/reduce authority engine.
//!
//! Each iteration maps every document to `(target, share)` contributions,
//! reduces them by target, and combines the sums with the teleport term for
//! every document, including those that received nothing.

use super::{publish, teleport, AuthorityEngine, AuthorityScores, EngineKind};
use crate::config::PageRankConfig;
use crate::graph::LinkGraph;
use crate::store::ScoreSink;
use rayon::prelude::*;

pub struct MapReduceEngine {
    config: PageRankConfig,
}

impl MapReduceEngine {
    pub fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    /// Contributions of one source document, `(target, rank / outdegree)` per edge.
    pub fn map_phase(graph: &LinkGraph, source: usize, rank: f64) -> Vec<(usize, f64)> {
        let out = graph.outgoing(source);
        if out.is_empty() {
            return Vec::new();
        }
        let share = rank / out.len() as f64;
        out.iter().map(|&target| (target, share)).collect()
    }

    /// Sum contributions per target. Order of `contributions` is preserved within each target.
    pub fn reduce_phase(n: usize, contributions: &[(usize, f64)]) -> Vec<f64> {
        let mut reduced = vec![0.0f64; n];
        for &(target, share) in contributions {
            reduced[target] += share;
        }
        reduced
    }

    fn combine(&self, reduced: &[f64]) -> Vec<f64> {
        let base = teleport(&self.config, reduced.len());
        reduced.iter().map(|incoming| base + self.config.damping * incoming).collect()
    }

    fn iterate(&self, graph: &LinkGraph, ranks: &[f64]) -> Vec<f64> {
        // par_iter + collect keeps source order, so sums are reproducible
        let contributions: Vec<(usize, f64)> = ranks
            .par_iter()
            .enumerate()
            .flat_map_iter(|(source, &rank)| Self::map_phase(graph, source, rank))
            .collect();
        let reduced = Self::reduce_phase(ranks.len(), &contributions);
        self.combine(&reduced)
    }
}

/// Root-mean-square difference between two score vectors of equal length.
pub fn rms_difference(old: &[f64], new: &[f64]) -> f64 {
    if old.is_empty() {
        return 0.0;
    }
    let total: f64 = old.iter().zip(new).map(|(a, b)| (b - a) * (b - a)).sum();
    (total / old.len() as f64).sqrt()
}

impl AuthorityEngine for MapReduceEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::MapReduce
    }

    fn compute(&self, graph: &LinkGraph, sink: &mut dyn ScoreSink) -> AuthorityScores {
        let n = graph.len();
        if n == 0 {
            tracing::warn!("no documents in link graph; skipping authority computation");
            return AuthorityScores { converged: true, ..AuthorityScores::default() };
        }

        tracing::info!(documents = n, edges = graph.edge_count(), "starting map/reduce authority computation");
        let mut ranks = vec![1.0 / n as f64; n];
        let mut iteration = 0;
        let mut converged = false;
        let mut residual = 0.0;

        while iteration < self.config.max_iterations {
            iteration += 1;
            let next = self.iterate(graph, &ranks);
            let rms = rms_difference(&ranks, &next);
            residual = ranks.iter().zip(&next).map(|(a, b)| (b - a).abs()).sum();
            ranks = next;

            let mut snapshot = AuthorityScores::from_dense(graph, iteration, &ranks);
            snapshot.residual = residual;
            publish(sink, &snapshot);
            tracing::debug!(iteration, rms, "iteration complete");

            if rms < self.config.tolerance {
                converged = true;
                tracing::info!(iteration, rms, "authority scores converged");
                break;
            }
        }
        if !converged {
            tracing::warn!(iteration, "iteration cap reached before convergence");
        }

        let mut scores = AuthorityScores::from_dense(graph, iteration, &ranks);
        scores.converged = converged;
        scores.residual = residual;
        scores
    }
}
