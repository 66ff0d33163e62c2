//! Vertex-centric, bulk-synchronous authority engine.
//!
//! A superstep has two phases separated by a barrier: every vertex first
//! emits an even share of its value along each outgoing edge, then every
//! vertex folds its complete inbox into a new value. No vertex reads its
//! inbox before all sends of the superstep are delivered.

use super::{publish, teleport, AuthorityEngine, AuthorityScores, EngineKind};
use crate::config::PageRankConfig;
use crate::graph::LinkGraph;
use crate::store::ScoreSink;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Message {
    pub target: usize,
    pub value: f64,
}

#[derive(Debug, Clone)]
struct Vertex {
    value: f64,
    active: bool,
}

impl Vertex {
    fn send<'a>(&self, edges: &'a [usize]) -> impl Iterator<Item = Message> + 'a {
        let share = if edges.is_empty() { 0.0 } else { self.value / edges.len() as f64 };
        edges.iter().map(move |&target| Message { target, value: share })
    }
}

/// Outcome of one superstep.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StepStats {
    active: usize,
    residual: f64,
}

pub struct PregelEngine {
    config: PageRankConfig,
}

impl PregelEngine {
    pub fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    fn superstep(&self, graph: &LinkGraph, vertices: &mut [Vertex]) -> StepStats {
        // send
        let outbox: Vec<Message> =
            vertices.par_iter().enumerate().flat_map_iter(|(i, v)| v.send(graph.outgoing(i))).collect();

        // barrier: deliver every message before any vertex computes
        let mut inbox = vec![0.0f64; vertices.len()];
        for msg in outbox {
            inbox[msg.target] += msg.value;
        }

        // compute
        let base = teleport(&self.config, vertices.len());
        let damping = self.config.damping;
        let threshold = self.config.activity_threshold;
        vertices
            .par_iter_mut()
            .zip(inbox.par_iter())
            .map(|(vertex, &incoming)| {
                let next = base + damping * incoming;
                let delta = (next - vertex.value).abs();
                vertex.active = delta >= threshold;
                vertex.value = next;
                StepStats { active: usize::from(vertex.active), residual: delta }
            })
            .reduce(
                || StepStats { active: 0, residual: 0.0 },
                |a, b| StepStats { active: a.active + b.active, residual: a.residual + b.residual },
            )
    }
}

impl AuthorityEngine for PregelEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Pregel
    }

    fn compute(&self, graph: &LinkGraph, sink: &mut dyn ScoreSink) -> AuthorityScores {
        let n = graph.len();
        if n == 0 {
            tracing::warn!("no documents in link graph; skipping authority computation");
            return AuthorityScores { converged: true, ..AuthorityScores::default() };
        }

        tracing::info!(vertices = n, edges = graph.edge_count(), "starting superstep authority computation");
        let mut vertices = vec![Vertex { value: 1.0 / n as f64, active: true }; n];
        let mut last = StepStats { active: n, residual: 0.0 };
        let mut superstep = 0;

        while superstep < self.config.max_iterations {
            superstep += 1;
            last = self.superstep(graph, &mut vertices);

            let values: Vec<f64> = vertices.iter().map(|v| v.value).collect();
            let mut snapshot = AuthorityScores::from_dense(graph, superstep, &values);
            snapshot.residual = last.residual;
            publish(sink, &snapshot);
            tracing::debug!(superstep, active = last.active, "superstep complete");

            if last.active == 0 {
                tracing::info!(superstep, "all vertices halted");
                break;
            }
        }
        if last.active > 0 {
            tracing::warn!(superstep, active = last.active, "superstep cap reached before all vertices halted");
        }

        let values: Vec<f64> = vertices.iter().map(|v| v.value).collect();
        let mut scores = AuthorityScores::from_dense(graph, superstep, &values);
        scores.converged = last.active == 0;
        scores.residual = last.residual;
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NullSink;

    fn run(graph: &LinkGraph, config: PageRankConfig) -> AuthorityScores {
        PregelEngine::new(config).compute(graph, &mut NullSink)
    }

    #[test]
    fn send_splits_value_evenly() {
        let v = Vertex { value: 0.6, active: true };
        let msgs: Vec<Message> = v.send(&[1, 2, 3]).collect();
        assert_eq!(msgs.len(), 3);
        assert!(msgs.iter().all(|m| (m.value - 0.2).abs() < 1e-15));
        assert_eq!(v.send(&[]).count(), 0);
    }

    #[test]
    fn symmetric_cycle_stays_uniform() {
        let g = LinkGraph::from_edges([1, 2, 3], [(1, 2), (2, 3), (3, 1)]);
        let s = run(&g, PageRankConfig::default());
        assert!(s.converged);
        assert_eq!(s.iteration, 1);
        for id in [1, 2, 3] {
            assert!((s.get(id).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn dangling_mass_is_dropped() {
        // 1 -> 2, and 2 has no outgoing edges
        let g = LinkGraph::from_edges([1, 2], [(1, 2)]);
        let s = run(&g, PageRankConfig::default());
        assert!((s.get(1).unwrap() - 0.075).abs() < 1e-12);
        assert!((s.get(2).unwrap() - (0.075 + 0.85 * 0.075)).abs() < 1e-9);
        assert!(s.sum() < 1.0);
    }

    #[test]
    fn cap_bounds_supersteps() {
        let g = LinkGraph::from_edges([1, 2, 3], [(1, 2), (2, 3), (3, 1), (1, 3)]);
        let config = PageRankConfig { max_iterations: 3, ..PageRankConfig::default() };
        let mut history: Vec<AuthorityScores> = Vec::new();
        let s = PregelEngine::new(config).compute(&g, &mut history);
        assert_eq!(s.iteration, 3);
        assert!(!s.converged);
        assert_eq!(history.iter().map(|h| h.iteration).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_graph_yields_no_scores() {
        let s = run(&LinkGraph::default(), PageRankConfig::default());
        assert!(s.is_empty());
        assert_eq!(s.iteration, 0);
    }
}
