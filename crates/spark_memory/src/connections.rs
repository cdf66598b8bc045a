//! Connection Builder
//!
//! Proposes edges from one node to existing nodes using two heuristics:
//!
//! - same bucket: equal layer and type gives a SIMILARITY edge of fixed weight;
//! - resonance proximity: stored scores closer than the tolerance give a
//!   RESONANCE edge weighted `1 − gap / tolerance`, kept only at or above
//!   the minimum weight.
//!
//! Canonical nodes, the node itself, and pairs that already share an edge of
//! the same type are skipped. Nothing here fails.

use serde::{Deserialize, Serialize};
use spark_core::config::GraphConfig;

use crate::graph::{EdgeType, GraphState, GraphView, MemoryNode};

/// An edge the builder wants to create. Source is always the node being connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedEdge {
    pub target: String,
    pub edge_type: EdgeType,
    pub weight: f32,
}

#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    similarity_weight: f32,
    tolerance: f32,
    min_weight: f32,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new(&GraphConfig::default())
    }
}

impl ConnectionBuilder {
    pub fn new(config: &GraphConfig) -> Self {
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        Self {
            similarity_weight: finite_or(config.similarity_weight, 0.6).clamp(0.0, 1.0),
            tolerance: finite_or(config.resonance_tolerance, 0.1).max(0.0),
            min_weight: finite_or(config.min_resonance_weight, 0.5).clamp(0.0, 1.0),
        }
    }

    /// Proposals for `id` against a read view. Unknown id yields nothing.
    pub fn propose(&self, view: &GraphView, id: &str) -> Vec<ProposedEdge> {
        self.propose_in(&view.state, id)
    }

    pub(crate) fn propose_in(&self, state: &GraphState, id: &str) -> Vec<ProposedEdge> {
        let Some(source) = state.node(id) else {
            tracing::debug!("build_connections: {} not found", id);
            return Vec::new();
        };

        let mut out = Vec::new();
        for candidate in state.nodes() {
            if candidate.id == source.id {
                continue;
            }
            if candidate.is_canonical() {
                tracing::debug!("Skipping canonical candidate {}", candidate.id);
                continue;
            }

            if self.same_bucket(source, candidate)
                && !state.has_edge_of_type(&source.id, &candidate.id, EdgeType::Similarity)
            {
                out.push(ProposedEdge {
                    target: candidate.id.clone(),
                    edge_type: EdgeType::Similarity,
                    weight: self.similarity_weight,
                });
            }

            if let Some(weight) = self.resonance_weight(source, candidate) {
                if !state.has_edge_of_type(&source.id, &candidate.id, EdgeType::Resonance) {
                    out.push(ProposedEdge {
                        target: candidate.id.clone(),
                        edge_type: EdgeType::Resonance,
                        weight,
                    });
                }
            }
        }
        out
    }

    fn same_bucket(&self, a: &MemoryNode, b: &MemoryNode) -> bool {
        a.layer == b.layer && a.node_type == b.node_type
    }

    /// Weight of a RESONANCE edge between `a` and `b`, if one should exist.
    fn resonance_weight(&self, a: &MemoryNode, b: &MemoryNode) -> Option<f32> {
        let (sa, sb) = (a.resonance_score?, b.resonance_score?);
        if !sa.is_finite() || !sb.is_finite() || self.tolerance <= 0.0 {
            return None;
        }
        let gap = (sa - sb).abs();
        if gap >= self.tolerance {
            return None;
        }
        let weight = (1.0 - gap / self.tolerance).clamp(0.0, 1.0);
        (weight >= self.min_weight).then_some(weight)
    }
}
