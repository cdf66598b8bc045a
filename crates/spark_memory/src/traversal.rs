//! Traversal Engine
//!
//! Bounded breadth-first search over a captured [`GraphView`]. Edges are
//! walked in both directions. A visited set makes cycles harmless, and the
//! depth bound guarantees termination.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::graph::{EdgeType, GraphView, MemoryNode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalOptions {
    /// 0 returns only the start node.
    pub max_depth: usize,
    /// Non-start nodes below this (or without a score) are neither returned nor expanded.
    pub min_resonance: Option<f32>,
    /// Only these edge types are walked, when set.
    pub edge_types: Option<Vec<EdgeType>>,
}

impl TraversalOptions {
    pub fn depth(max_depth: usize) -> Self {
        Self { max_depth, ..Self::default() }
    }

    pub fn min_resonance(mut self, min: f32) -> Self {
        self.min_resonance = Some(min);
        self
    }

    pub fn edge_types(mut self, types: Vec<EdgeType>) -> Self {
        self.edge_types = Some(types);
        self
    }
}

/// A node reached by the search, with its hop distance from the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub node: MemoryNode,
    pub depth: usize,
}

pub struct TraversalEngine;

impl TraversalEngine {
    /// BFS from `start_id`, in visit order. `depth_cap` bounds `opts.max_depth`.
    ///
    /// An unknown start returns an empty result.
    pub fn traverse_bfs(
        view: &GraphView,
        start_id: &str,
        opts: &TraversalOptions,
        depth_cap: usize,
    ) -> Vec<Visit> {
        let Some(start) = view.get_node(start_id) else {
            tracing::debug!("Traversal start {} not found", start_id);
            return Vec::new();
        };

        let max_depth = if opts.max_depth > depth_cap {
            tracing::debug!("Traversal depth {} capped at {}", opts.max_depth, depth_cap);
            depth_cap
        } else {
            opts.max_depth
        };
        let edge_filter = opts.edge_types.as_deref();
        let passes = |node: &MemoryNode| match opts.min_resonance {
            None => true,
            Some(min) => node.resonance_score.is_some_and(|s| s >= min),
        };

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(start.id.as_str());
        let mut result = vec![Visit { node: start.clone(), depth: 0 }];
        let mut queue: VecDeque<(&MemoryNode, usize)> = VecDeque::new();
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in view.neighbors(&current.id, edge_filter) {
                if visited.contains(neighbor.id.as_str()) || !passes(neighbor) {
                    continue;
                }
                visited.insert(neighbor.id.as_str());
                result.push(Visit { node: neighbor.clone(), depth: depth + 1 });
                queue.push_back((neighbor, depth + 1));
            }
        }
        result
    }
}
