//! Graph Store
//!
//! Sole owner and mutator of the memory graph.
//!
//! Readers take a lock-free [`GraphView`] of the current state. Writers are
//! serialized by a mutex; each write works on a private copy of the state and
//! publishes it with a single atomic swap only if the whole operation
//! succeeded. A reader therefore sees either all of a write or none of it,
//! and a failed write leaves nothing behind.

use arc_swap::ArcSwap;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use spark_core::config::GraphConfig;
use spark_core::MetricsVector;

use crate::canon::{ensure_canon, is_canon_id, CANON_NODES};
use crate::connections::ConnectionBuilder;
use crate::error::{GraphError, GraphResult};
use crate::graph::{
    EdgeType, GraphSnapshot, GraphState, GraphView, Layer, MemoryEdge, MemoryNode, NodeDraft,
    NodeMetadata,
};
use crate::resonance::{ideal_resonance, ResonanceQuery, ResonanceRanker, ScoredNode};
use crate::traversal::{TraversalEngine, TraversalOptions, Visit};

/// Node and edge counts, for status output.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub canonical: usize,
    pub by_layer: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_edge_type: BTreeMap<String, usize>,
}

pub struct GraphStore {
    state: ArcSwap<GraphState>,
    write_lock: Mutex<()>,
    config: GraphConfig,
    connections: ConnectionBuilder,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl GraphStore {
    /// Empty store with the canonical set already seeded.
    pub fn new(config: GraphConfig) -> Self {
        let mut state = GraphState::default();
        ensure_canon(&mut state);
        tracing::info!("Graph store ready with {} canonical nodes", CANON_NODES.len());
        Self {
            state: ArcSwap::from_pointee(state),
            write_lock: Mutex::new(()),
            connections: ConnectionBuilder::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Run `f` on a copy of the state and publish it only on success.
    fn write<T>(&self, f: impl FnOnce(&mut GraphState) -> GraphResult<T>) -> GraphResult<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.state.load_full();
        let mut next = GraphState::clone(&current);
        let out = f(&mut next)?;
        self.state.store(Arc::new(next));
        Ok(out)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Captured read view. Later writes do not affect it.
    pub fn snapshot(&self) -> GraphView {
        GraphView { state: self.state.load_full() }
    }

    pub fn get_node(&self, id: &str) -> Option<MemoryNode> {
        self.state.load().node(id).cloned()
    }

    pub fn nodes_by_layer(&self, layer: Layer) -> Vec<MemoryNode> {
        self.snapshot().nodes_by_layer(layer).into_iter().cloned().collect()
    }

    pub fn nodes_by_type(&self, node_type: &str) -> Vec<MemoryNode> {
        self.snapshot().nodes_by_type(node_type).into_iter().cloned().collect()
    }

    pub fn get_neighbors(&self, id: &str, edge_types: Option<&[EdgeType]>) -> Vec<MemoryNode> {
        self.snapshot().neighbors(id, edge_types).into_iter().cloned().collect()
    }

    pub fn stats(&self) -> GraphStats {
        let view = self.snapshot();
        let mut stats = GraphStats {
            nodes: view.node_count(),
            edges: view.edge_count(),
            ..GraphStats::default()
        };
        for node in view.nodes() {
            if node.is_canonical() {
                stats.canonical += 1;
            }
            *stats.by_layer.entry(node.layer.to_string()).or_default() += 1;
            *stats.by_type.entry(node.node_type.clone()).or_default() += 1;
        }
        for edge in view.edges() {
            *stats.by_edge_type.entry(edge.edge_type.to_string()).or_default() += 1;
        }
        stats
    }

    /// Bounded BFS over a captured view. Depth is capped by `max_traversal_depth`.
    pub fn traverse_bfs(&self, start_id: &str, opts: &TraversalOptions) -> Vec<Visit> {
        TraversalEngine::traverse_bfs(
            &self.snapshot(),
            start_id,
            opts,
            self.config.max_traversal_depth,
        )
    }

    /// Nodes ranked by resonance against `reference`.
    pub fn find_resonant_nodes(
        &self,
        reference: &MetricsVector,
        query: &ResonanceQuery,
    ) -> Vec<ScoredNode> {
        ResonanceRanker::rank(&self.snapshot(), reference, query)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Add a node, generating an id when none is given.
    ///
    /// The stored resonance score is computed against the ideal reference
    /// vector. L0 is reserved for the canonical set.
    pub fn add_node(&self, draft: NodeDraft) -> GraphResult<String> {
        let node = new_node(draft)?;
        let id = node.id.clone();
        self.write(|state| state.insert_node(node)).map_err(|e| {
            tracing::warn!("add_node failed: {}", e);
            e
        })?;
        tracing::debug!("Added node {}", id);
        Ok(id)
    }

    /// Add a node and an edge `from -> node` in one write. If `from` is
    /// missing neither is created.
    pub fn add_node_linked(
        &self,
        draft: NodeDraft,
        from: &str,
        edge_type: EdgeType,
        weight: f32,
    ) -> GraphResult<String> {
        let node = new_node(draft)?;
        let id = node.id.clone();
        let edge = new_edge(from, &id, edge_type, weight);
        self.write(|state| {
            if !state.contains(from) {
                return Err(GraphError::NotFound(from.to_string()));
            }
            state.insert_node(node)?;
            state.insert_edge(edge)
        })
        .map_err(|e| {
            tracing::warn!("add_node_linked from {} failed: {}", from, e);
            e
        })?;
        tracing::debug!("Added node {} linked from {}", id, from);
        Ok(id)
    }

    /// Add an edge. Both endpoints must exist; `related_ids` on both sides are
    /// updated in the same write. Weight is clamped to [0, 1].
    pub fn add_edge(
        &self,
        source: &str,
        target: &str,
        edge_type: EdgeType,
        weight: f32,
    ) -> GraphResult<String> {
        let edge = new_edge(source, target, edge_type, weight);
        let id = edge.id.clone();
        self.write(|state| state.insert_edge(edge)).map_err(|e| {
            tracing::warn!("add_edge {} -> {} failed: {}", source, target, e);
            e
        })?;
        Ok(id)
    }

    /// Replace a node's content. Canonical nodes are refused.
    pub fn update_content(&self, id: &str, content: impl Into<String>) -> GraphResult<()> {
        let content = content.into();
        self.write(|state| {
            let mut node = state
                .node(id)
                .cloned()
                .ok_or_else(|| GraphError::NotFound(id.to_string()))?;
            if node.is_canonical() {
                return Err(GraphError::ImmutableViolation(id.to_string()));
            }
            node.content = content;
            state.replace_node(node);
            Ok(())
        })
    }

    /// Remove a node and every edge touching it. Canonical nodes are refused.
    pub fn remove_node(&self, id: &str) -> GraphResult<MemoryNode> {
        self.write(|state| {
            let node = state
                .node(id)
                .cloned()
                .ok_or_else(|| GraphError::NotFound(id.to_string()))?;
            if node.is_canonical() {
                tracing::warn!("Refused to remove canonical node {}", id);
                return Err(GraphError::ImmutableViolation(id.to_string()));
            }
            state.retain_nodes(|n| n.id != id);
            Ok(node)
        })
    }

    /// Drop everything except the canonical set, then re-assert it.
    pub fn clear_memory(&self) {
        let result = self.write(|state| {
            let before = state.nodes().len();
            state.retain_nodes(MemoryNode::is_canonical);
            let removed = before - state.nodes().len();
            ensure_canon(state);
            Ok(removed)
        });
        match result {
            Ok(removed) => tracing::info!("Cleared {} node(s) from memory", removed),
            Err(e) => tracing::warn!("clear_memory failed: {}", e),
        }
    }

    /// Create the edges proposed by the connection heuristics, in one write.
    /// Unknown ids and bad candidates are skipped, never reported.
    pub fn build_connections(&self, id: &str) -> Vec<MemoryEdge> {
        let result = self.write(|state| {
            let proposals = self.connections.propose_in(state, id);
            let mut created = Vec::with_capacity(proposals.len());
            for p in proposals {
                let edge = new_edge(id, &p.target, p.edge_type, p.weight);
                match state.insert_edge(edge.clone()) {
                    Ok(()) => created.push(edge),
                    Err(e) => tracing::debug!("Skipping proposed edge to {}: {}", p.target, e),
                }
            }
            Ok(created)
        });
        match result {
            Ok(created) => {
                if !created.is_empty() {
                    tracing::debug!("Built {} connection(s) for {}", created.len(), id);
                }
                created
            }
            Err(e) => {
                tracing::warn!("build_connections for {} failed: {}", id, e);
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Export / import
    // =========================================================================

    pub fn export_graph(&self) -> GraphSnapshot {
        self.state.load().to_snapshot()
    }

    /// Replace the whole graph with `snapshot`.
    ///
    /// Fails with `Serialization` on duplicate node ids, duplicate edge ids,
    /// dangling edge endpoints, or a non-canonical id claiming L0 or the
    /// canonical flags, leaving the current graph untouched. Edge weights and
    /// stored resonance scores are clamped into [0, 1]. On success the
    /// canonical set is re-asserted and `related_ids` are rebuilt from the
    /// edge list.
    pub fn import_graph(&self, mut snapshot: GraphSnapshot) -> GraphResult<()> {
        validate_snapshot(&snapshot)?;
        clamp_snapshot(&mut snapshot);
        let (nodes, edges) = (snapshot.nodes.len(), snapshot.edges.len());
        self.write(|state| {
            let mut next = GraphState::default();
            next.rebuild(snapshot.nodes, snapshot.edges);
            ensure_canon(&mut next);
            *state = next;
            Ok(())
        })?;
        tracing::info!("Imported graph: {} nodes, {} edges", nodes, edges);
        Ok(())
    }

    pub fn export_json(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(&self.export_graph())?)
    }

    pub fn import_json(&self, json: &str) -> GraphResult<()> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)?;
        self.import_graph(snapshot)
    }
}

fn new_node(draft: NodeDraft) -> GraphResult<MemoryNode> {
    let id = draft.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if draft.layer == Layer::L0 {
        tracing::warn!("Rejected write of {} into the canonical layer", id);
        return Err(GraphError::ImmutableViolation(id));
    }

    let snapshot = draft.metrics.as_ref().map(MetricsVector::sanitized);
    Ok(MemoryNode {
        id,
        layer: draft.layer,
        node_type: draft.node_type,
        content: draft.content,
        timestamp: Utc::now(),
        related_ids: BTreeSet::new(),
        resonance_score: snapshot.as_ref().map(ideal_resonance),
        metrics_snapshot: snapshot,
        metadata: NodeMetadata {
            canonical: false,
            immutable: false,
            extra: draft.extra,
        },
    })
}

fn clamp_weight(weight: f32) -> f32 {
    if weight.is_finite() {
        if !(0.0..=1.0).contains(&weight) {
            tracing::debug!("Edge weight {} clamped into [0, 1]", weight);
        }
        weight.clamp(0.0, 1.0)
    } else {
        tracing::debug!("Non-finite edge weight, using 0");
        0.0
    }
}

fn new_edge(source: &str, target: &str, edge_type: EdgeType, weight: f32) -> MemoryEdge {
    MemoryEdge {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        target: target.to_string(),
        edge_type,
        weight: clamp_weight(weight),
    }
}

/// Bring imported weights and scores back into [0, 1]. A non-finite score is dropped.
fn clamp_snapshot(snapshot: &mut GraphSnapshot) {
    for edge in &mut snapshot.edges {
        edge.weight = clamp_weight(edge.weight);
    }
    for node in &mut snapshot.nodes {
        node.resonance_score = match node.resonance_score {
            Some(s) if s.is_finite() => Some(s.clamp(0.0, 1.0)),
            Some(_) => {
                tracing::debug!("Dropping non-finite resonance score on {}", node.id);
                None
            }
            None => None,
        };
    }
}

fn validate_snapshot(snapshot: &GraphSnapshot) -> GraphResult<()> {
    let mut node_ids = HashSet::with_capacity(snapshot.nodes.len());
    for node in &snapshot.nodes {
        if !node_ids.insert(node.id.as_str()) {
            return Err(GraphError::Serialization(format!("duplicate node id {}", node.id)));
        }
        let claims_canon =
            node.layer == Layer::L0 || node.metadata.canonical || node.metadata.immutable;
        if claims_canon && !is_canon_id(&node.id) {
            return Err(GraphError::Serialization(format!(
                "node {} is not part of the canonical set",
                node.id
            )));
        }
    }
    let mut edge_ids = HashSet::with_capacity(snapshot.edges.len());
    for edge in &snapshot.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(GraphError::Serialization(format!("duplicate edge id {}", edge.id)));
        }
        for end in [&edge.source, &edge.target] {
            if !node_ids.contains(end.as_str()) {
                return Err(GraphError::Serialization(format!(
                    "edge {} references missing node {}",
                    edge.id, end
                )));
            }
        }
    }
    Ok(())
}
