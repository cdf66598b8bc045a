//! Graph data model: nodes, edges, the serialized document, and the
//! arena that backs a store.
//!
//! Nodes live in a flat arena addressed by string id. `related_ids` holds
//! ids, never references, so cycles in the graph are just data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use spark_core::MetricsVector;

use crate::error::{GraphError, GraphResult};

// ============================================================================
// Layers and edge types
// ============================================================================

/// Retention and mutability class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    /// Canonical identity. Written only by the bootstrap routine.
    L0,
    /// Long-term.
    L1,
    /// Session observation.
    L2,
    /// Ephemeral.
    L3,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::L0, Layer::L1, Layer::L2, Layer::L3];
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layer::L0 => "L0",
            Layer::L1 => "L1",
            Layer::L2 => "L2",
            Layer::L3 => "L3",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Similarity,
    Causal,
    Resonance,
    Temporal,
    Supports,
    Contradicts,
    Fractal,
}

impl EdgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Similarity => "SIMILARITY",
            EdgeType::Causal => "CAUSAL",
            EdgeType::Resonance => "RESONANCE",
            EdgeType::Temporal => "TEMPORAL",
            EdgeType::Supports => "SUPPORTS",
            EdgeType::Contradicts => "CONTRADICTS",
            EdgeType::Fractal => "FRACTAL",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Nodes and edges
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetadata {
    pub canonical: bool,
    pub immutable: bool,
    /// Free-form extras, kept verbatim through export/import.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeMetadata {
    pub fn is_protected(&self) -> bool {
        self.canonical || self.immutable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    pub id: String,
    pub layer: Layer,
    #[serde(rename = "type")]
    pub node_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Derived from the edge list; always symmetric.
    #[serde(default)]
    pub related_ids: BTreeSet<String>,
    #[serde(default)]
    pub metrics_snapshot: Option<MetricsVector>,
    #[serde(default)]
    pub resonance_score: Option<f32>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl MemoryNode {
    pub fn is_canonical(&self) -> bool {
        self.metadata.is_protected()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub weight: f32,
}

impl MemoryEdge {
    /// The endpoint opposite `id`, if `id` is one of them.
    pub fn other_end(&self, id: &str) -> Option<&str> {
        if self.source == id {
            Some(&self.target)
        } else if self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }

    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}

/// Input to [`GraphStore::add_node`](crate::GraphStore::add_node).
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub id: Option<String>,
    pub layer: Layer,
    pub node_type: String,
    pub content: String,
    pub metrics: Option<MetricsVector>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeDraft {
    pub fn new(layer: Layer, node_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            layer,
            node_type: node_type.into(),
            content: content.into(),
            metrics: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsVector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Serialized document
// ============================================================================

/// Export/import document: `{ "nodes": [...], "edges": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<MemoryNode>,
    #[serde(default)]
    pub edges: Vec<MemoryEdge>,
}

// ============================================================================
// Arena
// ============================================================================

/// Backing state of a store. Cloned and swapped whole on every write.
#[derive(Debug, Clone, Default)]
pub(crate) struct GraphState {
    nodes: Vec<MemoryNode>,
    index: HashMap<String, usize>,
    edges: Vec<MemoryEdge>,
    edge_ids: HashSet<String>,
    /// Node id -> indices into `edges`, both directions.
    adjacency: HashMap<String, Vec<usize>>,
}

impl GraphState {
    pub(crate) fn node(&self, id: &str) -> Option<&MemoryNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut MemoryNode> {
        match self.index.get(id) {
            Some(&i) => self.nodes.get_mut(i),
            None => None,
        }
    }

    pub(crate) fn nodes(&self) -> &[MemoryNode] {
        &self.nodes
    }

    pub(crate) fn edges(&self) -> &[MemoryEdge] {
        &self.edges
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub(crate) fn incident_edges(&self, id: &str) -> impl Iterator<Item = &MemoryEdge> {
        self.adjacency
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    pub(crate) fn has_edge_of_type(&self, a: &str, b: &str, edge_type: EdgeType) -> bool {
        self.incident_edges(a)
            .any(|e| e.edge_type == edge_type && e.joins(a, b))
    }

    pub(crate) fn insert_node(&mut self, node: MemoryNode) -> GraphResult<()> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Replace a node's fields in place, keeping its edges and `related_ids`.
    pub(crate) fn replace_node(&mut self, node: MemoryNode) {
        let related = self
            .node(&node.id)
            .map(|n| n.related_ids.clone())
            .unwrap_or_default();
        match self.node_mut(&node.id) {
            Some(slot) => {
                *slot = MemoryNode { related_ids: related, ..node };
            }
            None => {
                self.index.insert(node.id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Insert an edge and update both endpoints' `related_ids` together.
    pub(crate) fn insert_edge(&mut self, edge: MemoryEdge) -> GraphResult<()> {
        if !self.contains(&edge.source) {
            return Err(GraphError::NotFound(edge.source));
        }
        if !self.contains(&edge.target) {
            return Err(GraphError::NotFound(edge.target));
        }
        if self.edge_ids.contains(&edge.id) {
            return Err(GraphError::DuplicateId(edge.id));
        }

        let idx = self.edges.len();
        self.adjacency.entry(edge.source.clone()).or_default().push(idx);
        if edge.target != edge.source {
            self.adjacency.entry(edge.target.clone()).or_default().push(idx);
        }
        if let Some(n) = self.node_mut(&edge.source) {
            n.related_ids.insert(edge.target.clone());
        }
        if let Some(n) = self.node_mut(&edge.target) {
            n.related_ids.insert(edge.source.clone());
        }
        self.edge_ids.insert(edge.id.clone());
        self.edges.push(edge);
        Ok(())
    }

    /// Keep only nodes matching `keep`, dropping edges that lose an endpoint.
    pub(crate) fn retain_nodes(&mut self, keep: impl Fn(&MemoryNode) -> bool) {
        let nodes: Vec<MemoryNode> = self.nodes.drain(..).filter(|n| keep(n)).collect();
        let edges = std::mem::take(&mut self.edges);
        self.rebuild(nodes, edges);
    }

    /// Rebuild every index from scratch. Edges with a missing endpoint are dropped
    /// and `related_ids` is recomputed from the surviving edges.
    pub(crate) fn rebuild(&mut self, mut nodes: Vec<MemoryNode>, edges: Vec<MemoryEdge>) {
        for n in &mut nodes {
            n.related_ids.clear();
        }
        *self = GraphState::default();
        for node in nodes {
            self.index.insert(node.id.clone(), self.nodes.len());
            self.nodes.push(node);
        }
        for edge in edges {
            if let Err(e) = self.insert_edge(edge) {
                tracing::debug!("Dropping edge during rebuild: {}", e);
            }
        }
    }

    pub(crate) fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

// ============================================================================
// Read view
// ============================================================================

/// Immutable point-in-time view of a store.
///
/// Holding a view never blocks writers; later writes are simply not visible.
#[derive(Debug, Clone)]
pub struct GraphView {
    pub(crate) state: Arc<GraphState>,
}

impl GraphView {
    pub fn get_node(&self, id: &str) -> Option<&MemoryNode> {
        self.state.node(id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[MemoryNode] {
        self.state.nodes()
    }

    pub fn edges(&self) -> &[MemoryEdge] {
        self.state.edges()
    }

    pub fn node_count(&self) -> usize {
        self.state.nodes().len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.edges().len()
    }

    pub fn nodes_by_layer(&self, layer: Layer) -> Vec<&MemoryNode> {
        self.nodes().iter().filter(|n| n.layer == layer).collect()
    }

    pub fn nodes_by_type(&self, node_type: &str) -> Vec<&MemoryNode> {
        self.nodes().iter().filter(|n| n.node_type == node_type).collect()
    }

    /// Edges touching `id`, optionally restricted to `edge_types`.
    pub fn edges_of<'a>(
        &'a self,
        id: &'a str,
        edge_types: Option<&'a [EdgeType]>,
    ) -> impl Iterator<Item = &'a MemoryEdge> + 'a {
        self.state
            .incident_edges(id)
            .filter(move |e| edge_types.map_or(true, |types| types.contains(&e.edge_type)))
    }

    /// Distinct neighbors of `id` in first-edge order. Unknown id yields nothing.
    pub fn neighbors(&self, id: &str, edge_types: Option<&[EdgeType]>) -> Vec<&MemoryNode> {
        let mut seen = HashSet::new();
        self.edges_of(id, edge_types)
            .filter_map(|e| e.other_end(id))
            .filter(|other| *other != id && seen.insert(other.to_string()))
            .filter_map(|other| self.state.node(other))
            .collect()
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        self.state.to_snapshot()
    }
}
