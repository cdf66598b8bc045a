//! Associative memory graph.
//!
//! Nodes carry an optional metrics snapshot and a resonance score; typed,
//! weighted edges link them. The store seeds a canonical L0 set that no
//! ordinary write can touch, auto-links new nodes, and answers bounded
//! traversal and resonance-ranking queries over lock-free snapshots.

pub mod canon;
pub mod connections;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod persistence;
pub mod resonance;
pub mod sqlite;
pub mod store;
pub mod traversal;

pub use canon::{CANON_NODES, CANON_NODE_TYPE};
pub use connections::{ConnectionBuilder, ProposedEdge};
pub use coordinator::{Evaluation, Observation, SessionCoordinator};
pub use error::{GraphError, GraphResult};
pub use graph::{
    EdgeType, GraphSnapshot, GraphView, Layer, MemoryEdge, MemoryNode, NodeDraft, NodeMetadata,
};
pub use persistence::{GraphPersistence, JsonFilePersistence};
pub use resonance::{ResonanceQuery, ResonanceRanker, ScoredNode};
pub use sqlite::SqlitePersistence;
pub use store::{GraphStats, GraphStore};
pub use traversal::{TraversalEngine, TraversalOptions, Visit};

#[cfg(test)]
mod tests;
