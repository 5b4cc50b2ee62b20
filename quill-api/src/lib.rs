//! Quill public API — identifier types, the Cypher [`Value`] algebra, and the
//! [`GraphStore`]/[`GraphSnapshot`] traits the query engine is built against.
//!
//! This crate has no knowledge of Cypher syntax or query planning; it only
//! fixes the data model (§3 of the engine specification) that the storage
//! and query crates share.

pub mod error;
pub mod temporal;
pub mod value;

pub use error::{Error, Result};
pub use value::{NativeValue, PointCrs, Value};

use std::collections::BTreeMap;

/// External identifier for a node or edge, assigned by the embedding layer.
///
/// Stable across the lifetime of the graph; distinct from [`InternalNodeId`]
/// which is an implementation detail of the storage arena.
pub type ExternalId = u64;

/// Internal, arena-slot identifier for a node.
pub type InternalNodeId = u32;

/// Internal, arena-slot identifier for an edge.
pub type InternalEdgeId = u32;

/// Interned identifier for a node label.
pub type LabelId = u32;

/// Interned identifier for a relationship type.
pub type RelTypeId = u32;

/// A directed edge, identified by its endpoints and relationship type.
///
/// Used as the natural key for adjacency lookups; the storage layer also
/// assigns every edge a stable [`InternalEdgeId`] for identity purposes
/// (property lookups, `Delete`, path construction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct EdgeKey {
    pub id: InternalEdgeId,
    pub src: InternalNodeId,
    pub rel_type: RelTypeId,
    pub dst: InternalNodeId,
}

/// Traversal direction for a relationship pattern segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Out,
    In,
    /// Matches either direction; used by undirected patterns (§4.3).
    Either,
}

/// An immutable snapshot of aggregate graph cardinalities, consumed by the
/// optimizer's cost model (§3.3, §6.5).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphStatistics {
    pub total_nodes: u64,
    pub total_edges: u64,
    pub node_counts_by_label: BTreeMap<LabelId, u64>,
    pub edge_counts_by_type: BTreeMap<RelTypeId, u64>,
    pub avg_degree_by_type: BTreeMap<RelTypeId, f64>,
    /// Microseconds since the Unix epoch when this snapshot was produced.
    pub last_updated_timestamp: i64,
}

impl GraphStatistics {
    pub fn node_count_for_label(&self, label: LabelId) -> u64 {
        self.node_counts_by_label.get(&label).copied().unwrap_or(0)
    }

    pub fn edge_count_for_type(&self, rel_type: RelTypeId) -> u64 {
        self.edge_counts_by_type.get(&rel_type).copied().unwrap_or(0)
    }

    pub fn avg_out_degree_for_type(&self, rel_type: RelTypeId) -> f64 {
        self.avg_degree_by_type.get(&rel_type).copied().unwrap_or(0.0)
    }
}

/// Anything that can hand out a read-only, point-in-time view of a graph.
///
/// Implemented by the storage layer's `Graph`; the query engine only ever
/// touches graph state through a `GraphSnapshot`.
pub trait GraphStore {
    type Snapshot: GraphSnapshot;

    /// Takes a consistent, independent snapshot of the current graph state.
    fn snapshot(&self) -> Self::Snapshot;
}

/// A read-only view over graph topology, labels, types, and properties.
///
/// Mirrors the Graph Store contract in spec.md §4.1; every method here maps
/// to one row of that table.
pub trait GraphSnapshot {
    /// Outgoing or incoming edges for `node`, optionally filtered by
    /// relationship type. Returns an empty vector for an unknown node id,
    /// per §4.1.
    fn outgoing(&self, node: InternalNodeId, rel_type: Option<RelTypeId>) -> Vec<EdgeKey>;
    fn incoming(&self, node: InternalNodeId, rel_type: Option<RelTypeId>) -> Vec<EdgeKey>;

    /// All node ids currently in the graph, in insertion order.
    fn all_nodes(&self) -> Vec<InternalNodeId>;

    /// Node ids bearing `label`, in insertion order.
    fn nodes_by_label(&self, label: LabelId) -> Vec<InternalNodeId>;

    fn node_exists(&self, node: InternalNodeId) -> bool;
    fn edge_exists(&self, edge: InternalEdgeId) -> bool;

    fn node_labels(&self, node: InternalNodeId) -> Vec<LabelId>;
    fn has_label(&self, node: InternalNodeId, label: LabelId) -> bool {
        self.node_labels(node).contains(&label)
    }

    fn edge_rel_type(&self, edge: InternalEdgeId) -> Option<RelTypeId>;
    fn edge_endpoints(&self, edge: InternalEdgeId) -> Option<(InternalNodeId, InternalNodeId)>;

    fn node_property(&self, node: InternalNodeId, key: &str) -> Option<Value>;
    fn edge_property(&self, edge: InternalEdgeId, key: &str) -> Option<Value>;

    fn node_properties(&self, node: InternalNodeId) -> BTreeMap<String, Value>;
    fn edge_properties(&self, edge: InternalEdgeId) -> BTreeMap<String, Value>;

    fn resolve_label_id(&self, name: &str) -> Option<LabelId>;
    fn resolve_rel_type_id(&self, name: &str) -> Option<RelTypeId>;
    fn label_name(&self, id: LabelId) -> Option<&str>;
    fn rel_type_name(&self, id: RelTypeId) -> Option<&str>;

    fn statistics(&self) -> &GraphStatistics;
}

/// Validates a label name per spec.md §6.3: must begin with a letter and
/// contain only alphanumerics or underscores thereafter.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates a relationship-type (or variable) name per spec.md §6.3: same
/// as a label name, but may also begin with an underscore.
pub fn is_valid_rel_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Variable names follow the same rule as relationship-type names (§6.3).
pub fn is_valid_variable_name(name: &str) -> bool {
    is_valid_rel_type_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_names_must_start_with_a_letter() {
        assert!(is_valid_label_name("Person"));
        assert!(is_valid_label_name("Person_2"));
        assert!(!is_valid_label_name("_Person"));
        assert!(!is_valid_label_name("2Person"));
        assert!(!is_valid_label_name(""));
    }

    #[test]
    fn rel_type_names_may_start_with_underscore() {
        assert!(is_valid_rel_type_name("_KNOWS"));
        assert!(is_valid_rel_type_name("KNOWS"));
        assert!(!is_valid_rel_type_name("1KNOWS"));
    }

    #[test]
    fn variable_names_follow_rel_type_rules() {
        assert!(is_valid_variable_name("_anon_1"));
        assert!(!is_valid_variable_name("1x"));
    }
}
