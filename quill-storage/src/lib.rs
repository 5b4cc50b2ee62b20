//! The in-memory property graph store (spec.md §3, §4.1).
//!
//! `Graph` owns every [`Node`](NodeRecord) and [`Edge`](EdgeRecord) record
//! and keeps adjacency lists, label/relationship-type indexes, and a live
//! [`GraphStatistics`] snapshot consistent with every mutation. There is no
//! on-disk persistence or write-ahead log here — spec.md's Non-goals exclude
//! that; `snapshot()`/`restore()` are a plain deep copy, used by the
//! embedding layer to implement transactions (spec.md §3.4, §6.2).

pub mod error;
mod interner;

pub use error::{Error, Result};

use chrono::Utc;
use interner::Interner;
use quill_api::{
    Direction, EdgeKey, ExternalId, GraphSnapshot, GraphStatistics, GraphStore, InternalEdgeId,
    InternalNodeId, LabelId, RelTypeId, Value,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// A node record: stable identity, an unordered label set, and a property
/// map (spec.md §3.1).
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub external_id: Option<ExternalId>,
    pub labels: Vec<LabelId>,
    pub properties: BTreeMap<String, Value>,
}

/// A directed edge record: single relationship type, ordered endpoints
/// (spec.md §3.1).
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub rel_type: RelTypeId,
    pub src: InternalNodeId,
    pub dst: InternalNodeId,
    pub properties: BTreeMap<String, Value>,
}

/// The graph store. Arena-indexed: a node/edge's id is its slot; deleting a
/// record tombstones the slot (`None`) rather than shifting ids, so
/// insertion order of surviving entries is preserved for scans (§3.3/§5).
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<NodeRecord>>,
    edges: Vec<Option<EdgeRecord>>,
    outgoing: FxHashMap<InternalNodeId, Vec<EdgeKey>>,
    incoming: FxHashMap<InternalNodeId, Vec<EdgeKey>>,
    label_index: FxHashMap<LabelId, Vec<InternalNodeId>>,
    rel_type_index: FxHashMap<RelTypeId, Vec<InternalEdgeId>>,
    label_interner: Interner,
    rel_type_interner: Interner,
    external_to_internal: FxHashMap<ExternalId, InternalNodeId>,
    next_external_id: ExternalId,
    stats: GraphStatistics,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- label / relationship-type vocabulary -------------------------

    /// Interns a label name, creating it if unseen. Used by `CREATE`.
    pub fn intern_label(&mut self, name: &str) -> Result<LabelId> {
        if !quill_api::is_valid_label_name(name) {
            return Err(quill_api::Error::InvalidLabelName(name.to_string()).into());
        }
        Ok(self.label_interner.get_or_intern(name))
    }

    /// Interns a relationship-type name, creating it if unseen.
    pub fn intern_rel_type(&mut self, name: &str) -> Result<RelTypeId> {
        if !quill_api::is_valid_rel_type_name(name) {
            return Err(quill_api::Error::InvalidRelTypeName(name.to_string()).into());
        }
        Ok(self.rel_type_interner.get_or_intern(name))
    }

    /// Looks up a label id without creating one; `MATCH (n:Unseen)` should
    /// scan zero rows, not fail, when the label was never created.
    pub fn resolve_label_id(&self, name: &str) -> Option<LabelId> {
        self.label_interner.get_id(name)
    }

    pub fn resolve_rel_type_id(&self, name: &str) -> Option<RelTypeId> {
        self.rel_type_interner.get_id(name)
    }

    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.label_interner.get_name(id)
    }

    pub fn rel_type_name(&self, id: RelTypeId) -> Option<&str> {
        self.rel_type_interner.get_name(id)
    }

    // ---- node / edge lookups -------------------------------------------

    pub fn get_node(&self, id: InternalNodeId) -> Option<&NodeRecord> {
        self.nodes.get(id as usize).and_then(|n| n.as_ref())
    }

    fn get_node_mut(&mut self, id: InternalNodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id as usize).and_then(|n| n.as_mut())
    }

    pub fn get_edge(&self, id: InternalEdgeId) -> Option<&EdgeRecord> {
        self.edges.get(id as usize).and_then(|e| e.as_ref())
    }

    fn get_edge_mut(&mut self, id: InternalEdgeId) -> Option<&mut EdgeRecord> {
        self.edges.get_mut(id as usize).and_then(|e| e.as_mut())
    }

    pub fn get_nodes_by_label(&self, label: LabelId) -> &[InternalNodeId] {
        self.label_index.get(&label).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn resolve_external(&self, id: InternalNodeId) -> Option<ExternalId> {
        self.get_node(id).and_then(|n| n.external_id)
    }

    pub fn resolve_internal(&self, external_id: ExternalId) -> Option<InternalNodeId> {
        self.external_to_internal.get(&external_id).copied()
    }

    // ---- mutation: nodes -------------------------------------------------

    /// Creates a new node with a fresh internal id. `properties` with a
    /// `Value::Null` entry are dropped (NULL properties are never stored,
    /// spec.md §4.7 Create/Set).
    pub fn create_node(
        &mut self,
        labels: &[String],
        properties: BTreeMap<String, Value>,
    ) -> Result<InternalNodeId> {
        let label_ids = labels.iter().map(|l| self.intern_label(l)).collect::<Result<Vec<_>>>()?;
        let id = self.nodes.len() as InternalNodeId;
        let record = NodeRecord {
            external_id: None,
            labels: label_ids.clone(),
            properties: properties.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        };
        self.nodes.push(Some(record));
        for label in label_ids {
            self.label_index.entry(label).or_default().push(id);
        }
        self.outgoing.insert(id, Vec::new());
        self.incoming.insert(id, Vec::new());
        self.stats.total_nodes += 1;
        self.touch_stats_timestamp();
        tracing::trace!(node_id = id, "created node");
        Ok(id)
    }

    /// `add_node` per spec.md §4.1: inserts a node at a caller-supplied
    /// external id, replacing any existing node with that external id.
    pub fn add_node(
        &mut self,
        external_id: ExternalId,
        labels: &[String],
        properties: BTreeMap<String, Value>,
    ) -> Result<InternalNodeId> {
        if let Some(&existing) = self.external_to_internal.get(&external_id) {
            self.remove_node(existing, true)?;
        }
        let id = self.create_node(labels, properties)?;
        if let Some(node) = self.get_node_mut(id) {
            node.external_id = Some(external_id);
        }
        self.external_to_internal.insert(external_id, id);
        Ok(id)
    }

    /// Removes a node. If it has any incident edges and `detach` is false,
    /// fails with a constraint violation (spec.md §4.7 Delete).
    pub fn remove_node(&mut self, id: InternalNodeId, detach: bool) -> Result<()> {
        let Some(node) = self.nodes.get(id as usize).and_then(|n| n.as_ref()) else {
            return Err(Error::UnknownNode(id));
        };
        let incident: Vec<EdgeKey> = self
            .outgoing
            .get(&id)
            .into_iter()
            .flatten()
            .chain(self.incoming.get(&id).into_iter().flatten())
            .copied()
            .collect();
        if !incident.is_empty() && !detach {
            return Err(Error::ConstraintViolation(format!(
                "node {id} has incident edges; use DETACH DELETE"
            )));
        }
        for edge in incident {
            self.remove_edge(edge.id).ok();
        }
        let label_ids = node.labels.clone();
        let external_id = node.external_id;
        for label in label_ids {
            if let Some(ids) = self.label_index.get_mut(&label) {
                ids.retain(|&n| n != id);
            }
        }
        if let Some(ext) = external_id {
            self.external_to_internal.remove(&ext);
        }
        self.nodes[id as usize] = None;
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        self.stats.total_nodes = self.stats.total_nodes.saturating_sub(1);
        self.touch_stats_timestamp();
        Ok(())
    }

    pub fn set_node_property(&mut self, id: InternalNodeId, key: &str, value: Value) -> Result<()> {
        let node = self.get_node_mut(id).ok_or(Error::UnknownNode(id))?;
        if value.is_null() {
            node.properties.remove(key);
        } else {
            node.properties.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn remove_node_property(&mut self, id: InternalNodeId, key: &str) -> Result<()> {
        let node = self.get_node_mut(id).ok_or(Error::UnknownNode(id))?;
        node.properties.remove(key);
        Ok(())
    }

    /// Adds a label to a node. Spec.md §4.7 describes label removal as
    /// "replacing the node" since labels are otherwise identity-immutable;
    /// in this in-memory store that is just an index-consistent mutation.
    pub fn add_node_label(&mut self, id: InternalNodeId, label: &str) -> Result<()> {
        let label_id = self.intern_label(label)?;
        let node = self.get_node_mut(id).ok_or(Error::UnknownNode(id))?;
        if !node.labels.contains(&label_id) {
            node.labels.push(label_id);
            self.label_index.entry(label_id).or_default().push(id);
        }
        Ok(())
    }

    pub fn remove_node_label(&mut self, id: InternalNodeId, label: &str) -> Result<()> {
        let Some(label_id) = self.resolve_label_id(label) else { return Ok(()) };
        let node = self.get_node_mut(id).ok_or(Error::UnknownNode(id))?;
        node.labels.retain(|&l| l != label_id);
        if let Some(ids) = self.label_index.get_mut(&label_id) {
            ids.retain(|&n| n != id);
        }
        Ok(())
    }

    // ---- mutation: edges -------------------------------------------------

    /// `add_edge`: fails `MissingEndpoint` unless both endpoints exist
    /// (spec.md §4.1).
    pub fn add_edge(
        &mut self,
        rel_type: &str,
        src: InternalNodeId,
        dst: InternalNodeId,
        properties: BTreeMap<String, Value>,
    ) -> Result<InternalEdgeId> {
        if self.get_node(src).is_none() || self.get_node(dst).is_none() {
            return Err(Error::MissingEndpoint { src, dst });
        }
        let rel_type_id = self.intern_rel_type(rel_type)?;
        let id = self.edges.len() as InternalEdgeId;
        let record = EdgeRecord {
            rel_type: rel_type_id,
            src,
            dst,
            properties: properties.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        };
        self.edges.push(Some(record));
        let key = EdgeKey { id, src, rel_type: rel_type_id, dst };
        self.outgoing.entry(src).or_default().push(key);
        self.incoming.entry(dst).or_default().push(key);
        self.rel_type_index.entry(rel_type_id).or_default().push(id);
        self.stats.total_edges += 1;
        self.recompute_degree_stat(rel_type_id);
        self.touch_stats_timestamp();
        tracing::trace!(edge_id = id, src, dst, "created edge");
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: InternalEdgeId) -> Result<()> {
        let edge = self.get_edge(id).cloned().ok_or(Error::UnknownEdge(id))?;
        if let Some(out) = self.outgoing.get_mut(&edge.src) {
            out.retain(|e| e.id != id);
        }
        if let Some(inn) = self.incoming.get_mut(&edge.dst) {
            inn.retain(|e| e.id != id);
        }
        if let Some(ids) = self.rel_type_index.get_mut(&edge.rel_type) {
            ids.retain(|&e| e != id);
        }
        self.edges[id as usize] = None;
        self.stats.total_edges = self.stats.total_edges.saturating_sub(1);
        self.recompute_degree_stat(edge.rel_type);
        self.touch_stats_timestamp();
        Ok(())
    }

    pub fn set_edge_property(&mut self, id: InternalEdgeId, key: &str, value: Value) -> Result<()> {
        let edge = self.get_edge_mut(id).ok_or(Error::UnknownEdge(id))?;
        if value.is_null() {
            edge.properties.remove(key);
        } else {
            edge.properties.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn remove_edge_property(&mut self, id: InternalEdgeId, key: &str) -> Result<()> {
        let edge = self.get_edge_mut(id).ok_or(Error::UnknownEdge(id))?;
        edge.properties.remove(key);
        Ok(())
    }

    // ---- statistics --------------------------------------------------------

    fn touch_stats_timestamp(&mut self) {
        self.stats.last_updated_timestamp = Utc::now().timestamp_micros();
        self.stats.node_counts_by_label = self
            .label_index
            .iter()
            .map(|(&label, ids)| (label, ids.len() as u64))
            .collect();
        self.stats.edge_counts_by_type = self
            .rel_type_index
            .iter()
            .map(|(&rel_type, ids)| (rel_type, ids.len() as u64))
            .collect();
    }

    /// Mean out-degree for a relationship type: edges of that type per
    /// node currently in the graph (spec.md §3.3).
    fn recompute_degree_stat(&mut self, rel_type: RelTypeId) {
        let edge_count = self.rel_type_index.get(&rel_type).map(|v| v.len()).unwrap_or(0) as f64;
        let node_count = self.stats.total_nodes.max(1) as f64;
        self.stats.avg_degree_by_type.insert(rel_type, edge_count / node_count);
    }

    pub fn statistics(&self) -> &GraphStatistics {
        &self.stats
    }

    /// Recounts every statistic from primary storage — the integrity check
    /// named in spec.md §4.1's invariants and §9's "periodic compaction".
    pub fn recount_statistics(&mut self) -> GraphStatistics {
        let total_nodes = self.nodes.iter().filter(|n| n.is_some()).count() as u64;
        let total_edges = self.edges.iter().filter(|e| e.is_some()).count() as u64;
        let node_counts_by_label = self
            .label_index
            .iter()
            .map(|(&label, ids)| (label, ids.len() as u64))
            .collect();
        let edge_counts_by_type = self
            .rel_type_index
            .iter()
            .map(|(&rel_type, ids)| (rel_type, ids.len() as u64))
            .collect();
        let avg_degree_by_type = self
            .rel_type_index
            .iter()
            .map(|(&rel_type, ids)| (rel_type, ids.len() as f64 / total_nodes.max(1) as f64))
            .collect();
        self.stats = GraphStatistics {
            total_nodes,
            total_edges,
            node_counts_by_label,
            edge_counts_by_type,
            avg_degree_by_type,
            last_updated_timestamp: Utc::now().timestamp_micros(),
        };
        self.stats.clone()
    }

    // ---- transactions: snapshot / restore ---------------------------------

    /// Deep-copies the whole graph state for transactional rollback
    /// (spec.md §3.4). The embedding layer's `begin`/`commit`/`rollback`
    /// API is built on this plus [`Graph::restore`]; this core keeps no
    /// log.
    pub fn snapshot(&self) -> Graph {
        self.clone()
    }

    /// Replaces the current graph state with a previously taken snapshot.
    /// Per spec.md §9's open question, the restored statistics are
    /// authoritative — there is no reconciliation with mutations that ran
    /// before rollback.
    pub fn restore(&mut self, snapshot: Graph) {
        *self = snapshot;
    }
}

impl GraphStore for Graph {
    type Snapshot = Graph;

    fn snapshot(&self) -> Self::Snapshot {
        Graph::snapshot(self)
    }
}

impl GraphSnapshot for Graph {
    fn outgoing(&self, node: InternalNodeId, rel_type: Option<RelTypeId>) -> Vec<EdgeKey> {
        self.adjacency(node, rel_type, Direction::Out)
    }

    fn incoming(&self, node: InternalNodeId, rel_type: Option<RelTypeId>) -> Vec<EdgeKey> {
        self.adjacency(node, rel_type, Direction::In)
    }

    fn all_nodes(&self) -> Vec<InternalNodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| i as InternalNodeId))
            .collect()
    }

    fn nodes_by_label(&self, label: LabelId) -> Vec<InternalNodeId> {
        self.get_nodes_by_label(label).to_vec()
    }

    fn node_exists(&self, node: InternalNodeId) -> bool {
        self.get_node(node).is_some()
    }

    fn edge_exists(&self, edge: InternalEdgeId) -> bool {
        self.get_edge(edge).is_some()
    }

    fn node_labels(&self, node: InternalNodeId) -> Vec<LabelId> {
        self.get_node(node).map(|n| n.labels.clone()).unwrap_or_default()
    }

    fn edge_rel_type(&self, edge: InternalEdgeId) -> Option<RelTypeId> {
        self.get_edge(edge).map(|e| e.rel_type)
    }

    fn edge_endpoints(&self, edge: InternalEdgeId) -> Option<(InternalNodeId, InternalNodeId)> {
        self.get_edge(edge).map(|e| (e.src, e.dst))
    }

    fn node_property(&self, node: InternalNodeId, key: &str) -> Option<Value> {
        self.get_node(node).and_then(|n| n.properties.get(key).cloned())
    }

    fn edge_property(&self, edge: InternalEdgeId, key: &str) -> Option<Value> {
        self.get_edge(edge).and_then(|e| e.properties.get(key).cloned())
    }

    fn node_properties(&self, node: InternalNodeId) -> BTreeMap<String, Value> {
        self.get_node(node).map(|n| n.properties.clone()).unwrap_or_default()
    }

    fn edge_properties(&self, edge: InternalEdgeId) -> BTreeMap<String, Value> {
        self.get_edge(edge).map(|e| e.properties.clone()).unwrap_or_default()
    }

    fn resolve_label_id(&self, name: &str) -> Option<LabelId> {
        Graph::resolve_label_id(self, name)
    }

    fn resolve_rel_type_id(&self, name: &str) -> Option<RelTypeId> {
        Graph::resolve_rel_type_id(self, name)
    }

    fn label_name(&self, id: LabelId) -> Option<&str> {
        Graph::label_name(self, id)
    }

    fn rel_type_name(&self, id: RelTypeId) -> Option<&str> {
        Graph::rel_type_name(self, id)
    }

    fn statistics(&self) -> &GraphStatistics {
        Graph::statistics(self)
    }
}

impl Graph {
    fn adjacency(&self, node: InternalNodeId, rel_type: Option<RelTypeId>, dir: Direction) -> Vec<EdgeKey> {
        let list = match dir {
            Direction::Out => self.outgoing.get(&node),
            Direction::In => self.incoming.get(&node),
            Direction::Either => None,
        };
        let Some(list) = list else { return Vec::new() };
        match rel_type {
            Some(t) => list.iter().filter(|e| e.rel_type == t).copied().collect(),
            None => list.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn add_edge_fails_with_missing_endpoint() {
        let mut g = Graph::new();
        let a = g.create_node(&["Person".to_string()], props(&[])).unwrap();
        let err = g.add_edge("KNOWS", a, 99, props(&[])).unwrap_err();
        assert_eq!(err, Error::MissingEndpoint { src: a, dst: 99 });
    }

    #[test]
    fn statistics_match_a_fresh_recount() {
        let mut g = Graph::new();
        let a = g.create_node(&["Person".to_string()], props(&[])).unwrap();
        let b = g.create_node(&["Person".to_string()], props(&[])).unwrap();
        g.add_edge("KNOWS", a, b, props(&[])).unwrap();
        let live = g.statistics().clone();
        let recount = g.recount_statistics();
        assert_eq!(live.total_nodes, recount.total_nodes);
        assert_eq!(live.total_edges, recount.total_edges);
    }

    #[test]
    fn delete_without_detach_on_connected_node_is_a_constraint_violation() {
        let mut g = Graph::new();
        let a = g.create_node(&[], props(&[])).unwrap();
        let b = g.create_node(&[], props(&[])).unwrap();
        g.add_edge("R", a, b, props(&[])).unwrap();
        assert!(matches!(g.remove_node(a, false), Err(Error::ConstraintViolation(_))));
        assert!(g.remove_node(a, true).is_ok());
    }

    #[test]
    fn insert_then_delete_restores_original_statistics() {
        let mut g = Graph::new();
        let baseline = g.recount_statistics();
        let a = g.create_node(&["Person".to_string()], props(&[])).unwrap();
        let b = g.create_node(&["Person".to_string()], props(&[])).unwrap();
        let e = g.add_edge("KNOWS", a, b, props(&[])).unwrap();
        g.remove_edge(e).unwrap();
        g.remove_node(a, false).unwrap();
        g.remove_node(b, false).unwrap();
        let restored = g.recount_statistics();
        assert_eq!(baseline.total_nodes, restored.total_nodes);
        assert_eq!(baseline.total_edges, restored.total_edges);
    }

    #[test]
    fn snapshot_restore_round_trips_graph_state() {
        let mut g = Graph::new();
        let a = g.create_node(&["Person".to_string()], props(&[("name", Value::String("A".into()))])).unwrap();
        let snap = g.snapshot();
        g.set_node_property(a, "name", Value::String("B".into())).unwrap();
        assert_eq!(g.get_node(a).unwrap().properties.get("name"), Some(&Value::String("B".into())));
        g.restore(snap);
        assert_eq!(g.get_node(a).unwrap().properties.get("name"), Some(&Value::String("A".into())));
    }

    #[test]
    fn null_property_values_are_never_stored() {
        let mut g = Graph::new();
        let a = g.create_node(&[], props(&[("x", Value::Null), ("y", Value::Int(1))])).unwrap();
        let node = g.get_node(a).unwrap();
        assert!(!node.properties.contains_key("x"));
        assert!(node.properties.contains_key("y"));
    }
}
