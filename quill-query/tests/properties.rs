//! Property tests for two of spec.md §8's universal invariants, in the
//! corpus's `proptest` style (see e.g. `examples/maskdotdev-sombra`'s
//! `tests/property_tests.rs`).

use proptest::prelude::*;
use quill_query::ast::{Clause, NodePattern, PatternPart, ReturnItem};
use quill_query::query_api::{Params, QueryEngine};
use quill_storage::Graph;
use std::collections::BTreeMap;

fn arb_label() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{1,8}"
}

#[derive(Debug, Clone)]
enum Op {
    AddNode(String),
    AddEdge(String),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![arb_label().prop_map(Op::AddNode), arb_label().prop_map(Op::AddEdge),]
}

proptest! {
    /// Invariant 3: inserting then deleting back to the same multiset of
    /// nodes and edges restores the original statistics snapshot.
    #[test]
    fn invariant_statistics_restored_after_balanced_insert_delete(ops in prop::collection::vec(arb_op(), 0..30)) {
        let mut graph = Graph::new();
        let initial = graph.statistics().clone();

        let mut node_ids = Vec::new();
        let mut edge_ids = Vec::new();
        for op in &ops {
            match op {
                Op::AddNode(label) => {
                    node_ids.push(graph.create_node(&[label.clone()], BTreeMap::new()).unwrap());
                }
                Op::AddEdge(rel_type) => {
                    if node_ids.len() >= 2 {
                        let src = node_ids[0];
                        let dst = node_ids[node_ids.len() - 1];
                        if let Ok(id) = graph.add_edge(rel_type, src, dst, BTreeMap::new()) {
                            edge_ids.push(id);
                        }
                    }
                }
            }
        }

        for id in edge_ids.into_iter().rev() {
            graph.remove_edge(id).unwrap();
        }
        for id in node_ids.into_iter().rev() {
            graph.remove_node(id, true).unwrap();
        }

        let restored = graph.statistics();
        prop_assert_eq!(restored.total_nodes, initial.total_nodes);
        prop_assert_eq!(restored.total_edges, initial.total_edges);
    }

    /// Invariant 1: a read-only query never mutates the graph, for graphs
    /// of varying size.
    #[test]
    fn invariant_scan_all_nodes_never_mutates(labels in prop::collection::vec(arb_label(), 0..20)) {
        let mut graph = Graph::new();
        for label in &labels {
            graph.create_node(&[label.clone()], BTreeMap::new()).unwrap();
        }
        let before = graph.snapshot();

        let query = quill_query::ast::Query::Single(vec![
            Clause::Match {
                pattern: vec![PatternPart {
                    path_var: None,
                    nodes: vec![NodePattern { var: Some("n".to_string()), labels: Vec::new(), properties: Vec::new() }],
                    relationships: Vec::new(),
                }],
                where_: None,
            },
            Clause::Return { items: vec![ReturnItem::Item { expr: quill_query::ast::Expression::Variable("n".to_string()), alias: None }], distinct: false },
        ]);

        let engine = QueryEngine::new(graph);
        let prepared = engine.prepare(&query).unwrap();
        let rows = engine.execute_read(&prepared, &Params::new()).unwrap();

        prop_assert_eq!(rows.len(), labels.len());
        prop_assert_eq!(engine.graph().statistics().total_nodes, before.statistics().total_nodes);
    }
}
