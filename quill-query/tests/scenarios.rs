//! End-to-end scenarios (spec.md §8 S1-S6) and a sample of the universal
//! invariants, built against hand-constructed ASTs: this crate has no
//! Cypher text parser, so callers (and these tests) hand the planner an
//! already-built [`Query`] directly.

use quill_query::ast::{
    BinaryOperator, Clause, Expression, NodePattern, PatternDirection, PatternPart,
    Query, RelationshipPattern, ReturnItem, SortDirection,
};
use quill_query::optimizer::{self, OptimizerConfig};
use quill_query::planner::Planner;
use quill_query::query_api::{Params, QueryEngine};
use quill_api::Value;
use quill_storage::Graph;
use std::collections::BTreeMap;

fn var(name: &str) -> Expression {
    Expression::Variable(name.to_string())
}

fn prop(base: &str, key: &str) -> Expression {
    Expression::PropertyAccess { base: Box::new(var(base)), key: key.to_string() }
}

fn lit_int(n: i64) -> Expression {
    Expression::Literal(Value::Int(n))
}

fn binop(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
    Expression::BinaryOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

fn node_pattern(v: &str, labels: &[&str]) -> NodePattern {
    NodePattern { var: Some(v.to_string()), labels: labels.iter().map(|s| s.to_string()).collect(), properties: Vec::new() }
}

fn anon_node(v: &str) -> NodePattern {
    node_pattern(v, &[])
}

fn rel_pattern(v: Option<&str>, rel_type: &str, direction: PatternDirection) -> RelationshipPattern {
    RelationshipPattern {
        var: v.map(|s| s.to_string()),
        types: vec![rel_type.to_string()],
        direction,
        min_hops: None,
        max_hops: None,
        properties: Vec::new(),
    }
}

fn return_item(expr: Expression, alias: &str) -> ReturnItem {
    ReturnItem::Item { expr, alias: Some(alias.to_string()) }
}

fn props(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn single(clauses: Vec<Clause>) -> Query {
    Query::Single(clauses)
}

/// S1 — basic match with predicate and ORDER BY.
#[test]
fn s1_basic_match_with_predicate() {
    let mut graph = Graph::new();
    graph.create_node(&["Person".to_string()], props(&[("name", Value::String("Alice".into())), ("age", Value::Int(30))])).unwrap();
    graph.create_node(&["Person".to_string()], props(&[("name", Value::String("Bob".into())), ("age", Value::Int(25))])).unwrap();
    graph.create_node(&["Person".to_string()], props(&[("name", Value::String("Charlie".into())), ("age", Value::Int(70))])).unwrap();

    let query = single(vec![
        Clause::Match {
            pattern: vec![PatternPart { path_var: None, nodes: vec![node_pattern("p", &["Person"])], relationships: vec![] }],
            where_: Some(binop(BinaryOperator::Gt, prop("p", "age"), lit_int(25))),
        },
        Clause::Return { items: vec![return_item(prop("p", "name"), "p.name")], distinct: false },
        Clause::OrderBy { items: vec![(prop("p", "name"), SortDirection::Ascending)] },
    ]);

    let engine = QueryEngine::new(graph);
    let prepared = engine.prepare(&query).unwrap();
    let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get("p.name").unwrap().display_string()).collect();
    assert_eq!(names, vec!["Alice".to_string(), "Charlie".to_string()]);
}

/// S2 — power operator is right-associative.
#[test]
fn s2_power_right_associative() {
    let engine = QueryEngine::new(Graph::new());

    let right_assoc = single(vec![Clause::Return {
        items: vec![return_item(
            binop(BinaryOperator::Pow, lit_int(2), binop(BinaryOperator::Pow, lit_int(3), lit_int(2))),
            "r",
        )],
        distinct: false,
    }]);
    let prepared = engine.prepare(&right_assoc).unwrap();
    let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
    assert_eq!(rows[0].get("r"), Some(&Value::Int(512)));

    let left_assoc = single(vec![Clause::Return {
        items: vec![return_item(
            binop(BinaryOperator::Pow, binop(BinaryOperator::Pow, lit_int(2), lit_int(3)), lit_int(2)),
            "r",
        )],
        distinct: false,
    }]);
    let prepared = engine.prepare(&left_assoc).unwrap();
    let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
    assert_eq!(rows[0].get("r"), Some(&Value::Int(64)));
}

fn seed_knows_triangle() -> Graph {
    let mut graph = Graph::new();
    let a = graph.create_node(&["Person".to_string()], props(&[("name", Value::String("A".into()))])).unwrap();
    let b = graph.create_node(&["Person".to_string()], props(&[("name", Value::String("B".into()))])).unwrap();
    let c = graph.create_node(&["Person".to_string()], props(&[("name", Value::String("C".into()))])).unwrap();
    graph.add_edge("KNOWS", a, b, BTreeMap::new()).unwrap();
    graph.add_edge("KNOWS", a, c, BTreeMap::new()).unwrap();
    graph.add_edge("KNOWS", b, c, BTreeMap::new()).unwrap();
    graph
}

/// S3 — aggregate pushdown does not change results, with or without it enabled.
#[test]
fn s3_aggregate_pushdown_correctness() {
    let query_for = |p_name_var: &str| {
        single(vec![
            Clause::Match {
                pattern: vec![PatternPart {
                    path_var: None,
                    nodes: vec![node_pattern("p", &["Person"]), anon_node("f")],
                    relationships: vec![rel_pattern(None, "KNOWS", PatternDirection::Out)],
                }],
                where_: None,
            },
            Clause::With(quill_query::ast::WithClause {
                items: vec![
                    ReturnItem::Item { expr: var("p"), alias: None },
                    ReturnItem::Item {
                        expr: Expression::FunctionCall { name: "count".to_string(), args: vec![var("f")], distinct: false },
                        alias: Some(p_name_var.to_string()),
                    },
                ],
                distinct: false,
                where_: None,
                order_by: Vec::new(),
                skip: None,
                limit: None,
            }),
            Clause::Return {
                items: vec![return_item(prop("p", "name"), "p.name"), return_item(var(p_name_var), p_name_var)],
                distinct: false,
            },
            Clause::OrderBy { items: vec![(var(p_name_var), SortDirection::Descending)] },
        ])
    };

    for config in [OptimizerConfig::default(), OptimizerConfig::disabled()] {
        let graph = seed_knows_triangle();
        let mut planner = Planner::new();
        let ops = planner.plan(&query_for("n")).unwrap();
        let ops = optimizer::optimize(ops, &graph, &config);
        let exec = quill_query::executor::ReadExecutor::new(&graph, &BTreeMap::new());
        let rows = exec.run(&ops).unwrap();
        let got: Vec<(String, i64)> = rows
            .iter()
            .map(|r| {
                let name = r.get("p.name").unwrap().display_string();
                let n = match r.get("n").unwrap() {
                    Value::Int(i) => *i,
                    other => panic!("expected Int, got {other:?}"),
                };
                (name, n)
            })
            .collect();
        assert_eq!(got, vec![("A".to_string(), 2), ("B".to_string(), 1)]);
    }
}

/// S4 — OPTIONAL MATCH preserves the outer row even with no match.
#[test]
fn s4_optional_match_preserves_rows() {
    let mut graph = Graph::new();
    graph.create_node(&["Person".to_string()], props(&[("name", Value::String("X".into()))])).unwrap();

    let query = single(vec![
        Clause::Match { pattern: vec![PatternPart { path_var: None, nodes: vec![node_pattern("p", &["Person"])], relationships: vec![] }], where_: None },
        Clause::OptionalMatch {
            pattern: vec![PatternPart {
                path_var: None,
                nodes: vec![node_pattern("p", &[]), node_pattern("f", &[])],
                relationships: vec![rel_pattern(None, "KNOWS", PatternDirection::Out)],
            }],
            where_: None,
        },
        Clause::Return { items: vec![return_item(prop("p", "name"), "p.name"), return_item(var("f"), "f")], distinct: false },
    ]);

    let engine = QueryEngine::new(graph);
    let prepared = engine.prepare(&query).unwrap();
    let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("p.name").unwrap().display_string(), "X");
    assert_eq!(rows[0].get("f"), Some(&Value::Null));
}

/// S5 — variable-length expansion blocks the back-edge via node-uniqueness.
#[test]
fn s5_variable_length_path_with_cycle() {
    let mut graph = Graph::new();
    let a = graph.create_node(&["Person".to_string()], props(&[("name", Value::String("A".into()))])).unwrap();
    let b = graph.create_node(&["Person".to_string()], props(&[("name", Value::String("B".into()))])).unwrap();
    graph.add_edge("R", a, b, BTreeMap::new()).unwrap();
    graph.add_edge("R", b, a, BTreeMap::new()).unwrap();

    let query = single(vec![
        Clause::Match {
            pattern: vec![PatternPart {
                path_var: None,
                nodes: vec![anon_node("a"), anon_node("b")],
                relationships: vec![RelationshipPattern {
                    var: None,
                    types: vec!["R".to_string()],
                    direction: PatternDirection::Out,
                    min_hops: Some(1),
                    max_hops: Some(3),
                    properties: Vec::new(),
                }],
            }],
            where_: Some(binop(BinaryOperator::Eq, prop("a", "name"), Expression::Literal(Value::String("A".to_string())))),
        },
        Clause::Return { items: vec![return_item(prop("b", "name"), "b.name")], distinct: false },
    ]);

    let engine = QueryEngine::new(graph);
    let prepared = engine.prepare(&query).unwrap();
    let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get("b.name").unwrap().display_string()).collect();
    assert_eq!(names, vec!["B".to_string()]);
}

/// S6 — three-valued logic with a NULL operand.
#[test]
fn s6_three_valued_logic() {
    let query = single(vec![
        Clause::Unwind { expr: Expression::List(vec![Expression::Literal(Value::Null)]), var: "x".to_string() },
        Clause::Return {
            items: vec![
                return_item(binop(BinaryOperator::And, var("x"), Expression::Literal(Value::Bool(true))), "a"),
                return_item(binop(BinaryOperator::Or, var("x"), Expression::Literal(Value::Bool(true))), "b"),
                return_item(binop(BinaryOperator::Or, var("x"), Expression::Literal(Value::Bool(false))), "c"),
            ],
            distinct: false,
        },
    ]);

    let engine = QueryEngine::new(Graph::new());
    let prepared = engine.prepare(&query).unwrap();
    let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("a"), Some(&Value::Null));
    assert_eq!(rows[0].get("b"), Some(&Value::Bool(true)));
    assert_eq!(rows[0].get("c"), Some(&Value::Null));
}

/// Invariant 1 — a read-only query never mutates the graph.
#[test]
fn invariant_read_only_query_leaves_graph_untouched() {
    let mut graph = Graph::new();
    graph.create_node(&["Person".to_string()], BTreeMap::new()).unwrap();
    let before = graph.snapshot();

    let query = single(vec![
        Clause::Match { pattern: vec![PatternPart { path_var: None, nodes: vec![node_pattern("p", &["Person"])], relationships: vec![] }], where_: None },
        Clause::Return { items: vec![return_item(var("p"), "p")], distinct: false },
    ]);
    let engine = QueryEngine::new(graph);
    let prepared = engine.prepare(&query).unwrap();
    engine.execute_read(&prepared, &Params::new()).unwrap();

    assert_eq!(engine.graph().statistics().total_nodes, before.statistics().total_nodes);
    assert_eq!(engine.graph().statistics().total_edges, before.statistics().total_edges);
}

/// Invariant 7 — variable-length expansion never repeats a node id within one path.
#[test]
fn invariant_pattern_cycle_safety() {
    let mut graph = Graph::new();
    let a = graph.create_node(&[], BTreeMap::new()).unwrap();
    let b = graph.create_node(&[], BTreeMap::new()).unwrap();
    let c = graph.create_node(&[], BTreeMap::new()).unwrap();
    graph.add_edge("R", a, b, BTreeMap::new()).unwrap();
    graph.add_edge("R", b, c, BTreeMap::new()).unwrap();
    graph.add_edge("R", c, a, BTreeMap::new()).unwrap();

    let query = single(vec![
        Clause::Match {
            pattern: vec![PatternPart {
                path_var: Some("path".to_string()),
                nodes: vec![anon_node("src"), anon_node("dst")],
                relationships: vec![RelationshipPattern {
                    var: None,
                    types: vec!["R".to_string()],
                    direction: PatternDirection::Out,
                    min_hops: Some(1),
                    max_hops: Some(5),
                    properties: Vec::new(),
                }],
            }],
            where_: None,
        },
        Clause::Return { items: vec![return_item(var("path"), "path")], distinct: false },
    ]);

    let engine = QueryEngine::new(graph);
    let prepared = engine.prepare(&query).unwrap();
    let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
    for row in &rows {
        match row.get("path") {
            Some(Value::Path(p)) => {
                let mut seen = std::collections::HashSet::new();
                for n in &p.nodes {
                    assert!(seen.insert(*n), "node id repeated within a single path: {p:?}");
                }
            }
            other => panic!("expected a Path value, got {other:?}"),
        }
    }
}
