//! Embedder-facing facade over the planner/optimizer/executor stack
//! (spec.md §6 "External interfaces"). This crate has no Cypher text
//! parser, so the entry point here takes an already-built [`ast::Query`]
//! rather than query text; everything downstream of parsing — planning,
//! optimization, execution, EXPLAIN rendering, and a `begin`/`commit`/
//! `rollback` transaction layer over `Graph::snapshot`/`restore` — lives
//! here, mirroring the shape of the teacher's own `query_api` facade.

use crate::ast::Query;
use crate::error::{Error, Result};
use crate::evaluator::Row;
use crate::executor::{Executor, ReadExecutor};
use crate::optimizer::{self, OptimizerConfig};
use crate::planner::{Operator, Planner};
use quill_api::Value;
use quill_storage::Graph;
use std::collections::BTreeMap;

/// Parameter map substituted for `$name` references during evaluation.
///
/// # Example
///
/// ```ignore
/// let mut params = Params::new();
/// params.insert("name", Value::String("Alice".to_string()));
/// engine.execute(&prepared, &params)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Params {
    inner: BTreeMap<String, Value>,
}

impl Params {
    /// Creates a new empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a parameter value, referenced in a query as `$name`.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.inner.insert(name.into(), value);
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.get(name)
    }

    fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.inner
    }
}

/// A planned and optimized operator pipeline, ready to run against a graph.
///
/// Produced by [`QueryEngine::prepare`]. The plan is built and optimized
/// once against the statistics available at prepare time and can be
/// executed any number of times afterwards.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    ops: Vec<Operator>,
    explain: String,
    planned_total_nodes: u64,
    planned_total_edges: u64,
}

impl PreparedQuery {
    /// Whether this pipeline contains a write operator
    /// (Create/Merge/Set/Remove/Delete).
    pub fn is_write(&self) -> bool {
        self.ops.iter().any(is_write_op)
    }

    /// A rendered, human-readable operator list — one line per operator,
    /// nested branches indented (spec.md §3's EXPLAIN-style introspection).
    pub fn explain(&self) -> &str {
        &self.explain
    }
}

fn is_write_op(op: &Operator) -> bool {
    matches!(
        op,
        Operator::Create { .. } | Operator::Merge { .. } | Operator::Set { .. } | Operator::Remove { .. } | Operator::Delete { .. }
    )
}

fn render_ops(ops: &[Operator]) -> String {
    let mut out = String::new();
    for (i, op) in ops.iter().enumerate() {
        render_op(&mut out, op, 0);
        if i + 1 < ops.len() {
            out.push('\n');
        }
    }
    out
}

fn render_op(out: &mut String, op: &Operator, depth: usize) {
    use std::fmt::Write as _;
    let pad = "  ".repeat(depth);
    match op {
        Operator::Union { branches, all } => {
            let _ = writeln!(out, "{pad}Union(all={all})");
            for (i, branch) in branches.iter().enumerate() {
                let _ = writeln!(out, "{pad}  Branch {i}:");
                for sub in branch {
                    render_op(out, sub, depth + 2);
                }
            }
        }
        Operator::Subquery { pipeline, expression_type } => {
            let _ = writeln!(out, "{pad}Subquery(kind={expression_type:?})");
            for sub in pipeline {
                render_op(out, sub, depth + 1);
            }
        }
        other => {
            let _ = writeln!(out, "{pad}{other:?}");
        }
    }
}

/// Owns a live graph plus the transaction state layered over its
/// `snapshot`/`restore` pair (spec.md §6.2: `begin`/`commit`/`rollback`,
/// nesting disallowed).
pub struct QueryEngine {
    graph: Graph,
    txn_snapshot: Option<Graph>,
    optimizer_config: OptimizerConfig,
}

impl QueryEngine {
    pub fn new(graph: Graph) -> Self {
        QueryEngine { graph, txn_snapshot: None, optimizer_config: OptimizerConfig::default() }
    }

    pub fn with_optimizer_config(mut self, config: OptimizerConfig) -> Self {
        self.optimizer_config = config;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Plans `query` and optimizes it against the graph's current
    /// statistics snapshot (spec.md §9 "planner/optimizer separation").
    pub fn prepare(&self, query: &Query) -> Result<PreparedQuery> {
        let ops = Planner::new().plan(query)?;
        let op_count_before = ops.len();
        let ops = optimizer::optimize(ops, &self.graph, &self.optimizer_config);
        tracing::debug!(ops_before = op_count_before, ops_after = ops.len(), "query prepared");
        let explain = render_ops(&ops);
        let stats = self.graph.statistics();
        Ok(PreparedQuery {
            ops,
            explain,
            planned_total_nodes: stats.total_nodes,
            planned_total_edges: stats.total_edges,
        })
    }

    fn warn_if_stale(&self, prepared: &PreparedQuery) {
        let stats = self.graph.statistics();
        if stats.total_nodes != prepared.planned_total_nodes || stats.total_edges != prepared.planned_total_edges {
            tracing::warn!(
                planned_nodes = prepared.planned_total_nodes,
                planned_edges = prepared.planned_total_edges,
                current_nodes = stats.total_nodes,
                current_edges = stats.total_edges,
                "executing a prepared query against statistics that changed since it was planned"
            );
        }
    }

    /// Runs a prepared query known to be read-only; errors if it contains
    /// a write operator rather than silently mutating the graph.
    pub fn execute_read(&self, prepared: &PreparedQuery, params: &Params) -> Result<Vec<Row>> {
        if prepared.is_write() {
            return Err(Error::MalformedAst("execute_read given a pipeline containing a write operator".to_string()));
        }
        self.warn_if_stale(prepared);
        let exec = ReadExecutor::new(&self.graph, params.as_map());
        exec.run(&prepared.ops)
    }

    /// Runs a prepared query, dispatching to the write-capable executor
    /// when the pipeline contains a write operator.
    pub fn execute(&mut self, prepared: &PreparedQuery, params: &Params) -> Result<Vec<Row>> {
        self.warn_if_stale(prepared);
        if prepared.is_write() {
            let mut exec = Executor::new(&mut self.graph, params.as_map().clone());
            exec.run(&prepared.ops)
        } else {
            let exec = ReadExecutor::new(&self.graph, params.as_map());
            exec.run(&prepared.ops)
        }
    }

    /// Begins a transaction by snapshotting the graph. Nesting is
    /// disallowed (spec.md §6.2).
    pub fn begin(&mut self) -> Result<()> {
        if self.txn_snapshot.is_some() {
            return Err(Error::AlreadyInTransaction);
        }
        self.txn_snapshot = Some(self.graph.snapshot());
        Ok(())
    }

    /// Commits the active transaction, discarding its rollback snapshot.
    pub fn commit(&mut self) -> Result<()> {
        if self.txn_snapshot.take().is_none() {
            return Err(Error::NoActiveTransaction);
        }
        Ok(())
    }

    /// Restores the graph (and its statistics) to the state captured by
    /// `begin`. Restored statistics are authoritative, not recomputed.
    pub fn rollback(&mut self) -> Result<()> {
        let snapshot = self.txn_snapshot.take().ok_or(Error::NoActiveTransaction)?;
        self.graph.restore(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Clause, Expression, Query, ReturnItem};

    fn return_literal(n: i64) -> Query {
        Query::Single(vec![Clause::Return {
            items: vec![ReturnItem::Item { expr: Expression::Literal(Value::Int(n)), alias: Some("n".to_string()) }],
            distinct: false,
        }])
    }

    #[test]
    fn prepare_and_execute_read_only_literal() {
        let engine = QueryEngine::new(Graph::new());
        let prepared = engine.prepare(&return_literal(42)).unwrap();
        assert!(!prepared.is_write());
        let rows = engine.execute_read(&prepared, &Params::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("n"), Some(&Value::Int(42)));
    }

    #[test]
    fn explain_renders_one_line_per_operator() {
        let engine = QueryEngine::new(Graph::new());
        let prepared = engine.prepare(&return_literal(1)).unwrap();
        assert!(prepared.explain().starts_with("Project"));
    }

    #[test]
    fn transactions_reject_nesting_and_stray_commit() {
        let mut engine = QueryEngine::new(Graph::new());
        engine.begin().unwrap();
        assert!(matches!(engine.begin(), Err(Error::AlreadyInTransaction)));
        engine.commit().unwrap();
        assert!(matches!(engine.commit(), Err(Error::NoActiveTransaction)));
    }

    #[test]
    fn rollback_restores_graph_state() {
        let mut engine = QueryEngine::new(Graph::new());
        engine.begin().unwrap();
        engine.graph.create_node(&["Person".to_string()], BTreeMap::new()).unwrap();
        assert_eq!(engine.graph.statistics().total_nodes, 1);
        engine.rollback().unwrap();
        assert_eq!(engine.graph.statistics().total_nodes, 0);
    }
}
