//! Batch-streaming operator execution (spec.md §4.7). Each operator
//! consumes the full row list its predecessor produced and returns a new,
//! fully materialized row list — there is no lazy iterator chain.
//!
//! Read-only operators (`ScanNodes`, `Filter`, `Project`, ...) are generic
//! over [`GraphSnapshot`] and live on [`ReadExecutor`]; the five write
//! operators (`Create`, `Merge`, `Set`, `Remove`, `Delete`) need the
//! concrete [`quill_storage::Graph`] since `GraphSnapshot` exposes no
//! mutation, so they live on [`Executor`], which holds `&mut Graph` and
//! delegates every other operator to a freshly borrowed `ReadExecutor`.

use crate::ast::{
    Clause, PatternDirection, PatternPart, RemoveItem, ReturnItem, SetItem, SetTarget, SortDirection, SubqueryKind,
};
use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, Row, SubqueryRunner};
use crate::planner::{
    expression_contains_aggregate, AggregateExpr, AggregateFunc, AggregationHint, HopSpec, Operator, Planner,
};
use quill_api::value::PathValue;
use quill_api::{EdgeKey, GraphSnapshot, InternalNodeId, RelTypeId, Value};
use quill_storage::Graph;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ast::Expression;

/// Wires `Evaluator::subqueries` back to a read-only re-execution of the
/// nested pipeline, without giving the evaluator its own copy of the
/// operator-execution loop (spec.md §4.6 "Subquery evaluation").
struct SubqueryExec<'a, S: GraphSnapshot> {
    graph: &'a S,
    params: &'a BTreeMap<String, Value>,
}

impl<'a, S: GraphSnapshot> SubqueryRunner for SubqueryExec<'a, S> {
    fn run(&self, pipeline: &[Clause], row: &Row) -> Result<Vec<Row>> {
        let mut planner = Planner::new();
        let ops = planner.plan(&crate::ast::Query::Single(pipeline.to_vec()))?;
        let reader = ReadExecutor::new(self.graph, self.params);
        reader.run_with_input(&ops, vec![row.clone()])
    }
}

fn eval<S: GraphSnapshot>(graph: &S, params: &BTreeMap<String, Value>, expr: &Expression, row: &Row) -> Result<Value> {
    let subq = SubqueryExec { graph, params };
    Evaluator::new(graph, params).with_subqueries(&subq).eval(expr, row)
}

fn predicate_holds<S: GraphSnapshot>(
    graph: &S,
    params: &BTreeMap<String, Value>,
    predicate: Option<&Expression>,
    row: &Row,
) -> Result<bool> {
    match predicate {
        None => Ok(true),
        Some(e) => Ok(eval(graph, params, e, row)?.is_truthy()),
    }
}

fn other_endpoint(edge: &EdgeKey, from: InternalNodeId) -> InternalNodeId {
    if edge.src == from {
        edge.dst
    } else {
        edge.src
    }
}

/// Dedup/group key for `Value`s that aren't `Hash` (floats, graph
/// identities); `Debug` output is a cheap, deterministic stand-in.
/// Binding names are sorted first since `Row::bindings` is a `HashMap`
/// with no fixed iteration order.
fn row_key(row: &Row) -> String {
    let mut sorted: Vec<(&String, &Value)> = row.bindings.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    format!("{sorted:?}")
}

fn values_key(values: &[Value]) -> String {
    format!("{values:?}")
}

/// Cheap `&'static str` tag for an operator, used in `tracing::trace!` spans
/// without formatting the (potentially large) operator payload.
fn op_name(op: &Operator) -> &'static str {
    match op {
        Operator::ScanNodes { .. } => "ScanNodes",
        Operator::OptionalScanNodes { .. } => "OptionalScanNodes",
        Operator::ExpandEdges { .. } => "ExpandEdges",
        Operator::OptionalExpandEdges { .. } => "OptionalExpandEdges",
        Operator::ExpandVariableLength { .. } => "ExpandVariableLength",
        Operator::ExpandMultiHop { .. } => "ExpandMultiHop",
        Operator::Filter(_) => "Filter",
        Operator::Project(_) => "Project",
        Operator::With { .. } => "With",
        Operator::Sort { .. } => "Sort",
        Operator::Skip(_) => "Skip",
        Operator::Limit(_) => "Limit",
        Operator::Distinct => "Distinct",
        Operator::Aggregate { .. } => "Aggregate",
        Operator::Unwind { .. } => "Unwind",
        Operator::Create { .. } => "Create",
        Operator::Merge { .. } => "Merge",
        Operator::Set { .. } => "Set",
        Operator::Remove { .. } => "Remove",
        Operator::Delete { .. } => "Delete",
        Operator::Union { .. } => "Union",
        Operator::Subquery { .. } => "Subquery",
    }
}

/// Executes every read-only operator kind against a point-in-time
/// [`GraphSnapshot`]. Used both for the bulk of a top-level pipeline (via
/// [`Executor`]'s delegation) and for nested `EXISTS`/`COUNT` subqueries
/// and `MERGE`'s existence check.
pub struct ReadExecutor<'a, S: GraphSnapshot> {
    graph: &'a S,
    params: &'a BTreeMap<String, Value>,
}

impl<'a, S: GraphSnapshot> ReadExecutor<'a, S> {
    pub fn new(graph: &'a S, params: &'a BTreeMap<String, Value>) -> Self {
        ReadExecutor { graph, params }
    }

    pub fn run(&self, ops: &[Operator]) -> Result<Vec<Row>> {
        self.run_with_input(ops, vec![Row::new()])
    }

    pub fn run_with_input(&self, ops: &[Operator], input: Vec<Row>) -> Result<Vec<Row>> {
        let mut rows = input;
        for op in ops {
            let before = rows.len();
            rows = self.exec_op(op, rows)?;
            tracing::trace!(op = op_name(op), rows_in = before, rows_out = rows.len(), "operator executed");
        }
        Ok(rows)
    }

    fn eval(&self, expr: &Expression, row: &Row) -> Result<Value> {
        eval(self.graph, self.params, expr, row)
    }

    fn predicate_holds(&self, predicate: Option<&Expression>, row: &Row) -> Result<bool> {
        predicate_holds(self.graph, self.params, predicate, row)
    }

    pub(crate) fn exec_op(&self, op: &Operator, input: Vec<Row>) -> Result<Vec<Row>> {
        match op {
            Operator::ScanNodes { var, labels, predicate, path_var } => {
                let mut out = Vec::new();
                for row in &input {
                    out.extend(self.scan_nodes(labels, predicate.as_ref(), var, path_var.as_deref(), row)?);
                }
                Ok(out)
            }
            Operator::OptionalScanNodes { var, labels, predicate, path_var } => {
                let mut out = Vec::new();
                for row in &input {
                    let scanned = self.scan_nodes(labels, predicate.as_ref(), var, path_var.as_deref(), row)?;
                    if scanned.is_empty() {
                        let mut r = row.clone();
                        r.bind(var.clone(), Value::Null);
                        if let Some(pv) = path_var {
                            r.bind(pv.clone(), Value::Null);
                        }
                        out.push(r);
                    } else {
                        out.extend(scanned);
                    }
                }
                Ok(out)
            }
            Operator::ExpandEdges { src_var, edge_var, dst_var, types, direction, predicate, path_var, agg_hint } => {
                if let Some(hint) = agg_hint {
                    self.exec_expand_with_aggregate(
                        src_var,
                        edge_var.as_deref(),
                        dst_var,
                        types,
                        *direction,
                        predicate.as_ref(),
                        path_var.as_deref(),
                        hint,
                        input,
                    )
                } else {
                    let mut out = Vec::new();
                    for row in &input {
                        out.extend(self.expand_edges(
                            src_var,
                            edge_var.as_deref(),
                            dst_var,
                            types,
                            *direction,
                            predicate.as_ref(),
                            path_var.as_deref(),
                            row,
                        )?);
                    }
                    Ok(out)
                }
            }
            Operator::OptionalExpandEdges { src_var, edge_var, dst_var, types, direction, predicate, path_var } => {
                let mut out = Vec::new();
                for row in &input {
                    let expanded = self.expand_edges(
                        src_var,
                        edge_var.as_deref(),
                        dst_var,
                        types,
                        *direction,
                        predicate.as_ref(),
                        path_var.as_deref(),
                        row,
                    )?;
                    if expanded.is_empty() {
                        let mut r = row.clone();
                        r.bind(dst_var.clone(), Value::Null);
                        if let Some(ev) = edge_var {
                            r.bind(ev.clone(), Value::Null);
                        }
                        if let Some(pv) = path_var {
                            r.bind(pv.clone(), Value::Null);
                        }
                        out.push(r);
                    } else {
                        out.extend(expanded);
                    }
                }
                Ok(out)
            }
            Operator::ExpandVariableLength { src, edge_var, dst, types, direction, min, max, predicate, path_var } => {
                let mut out = Vec::new();
                for row in &input {
                    out.extend(self.expand_variable_length(
                        src,
                        edge_var.as_deref(),
                        dst,
                        types,
                        *direction,
                        *min,
                        *max,
                        predicate.as_ref(),
                        path_var.as_deref(),
                        row,
                    )?);
                }
                Ok(out)
            }
            Operator::ExpandMultiHop { src, hops, path_var } => {
                let mut out = Vec::new();
                for row in &input {
                    out.extend(self.expand_multi_hop(src, hops, path_var.as_deref(), row)?);
                }
                Ok(out)
            }
            Operator::Filter(expr) => {
                let mut out = Vec::with_capacity(input.len());
                for row in input {
                    if self.eval(expr, &row)?.is_truthy() {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            Operator::Project(items) => input.iter().map(|r| self.project_row(items, r)).collect(),
            Operator::With { items, distinct, where_, sort, skip, limit } => {
                let mut rows: Vec<Row> = input.iter().map(|r| self.project_row(items, r)).collect::<Result<_>>()?;
                if let Some(w) = where_ {
                    let mut kept = Vec::with_capacity(rows.len());
                    for row in rows {
                        if self.eval(w, &row)?.is_truthy() {
                            kept.push(row);
                        }
                    }
                    rows = kept;
                }
                if !sort.is_empty() {
                    rows = self.sort_rows(sort, None, rows)?;
                }
                if *distinct {
                    rows = distinct_rows(rows);
                }
                if let Some(e) = skip {
                    rows = self.apply_skip(e, rows)?;
                }
                if let Some(e) = limit {
                    rows = self.apply_limit(e, rows)?;
                }
                Ok(rows)
            }
            Operator::Sort { items, return_items } => self.sort_rows(items, return_items.as_ref(), input),
            Operator::Skip(expr) => self.apply_skip(expr, input),
            Operator::Limit(expr) => self.apply_limit(expr, input),
            Operator::Distinct => Ok(distinct_rows(input)),
            Operator::Aggregate { grouping, aggregates, return_items } => {
                self.exec_aggregate(grouping, aggregates, return_items, input)
            }
            Operator::Unwind { expr, var } => {
                let mut out = Vec::new();
                for row in &input {
                    let val = self.eval(expr, row)?;
                    let items = match val {
                        Value::Null => Vec::new(),
                        Value::List(items) => items,
                        other => vec![other],
                    };
                    for item in items {
                        let mut r = row.clone();
                        r.bind(var.clone(), item);
                        out.push(r);
                    }
                }
                Ok(out)
            }
            Operator::Union { branches, all } => {
                let mut out = Vec::new();
                for branch in branches {
                    out.extend(self.run(branch)?);
                }
                if !*all {
                    out = distinct_rows(out);
                }
                Ok(out)
            }
            Operator::Subquery { pipeline, expression_type } => {
                let mut out = Vec::with_capacity(input.len());
                for row in input {
                    let sub_rows = self.run_with_input(pipeline, vec![row.clone()])?;
                    let mut r = row;
                    match expression_type {
                        SubqueryKind::Exists => r.bind("__exists__", Value::Bool(!sub_rows.is_empty())),
                        SubqueryKind::Count => r.bind("__count__", Value::Int(sub_rows.len() as i64)),
                    }
                    out.push(r);
                }
                Ok(out)
            }
            Operator::Create { .. }
            | Operator::Merge { .. }
            | Operator::Set { .. }
            | Operator::Remove { .. }
            | Operator::Delete { .. } => Err(Error::MalformedAst(
                "write operator reached a read-only execution context".to_string(),
            )),
        }
    }

    fn resolve_types(&self, types: &[String]) -> Result<Option<Vec<RelTypeId>>> {
        if types.is_empty() {
            return Ok(None);
        }
        let mut ids = Vec::with_capacity(types.len());
        for t in types {
            match self.graph.resolve_rel_type_id(t) {
                Some(id) => ids.push(id),
                // An unresolved type means this pattern can never match
                // anything; an always-false membership filter gets the
                // same zero-rows result without a separate early return.
                None => return Ok(Some(Vec::new())),
            }
        }
        Ok(Some(ids))
    }

    fn gather_edges(
        &self,
        node: InternalNodeId,
        direction: PatternDirection,
        type_ids: &Option<Vec<RelTypeId>>,
    ) -> Vec<EdgeKey> {
        let keep = |e: &EdgeKey| type_ids.as_ref().map(|ids| ids.contains(&e.rel_type)).unwrap_or(true);
        match direction {
            PatternDirection::Out => self.graph.outgoing(node, None).into_iter().filter(keep).collect(),
            PatternDirection::In => self.graph.incoming(node, None).into_iter().filter(keep).collect(),
            PatternDirection::Undirected => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for e in self.graph.outgoing(node, None).into_iter().chain(self.graph.incoming(node, None)) {
                    if keep(&e) && seen.insert(e.id) {
                        out.push(e);
                    }
                }
                out
            }
        }
    }

    fn scan_nodes(
        &self,
        labels: &[String],
        predicate: Option<&Expression>,
        var: &str,
        path_var: Option<&str>,
        row: &Row,
    ) -> Result<Vec<Row>> {
        if let Some(bound) = row.get(var) {
            // Correlated re-entry: a later pattern part reuses a variable an
            // earlier part already scanned. Validate label compatibility
            // against the existing binding instead of enumerating fresh
            // candidates and clobbering it.
            let id = match bound {
                Value::Node(id) => *id,
                _ => return Ok(Vec::new()),
            };
            for label in labels {
                match self.graph.resolve_label_id(label) {
                    Some(label_id) if self.graph.has_label(id, label_id) => {}
                    _ => return Ok(Vec::new()),
                }
            }
            let mut candidate = row.clone();
            if let Some(pv) = path_var {
                candidate.bind(pv, Value::Path(PathValue::single_node(id)));
            }
            return if self.predicate_holds(predicate, &candidate)? { Ok(vec![candidate]) } else { Ok(Vec::new()) };
        }

        let candidates: Vec<InternalNodeId> = match labels.split_first() {
            None => self.graph.all_nodes(),
            Some((first, rest)) => {
                let Some(first_id) = self.graph.resolve_label_id(first) else { return Ok(Vec::new()) };
                let mut ids = self.graph.nodes_by_label(first_id);
                for extra in rest {
                    let Some(extra_id) = self.graph.resolve_label_id(extra) else { return Ok(Vec::new()) };
                    ids.retain(|&id| self.graph.has_label(id, extra_id));
                }
                ids
            }
        };
        let mut out = Vec::new();
        for id in candidates {
            let mut candidate = row.clone();
            candidate.bind(var, Value::Node(id));
            if let Some(pv) = path_var {
                candidate.bind(pv, Value::Path(PathValue::single_node(id)));
            }
            if self.predicate_holds(predicate, &candidate)? {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    fn expand_edges(
        &self,
        src_var: &str,
        edge_var: Option<&str>,
        dst_var: &str,
        types: &[String],
        direction: PatternDirection,
        predicate: Option<&Expression>,
        path_var: Option<&str>,
        row: &Row,
    ) -> Result<Vec<Row>> {
        let Some(Value::Node(src)) = row.get(src_var) else { return Ok(Vec::new()) };
        let src = *src;
        let type_ids = self.resolve_types(types)?;
        let mut out = Vec::new();
        for edge in self.gather_edges(src, direction, &type_ids) {
            let dst_id = other_endpoint(&edge, src);
            let mut candidate = row.clone();
            candidate.bind(dst_var, Value::Node(dst_id));
            if let Some(ev) = edge_var {
                candidate.bind(ev, Value::Edge(edge));
            }
            if let Some(pv) = path_var {
                candidate.bind(pv, Value::Path(PathValue { nodes: vec![src, dst_id], edges: vec![edge] }));
            }
            if self.predicate_holds(predicate, &candidate)? {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_variable_length(
        &self,
        src_var: &str,
        edge_var: Option<&str>,
        dst_var: &str,
        types: &[String],
        direction: PatternDirection,
        min: u32,
        max: u32,
        predicate: Option<&Expression>,
        path_var: Option<&str>,
        row: &Row,
    ) -> Result<Vec<Row>> {
        let Some(Value::Node(src)) = row.get(src_var) else { return Ok(Vec::new()) };
        let src = *src;
        let type_ids = self.resolve_types(types)?;
        let mut results = Vec::new();
        // Node-uniqueness (no node id repeats within one path), not
        // relationship-uniqueness: a documented deviation from full
        // openCypher match semantics (see DESIGN.md's edge-uniqueness
        // Open Question).
        let mut stack: Vec<(InternalNodeId, Vec<InternalNodeId>, Vec<EdgeKey>)> = vec![(src, vec![src], Vec::new())];
        while let Some((current, path_nodes, path_edges)) = stack.pop() {
            let depth = path_edges.len() as u32;
            if depth >= min && depth <= max {
                let mut candidate = row.clone();
                candidate.bind(dst_var, Value::Node(current));
                if let Some(ev) = edge_var {
                    candidate.bind(ev, Value::List(path_edges.iter().map(|e| Value::Edge(*e)).collect()));
                }
                if let Some(pv) = path_var {
                    candidate.bind(
                        pv,
                        Value::Path(PathValue { nodes: path_nodes.clone(), edges: path_edges.clone() }),
                    );
                }
                if self.predicate_holds(predicate, &candidate)? {
                    results.push(candidate);
                }
            }
            if depth < max {
                for edge in self.gather_edges(current, direction, &type_ids) {
                    let next = other_endpoint(&edge, current);
                    if path_nodes.contains(&next) {
                        continue;
                    }
                    let mut next_nodes = path_nodes.clone();
                    next_nodes.push(next);
                    let mut next_edges = path_edges.clone();
                    next_edges.push(edge);
                    stack.push((next, next_nodes, next_edges));
                }
            }
        }
        Ok(results)
    }

    fn expand_multi_hop(&self, src_var: &str, hops: &[HopSpec], path_var: Option<&str>, row: &Row) -> Result<Vec<Row>> {
        let Some(Value::Node(s)) = row.get(src_var) else { return Ok(Vec::new()) };
        let mut frontier: Vec<(Row, Vec<InternalNodeId>, Vec<EdgeKey>)> = vec![(row.clone(), vec![*s], Vec::new())];
        for hop in hops {
            let type_ids = self.resolve_types(&hop.types)?;
            let mut next_frontier = Vec::new();
            for (cur_row, nodes, edges) in frontier {
                let current = *nodes.last().expect("at least the source node");
                for edge in self.gather_edges(current, hop.direction, &type_ids) {
                    let next = other_endpoint(&edge, current);
                    let mut candidate = cur_row.clone();
                    candidate.bind(hop.dst_var.clone(), Value::Node(next));
                    if let Some(ev) = &hop.edge_var {
                        candidate.bind(ev.clone(), Value::Edge(edge));
                    }
                    if self.predicate_holds(hop.predicate.as_ref(), &candidate)? {
                        let mut next_nodes = nodes.clone();
                        next_nodes.push(next);
                        let mut next_edges = edges.clone();
                        next_edges.push(edge);
                        next_frontier.push((candidate, next_nodes, next_edges));
                    }
                }
            }
            frontier = next_frontier;
        }
        let mut out = Vec::with_capacity(frontier.len());
        for (mut r, nodes, edges) in frontier {
            if let Some(pv) = path_var {
                r.bind(pv, Value::Path(PathValue { nodes, edges }));
            }
            out.push(r);
        }
        Ok(out)
    }

    /// Mirrors `exec_aggregate`'s HashMap-keyed grouping: every input row
    /// contributes its expanded edges to the group keyed by its
    /// `group_by_var` binding, and exactly one output row is emitted per
    /// group, not per input row — so duplicate `src_var` rows reaching this
    /// pushed-down `ExpandEdges` (e.g. from an upstream join) still collapse
    /// into a single group, matching the non-pushdown path.
    #[allow(clippy::too_many_arguments)]
    fn exec_expand_with_aggregate(
        &self,
        src_var: &str,
        edge_var: Option<&str>,
        dst_var: &str,
        types: &[String],
        direction: PatternDirection,
        predicate: Option<&Expression>,
        path_var: Option<&str>,
        hint: &AggregationHint,
        input: Vec<Row>,
    ) -> Result<Vec<Row>> {
        let mut groups: Vec<(Value, Vec<Row>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in &input {
            let key_val = row.get(hint.group_by_var.as_str()).cloned().unwrap_or(Value::Null);
            let expanded = self.expand_edges(src_var, edge_var, dst_var, types, direction, predicate, path_var, row)?;
            let key_str = values_key(std::slice::from_ref(&key_val));
            match index.get(&key_str) {
                Some(&i) => groups[i].1.extend(expanded),
                None => {
                    index.insert(key_str, groups.len());
                    groups.push((key_val, expanded));
                }
            }
        }
        let agg_expr =
            AggregateExpr { func: hint.func, arg: hint.expr.clone(), distinct: false, alias: hint.result_alias.clone() };
        let mut out = Vec::with_capacity(groups.len());
        for (key_val, expanded) in groups {
            let value = self.compute_one_aggregate(&agg_expr, &expanded)?;
            let mut r = Row::new();
            r.bind(hint.group_by_alias.clone(), key_val);
            r.bind(hint.result_alias.clone(), value);
            out.push(r);
        }
        Ok(out)
    }

    fn project_row(&self, items: &[ReturnItem], row: &Row) -> Result<Row> {
        let mut out = Row::new();
        for (i, item) in items.iter().enumerate() {
            match item {
                ReturnItem::Star => {
                    for (k, v) in &row.bindings {
                        out.bind(k.clone(), v.clone());
                    }
                }
                ReturnItem::Item { expr, alias } => {
                    let name = alias.clone().or_else(|| expr.default_column_name()).unwrap_or_else(|| format!("col_{i}"));
                    out.bind(name, self.eval(expr, row)?);
                }
            }
        }
        Ok(out)
    }

    /// When `return_items` is `Some`, ORDER BY keys may reference either a
    /// raw MATCH-bound variable or a RETURN/WITH output alias — so sort
    /// keys are evaluated against the row extended with the projection,
    /// not against the projected row alone (spec.md §4.7 Sort).
    fn sort_rows(
        &self,
        items: &[(Expression, SortDirection)],
        return_items: Option<&Vec<ReturnItem>>,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let ctx = match return_items {
                Some(ritems) => {
                    let mut extended = row.clone();
                    let projected = self.project_row(ritems, &row)?;
                    for (k, v) in projected.bindings {
                        extended.bindings.insert(k, v);
                    }
                    extended
                }
                None => row.clone(),
            };
            let mut key = Vec::with_capacity(items.len());
            for (expr, _) in items {
                key.push(self.eval(expr, &ctx)?);
            }
            keyed.push((key, row));
        }
        keyed.sort_by(|a, b| {
            for (i, (ka, kb)) in a.0.iter().zip(b.0.iter()).enumerate() {
                let ord = ka.order_cmp(kb, true);
                let ord = if items[i].1 == SortDirection::Descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, r)| r).collect())
    }

    fn eval_count(&self, expr: &Expression) -> Result<usize> {
        match self.eval(expr, &Row::new())? {
            Value::Int(i) => Ok(i.max(0) as usize),
            other => Err(Error::FunctionArgumentType {
                function: "skip/limit".to_string(),
                detail: format!("expected a non-negative integer, got {}", other.type_name()),
            }),
        }
    }

    fn apply_skip(&self, expr: &Expression, rows: Vec<Row>) -> Result<Vec<Row>> {
        Ok(rows.into_iter().skip(self.eval_count(expr)?).collect())
    }

    fn apply_limit(&self, expr: &Expression, rows: Vec<Row>) -> Result<Vec<Row>> {
        Ok(rows.into_iter().take(self.eval_count(expr)?).collect())
    }

    fn exec_aggregate(
        &self,
        grouping: &[Expression],
        aggregates: &[AggregateExpr],
        return_items: &[ReturnItem],
        rows: Vec<Row>,
    ) -> Result<Vec<Row>> {
        if rows.is_empty() {
            if !grouping.is_empty() {
                return Ok(Vec::new());
            }
            // Ungrouped aggregate over zero input rows still produces one
            // row (spec.md §4.7 Aggregate "empty-input" edge case).
            let agg_vals = self.compute_aggregates(aggregates, &[])?;
            let mut out = Row::new();
            fill_aggregate_output(&mut out, return_items, &[], &agg_vals)?;
            return Ok(vec![out]);
        }
        let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in rows {
            let key_vals: Vec<Value> = grouping.iter().map(|e| self.eval(e, &row)).collect::<Result<_>>()?;
            let key_str = values_key(&key_vals);
            match index.get(&key_str) {
                Some(&i) => groups[i].1.push(row),
                None => {
                    index.insert(key_str, groups.len());
                    groups.push((key_vals, vec![row]));
                }
            }
        }
        let mut out = Vec::with_capacity(groups.len());
        for (key_vals, group_rows) in groups {
            let agg_vals = self.compute_aggregates(aggregates, &group_rows)?;
            let mut row = Row::new();
            fill_aggregate_output(&mut row, return_items, &key_vals, &agg_vals)?;
            out.push(row);
        }
        Ok(out)
    }

    fn compute_aggregates(&self, aggregates: &[AggregateExpr], rows: &[Row]) -> Result<Vec<Value>> {
        aggregates.iter().map(|a| self.compute_one_aggregate(a, rows)).collect()
    }

    fn compute_one_aggregate(&self, agg: &AggregateExpr, rows: &[Row]) -> Result<Value> {
        let mut seen_distinct = HashSet::new();
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let v = match &agg.arg {
                Some(e) => self.eval(e, row)?,
                None => Value::Bool(true), // COUNT(*) marker
            };
            if agg.distinct {
                let key = values_key(std::slice::from_ref(&v));
                if !seen_distinct.insert(key) {
                    continue;
                }
            }
            values.push(v);
        }
        Ok(match agg.func {
            AggregateFunc::Count => {
                let n = if agg.arg.is_none() { values.len() } else { values.iter().filter(|v| !v.is_null()).count() };
                Value::Int(n as i64)
            }
            AggregateFunc::Sum => {
                let mut acc = Value::Int(0);
                for v in values.iter().filter(|v| !v.is_null()) {
                    acc = acc.plus(v)?;
                }
                acc
            }
            AggregateFunc::Avg => {
                let nums: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
                if nums.is_empty() {
                    Value::Null
                } else {
                    let mut sum = Value::Int(0);
                    for v in &nums {
                        sum = sum.plus(v)?;
                    }
                    sum.div(&Value::Int(nums.len() as i64))?
                }
            }
            AggregateFunc::Min => values
                .iter()
                .filter(|v| !v.is_null())
                .cloned()
                .min_by(|a, b| a.order_cmp(b, true))
                .unwrap_or(Value::Null),
            AggregateFunc::Max => values
                .iter()
                .filter(|v| !v.is_null())
                .cloned()
                .max_by(|a, b| a.order_cmp(b, true))
                .unwrap_or(Value::Null),
            AggregateFunc::Collect => Value::List(values.into_iter().filter(|v| !v.is_null()).collect()),
        })
    }
}

fn distinct_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if seen.insert(row_key(&row)) {
            out.push(row);
        }
    }
    out
}

/// Replays `build_aggregate`'s split of `return_items` into grouping vs.
/// aggregate columns, to put each computed value back under its alias.
fn fill_aggregate_output(out: &mut Row, return_items: &[ReturnItem], key_vals: &[Value], agg_vals: &[Value]) -> Result<()> {
    let mut gi = 0;
    let mut ai = 0;
    for (i, item) in return_items.iter().enumerate() {
        let ReturnItem::Item { expr, alias } = item else { continue };
        let name = alias.clone().or_else(|| expr.default_column_name()).unwrap_or_else(|| format!("col_{i}"));
        if expression_contains_aggregate(expr) {
            out.bind(name, agg_vals.get(ai).cloned().unwrap_or(Value::Null));
            ai += 1;
        } else {
            out.bind(name, key_vals.get(gi).cloned().unwrap_or(Value::Null));
            gi += 1;
        }
    }
    Ok(())
}

/// Executes a full operator pipeline against a live, mutable graph. Read
/// operators are delegated to a [`ReadExecutor`] borrowing `graph`
/// immutably for the duration of that one operator; the five write
/// operators call `quill_storage::Graph`'s mutation methods directly.
pub struct Executor<'a> {
    graph: &'a mut Graph,
    params: BTreeMap<String, Value>,
}

impl<'a> Executor<'a> {
    pub fn new(graph: &'a mut Graph, params: BTreeMap<String, Value>) -> Self {
        Executor { graph, params }
    }

    pub fn run(&mut self, ops: &[Operator]) -> Result<Vec<Row>> {
        let mut rows = vec![Row::new()];
        for op in ops {
            let before = rows.len();
            rows = self.exec_op(op, rows)?;
            tracing::trace!(op = op_name(op), rows_in = before, rows_out = rows.len(), "operator executed");
        }
        Ok(rows)
    }

    fn eval(&self, expr: &Expression, row: &Row) -> Result<Value> {
        eval(self.graph, &self.params, expr, row)
    }

    fn exec_op(&mut self, op: &Operator, input: Vec<Row>) -> Result<Vec<Row>> {
        match op {
            Operator::Create { patterns } => self.exec_create(patterns, input),
            Operator::Merge { patterns, on_create, on_match } => self.exec_merge(patterns, on_create, on_match, input),
            Operator::Set { items } => self.exec_set(items, input),
            Operator::Remove { items } => self.exec_remove(items, input),
            Operator::Delete { vars, detach } => self.exec_delete(vars, *detach, input),
            other => {
                let reader = ReadExecutor::new(&*self.graph, &self.params);
                reader.exec_op(other, input)
            }
        }
    }

    fn eval_properties(&self, props: &[(String, Expression)], row: &Row) -> Result<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        for (k, expr) in props {
            out.insert(k.clone(), self.eval(expr, row)?);
        }
        Ok(out)
    }

    fn exec_create(&mut self, patterns: &[PatternPart], input: Vec<Row>) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(input.len());
        for row in input {
            let mut row = row;
            for part in patterns {
                self.create_pattern_part(part, &mut row)?;
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Reuses an already-bound node variable verbatim (so `CREATE (a)-[:R]->(b)`
    /// after a prior `MATCH (a)` connects to the matched `a`); creates a
    /// fresh node for every other node pattern in the part.
    fn create_pattern_part(&mut self, part: &PatternPart, row: &mut Row) -> Result<()> {
        let mut node_ids = Vec::with_capacity(part.nodes.len());
        for node in &part.nodes {
            let already_bound = node.var.as_deref().and_then(|v| row.get(v)).and_then(|v| match v {
                Value::Node(id) => Some(*id),
                _ => None,
            });
            let id = match already_bound {
                Some(id) => id,
                None => {
                    let props = self.eval_properties(&node.properties, row)?;
                    let id = self.graph.create_node(&node.labels, props)?;
                    if let Some(v) = &node.var {
                        row.bind(v.clone(), Value::Node(id));
                    }
                    id
                }
            };
            node_ids.push(id);
        }
        let mut edge_keys = Vec::with_capacity(part.relationships.len());
        for (i, rel) in part.relationships.iter().enumerate() {
            let (left, right) = (node_ids[i], node_ids[i + 1]);
            let (from, to) = match rel.direction {
                PatternDirection::Out | PatternDirection::Undirected => (left, right),
                PatternDirection::In => (right, left),
            };
            let rel_type = rel.types.first().cloned().unwrap_or_else(|| "RELATED_TO".to_string());
            let props = self.eval_properties(&rel.properties, row)?;
            let edge_id = self.graph.add_edge(&rel_type, from, to, props)?;
            let rel_type_id = self.graph.resolve_rel_type_id(&rel_type).expect("just interned above");
            let edge = EdgeKey { id: edge_id, src: from, rel_type: rel_type_id, dst: to };
            if let Some(v) = &rel.var {
                row.bind(v.clone(), Value::Edge(edge));
            }
            edge_keys.push(edge);
        }
        if let Some(pv) = &part.path_var {
            row.bind(pv.clone(), Value::Path(PathValue { nodes: node_ids, edges: edge_keys }));
        }
        Ok(())
    }

    /// `MERGE`: for each pattern part, re-lowers it the same way `MATCH`
    /// would and checks for an existing match before falling back to
    /// `CREATE` (spec.md §4.7 Merge).
    fn exec_merge(
        &mut self,
        patterns: &[PatternPart],
        on_create: &[SetItem],
        on_match: &[SetItem],
        input: Vec<Row>,
    ) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(input.len());
        for row in input {
            let mut row = row;
            for part in patterns {
                let mut planner = Planner::new();
                let match_ops = planner.lower_pattern(std::slice::from_ref(part), false)?;
                let matched = {
                    let reader = ReadExecutor::new(&*self.graph, &self.params);
                    reader.run_with_input(&match_ops, vec![row.clone()])?
                };
                if let Some(first) = matched.into_iter().next() {
                    row = first;
                    for item in on_match {
                        self.apply_set_item(item, &mut row)?;
                    }
                } else {
                    self.create_pattern_part(part, &mut row)?;
                    for item in on_create {
                        self.apply_set_item(item, &mut row)?;
                    }
                }
            }
            out.push(row);
        }
        Ok(out)
    }

    fn node_id_of(&self, row: &Row, var: &str) -> Result<InternalNodeId> {
        match row.get(var) {
            Some(Value::Node(id)) => Ok(*id),
            _ => Err(Error::UnboundVariable(var.to_string())),
        }
    }

    fn apply_set_item(&mut self, item: &SetItem, row: &mut Row) -> Result<()> {
        match &item.target {
            SetTarget::Property { var, key } => {
                let value = self.eval(&item.value, row)?;
                match row.get(var) {
                    Some(Value::Node(id)) => self.graph.set_node_property(*id, key, value)?,
                    Some(Value::Edge(e)) => self.graph.set_edge_property(e.id, key, value)?,
                    _ => return Err(Error::UnboundVariable(var.clone())),
                }
            }
            SetTarget::AllProperties { var, additive } => {
                let value = self.eval(&item.value, row)?;
                let Value::Map(new_props) = value else {
                    return Err(Error::UnsupportedPropertyType("SET n = ... requires a map value".to_string()));
                };
                match row.get(var).cloned() {
                    Some(Value::Node(id)) => {
                        if !*additive {
                            let existing: Vec<String> = self.graph.node_properties(id).into_keys().collect();
                            for k in existing {
                                if !new_props.contains_key(&k) {
                                    self.graph.remove_node_property(id, &k)?;
                                }
                            }
                        }
                        for (k, v) in new_props {
                            self.graph.set_node_property(id, &k, v)?;
                        }
                    }
                    Some(Value::Edge(e)) => {
                        if !*additive {
                            let existing: Vec<String> = self.graph.edge_properties(e.id).into_keys().collect();
                            for k in existing {
                                if !new_props.contains_key(&k) {
                                    self.graph.remove_edge_property(e.id, &k)?;
                                }
                            }
                        }
                        for (k, v) in new_props {
                            self.graph.set_edge_property(e.id, &k, v)?;
                        }
                    }
                    _ => return Err(Error::UnboundVariable(var.clone())),
                }
            }
            SetTarget::Label { var, label } => {
                let id = self.node_id_of(row, var)?;
                self.graph.add_node_label(id, label)?;
            }
        }
        Ok(())
    }

    fn exec_set(&mut self, items: &[SetItem], input: Vec<Row>) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(input.len());
        for row in input {
            let mut row = row;
            for item in items {
                self.apply_set_item(item, &mut row)?;
            }
            out.push(row);
        }
        Ok(out)
    }

    fn exec_remove(&mut self, items: &[RemoveItem], input: Vec<Row>) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(input.len());
        for row in input {
            for item in items {
                match item {
                    RemoveItem::Property { var, key } => match row.get(var) {
                        Some(Value::Node(id)) => self.graph.remove_node_property(*id, key)?,
                        Some(Value::Edge(e)) => self.graph.remove_edge_property(e.id, key)?,
                        _ => return Err(Error::UnboundVariable(var.clone())),
                    },
                    RemoveItem::Label { var, label } => {
                        let id = self.node_id_of(&row, var)?;
                        self.graph.remove_node_label(id, label)?;
                    }
                }
            }
            out.push(row);
        }
        Ok(out)
    }

    fn exec_delete(&mut self, vars: &[String], detach: bool, input: Vec<Row>) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(input.len());
        for row in input {
            for v in vars {
                match row.get(v) {
                    Some(Value::Node(id)) => self.graph.remove_node(*id, detach)?,
                    Some(Value::Edge(e)) => self.graph.remove_edge(e.id)?,
                    Some(Value::Null) | None => {}
                    Some(_) => return Err(Error::UnboundVariable(v.clone())),
                }
            }
            out.push(row);
        }
        Ok(out)
    }
}
