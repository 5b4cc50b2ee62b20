//! Semantic-preserving pipeline rewrites driven by graph statistics
//! (spec.md §4.5). The teacher's own `plan/optimizer.rs` is an identity
//! rewrite (`fn optimize(plan) -> plan { plan }`); this is the real
//! five-pass optimizer it stands in for, built from the reference
//! `optimizer/optimizer.py` pass ordering.
//!
//! Every pass is individually toggleable via [`OptimizerConfig`] and the
//! passes are designed to compose: running all five never changes a
//! query's result multiset (spec.md §8, invariant 2 and 6).

use crate::planner::{AggregateFunc, AggregationHint, Operator};
use crate::ast::{BinaryOperator, Expression, ReturnItem};
use crate::planner::{conjoin, expression_contains_aggregate, free_vars, split_conjuncts};
use quill_api::GraphSnapshot;
use std::collections::HashSet;

/// Tuning knobs for the optimizer, one boolean per pass plus the join
/// reorder enumeration cap (spec.md §4.5 pass 2, default 1000).
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub enable_filter_pushdown: bool,
    pub enable_join_reorder: bool,
    pub enable_predicate_reorder: bool,
    pub enable_redundant_traversal_elimination: bool,
    pub enable_aggregate_pushdown: bool,
    pub max_orderings: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            enable_filter_pushdown: true,
            enable_join_reorder: true,
            enable_predicate_reorder: true,
            enable_redundant_traversal_elimination: true,
            enable_aggregate_pushdown: true,
            max_orderings: 1000,
        }
    }
}

impl OptimizerConfig {
    pub fn with_filter_pushdown(mut self, on: bool) -> Self {
        self.enable_filter_pushdown = on;
        self
    }

    pub fn with_join_reorder(mut self, on: bool) -> Self {
        self.enable_join_reorder = on;
        self
    }

    pub fn with_predicate_reorder(mut self, on: bool) -> Self {
        self.enable_predicate_reorder = on;
        self
    }

    pub fn with_redundant_traversal_elimination(mut self, on: bool) -> Self {
        self.enable_redundant_traversal_elimination = on;
        self
    }

    pub fn with_aggregate_pushdown(mut self, on: bool) -> Self {
        self.enable_aggregate_pushdown = on;
        self
    }

    pub fn with_max_orderings(mut self, n: usize) -> Self {
        self.max_orderings = n;
        self
    }

    /// All passes off; used by invariant tests that compare against an
    /// unoptimized baseline (spec.md §8, invariant 2).
    pub fn disabled() -> Self {
        OptimizerConfig {
            enable_filter_pushdown: false,
            enable_join_reorder: false,
            enable_predicate_reorder: false,
            enable_redundant_traversal_elimination: false,
            enable_aggregate_pushdown: false,
            max_orderings: 1000,
        }
    }
}

pub fn optimize<S: GraphSnapshot>(ops: Vec<Operator>, snapshot: &S, config: &OptimizerConfig) -> Vec<Operator> {
    let mut ops = recurse_into_nested(ops, snapshot, config);
    if config.enable_filter_pushdown {
        ops = filter_pushdown(ops);
        tracing::debug!(pass = "filter_pushdown", len = ops.len(), "applied");
    }
    if config.enable_join_reorder {
        ops = join_reorder(ops, snapshot, config.max_orderings);
        tracing::debug!(pass = "join_reorder", len = ops.len(), "applied");
    }
    if config.enable_predicate_reorder {
        ops = predicate_reorder(ops);
        tracing::debug!(pass = "predicate_reorder", len = ops.len(), "applied");
    }
    if config.enable_redundant_traversal_elimination {
        ops = eliminate_redundant_traversals(ops);
        tracing::debug!(pass = "redundant_traversal_elimination", len = ops.len(), "applied");
    }
    if config.enable_aggregate_pushdown {
        ops = aggregate_pushdown(ops);
        tracing::debug!(pass = "aggregate_pushdown", len = ops.len(), "applied");
    }
    ops
}

fn recurse_into_nested<S: GraphSnapshot>(ops: Vec<Operator>, snapshot: &S, config: &OptimizerConfig) -> Vec<Operator> {
    ops.into_iter()
        .map(|op| match op {
            Operator::Union { branches, all } => Operator::Union {
                branches: branches.into_iter().map(|b| optimize(b, snapshot, config)).collect(),
                all,
            },
            Operator::Subquery { pipeline, expression_type } => {
                Operator::Subquery { pipeline: optimize(pipeline, snapshot, config), expression_type }
            }
            other => other,
        })
        .collect()
}

fn is_boundary(op: &Operator) -> bool {
    matches!(op, Operator::With { .. } | Operator::Union { .. } | Operator::Subquery { .. })
}

fn bound_vars_of(op: &Operator) -> Vec<String> {
    match op {
        Operator::ScanNodes { var, path_var, .. } | Operator::OptionalScanNodes { var, path_var, .. } => {
            let mut v = vec![var.clone()];
            v.extend(path_var.clone());
            v
        }
        Operator::ExpandEdges { dst_var, edge_var, path_var, .. }
        | Operator::OptionalExpandEdges { dst_var, edge_var, path_var, .. } => {
            let mut v = vec![dst_var.clone()];
            v.extend(edge_var.clone());
            v.extend(path_var.clone());
            v
        }
        Operator::ExpandVariableLength { dst, edge_var, path_var, .. } => {
            let mut v = vec![dst.clone()];
            v.extend(edge_var.clone());
            v.extend(path_var.clone());
            v
        }
        Operator::ExpandMultiHop { hops, path_var, .. } => {
            let mut v: Vec<String> = hops.iter().flat_map(|h| {
                let mut x = vec![h.dst_var.clone()];
                x.extend(h.edge_var.clone());
                x
            }).collect();
            v.extend(path_var.clone());
            v
        }
        Operator::Unwind { var, .. } => vec![var.clone()],
        Operator::Create { patterns } | Operator::Merge { patterns, .. } => {
            let mut v = Vec::new();
            for part in patterns {
                v.extend(part.path_var.clone());
                for n in &part.nodes {
                    v.extend(n.var.clone());
                }
                for r in &part.relationships {
                    v.extend(r.var.clone());
                }
            }
            v
        }
        _ => Vec::new(),
    }
}

// ---- pass 1: filter pushdown ------------------------------------------------

fn filter_pushdown(ops: Vec<Operator>) -> Vec<Operator> {
    let mut ops = ops;
    let mut i = 0;
    while i < ops.len() {
        if is_boundary(&ops[i]) {
            i += 1;
            continue;
        }
        let Operator::Filter(predicate) = ops[i].clone() else {
            i += 1;
            continue;
        };
        let conjuncts = split_conjuncts(&predicate);
        let mut residue = Vec::new();
        let mut prefix_bound: HashSet<String> = HashSet::new();
        let mut per_index_bound: Vec<HashSet<String>> = Vec::with_capacity(i);
        for op in &ops[..i] {
            if is_boundary(op) {
                prefix_bound.clear();
            } else {
                prefix_bound.extend(bound_vars_of(op));
            }
            per_index_bound.push(prefix_bound.clone());
        }
        for conjunct in conjuncts {
            let needed = free_vars(&conjunct);
            let mut target = None;
            for j in (0..i).rev() {
                if is_boundary(&ops[j]) {
                    break;
                }
                if matches!(ops[j], Operator::OptionalScanNodes { .. } | Operator::OptionalExpandEdges { .. }) {
                    continue;
                }
                if matches!(ops[j], Operator::ScanNodes { .. } | Operator::ExpandEdges { .. })
                    && needed.is_subset(&per_index_bound[j])
                {
                    target = Some(j);
                    break;
                }
            }
            match target {
                Some(j) => attach_predicate(&mut ops[j], conjunct),
                None => residue.push(conjunct),
            }
        }
        match conjoin(residue) {
            Some(expr) => {
                ops[i] = Operator::Filter(expr);
                i += 1;
            }
            None => {
                ops.remove(i);
            }
        }
    }
    ops
}

fn attach_predicate(op: &mut Operator, conjunct: Expression) {
    let slot = match op {
        Operator::ScanNodes { predicate, .. } => predicate,
        Operator::ExpandEdges { predicate, .. } => predicate,
        _ => return,
    };
    *slot = crate::planner::and_opt(slot.take(), Some(conjunct));
}

// ---- pass 2: join reorder ---------------------------------------------------

fn is_scan_or_expand(op: &Operator) -> bool {
    matches!(
        op,
        Operator::ScanNodes { .. }
            | Operator::OptionalScanNodes { .. }
            | Operator::ExpandEdges { .. }
            | Operator::OptionalExpandEdges { .. }
            | Operator::ExpandVariableLength { .. }
            | Operator::ExpandMultiHop { .. }
    )
}

fn src_var_of(op: &Operator) -> Option<String> {
    match op {
        Operator::ExpandEdges { src_var, .. } | Operator::OptionalExpandEdges { src_var, .. } => {
            Some(src_var.clone())
        }
        Operator::ExpandVariableLength { src, .. } => Some(src.clone()),
        Operator::ExpandMultiHop { src, .. } => Some(src.clone()),
        _ => None,
    }
}

fn estimate_cost<S: GraphSnapshot>(op: &Operator, snapshot: &S) -> f64 {
    let stats = snapshot.statistics();
    match op {
        Operator::ScanNodes { labels, .. } | Operator::OptionalScanNodes { labels, .. } => labels
            .first()
            .and_then(|l| snapshot.resolve_label_id(l))
            .map(|id| stats.node_count_for_label(id) as f64)
            .unwrap_or(stats.total_nodes.max(1) as f64),
        Operator::ExpandEdges { types, .. } | Operator::OptionalExpandEdges { types, .. } => {
            expand_cost(types, snapshot)
        }
        Operator::ExpandVariableLength { types, min, max, .. } => {
            expand_cost(types, snapshot) * ((*max).saturating_sub(*min) as f64 + 1.0)
        }
        Operator::ExpandMultiHop { hops, .. } => {
            hops.iter().map(|h| expand_cost(&h.types, snapshot)).product()
        }
        _ => 1.0,
    }
}

fn expand_cost<S: GraphSnapshot>(types: &[String], snapshot: &S) -> f64 {
    let stats = snapshot.statistics();
    let total_edges = stats.total_edges.max(1) as f64;
    match types.first().and_then(|t| snapshot.resolve_rel_type_id(t)) {
        Some(id) => {
            let degree = stats.avg_out_degree_for_type(id);
            let selectivity = stats.edge_count_for_type(id) as f64 / total_edges;
            (degree * selectivity).max(0.01)
        }
        None => total_edges / stats.total_nodes.max(1) as f64,
    }
}

/// Reorders a contiguous run of scan/expand operators (`block`) subject to
/// the dependency constraint that an expand must follow whatever bound its
/// source variable.
fn join_reorder<S: GraphSnapshot>(ops: Vec<Operator>, snapshot: &S, max_orderings: usize) -> Vec<Operator> {
    let mut result = Vec::with_capacity(ops.len());
    let mut block: Vec<Operator> = Vec::new();
    for op in ops {
        if is_scan_or_expand(&op) && !matches!(op, Operator::OptionalScanNodes { .. } | Operator::OptionalExpandEdges { .. }) {
            block.push(op);
        } else {
            result.extend(reorder_block(block, snapshot, max_orderings));
            block = Vec::new();
            result.push(op);
        }
    }
    result.extend(reorder_block(block, snapshot, max_orderings));
    result
}

fn reorder_block<S: GraphSnapshot>(block: Vec<Operator>, snapshot: &S, max_orderings: usize) -> Vec<Operator> {
    if block.len() <= 1 {
        return block;
    }
    if block.len() > 7 || factorial(block.len()) > max_orderings {
        return greedy_order(block, snapshot);
    }
    let mut indices: Vec<usize> = (0..block.len()).collect();
    let mut best: Option<(f64, Vec<usize>)> = None;
    let mut count = 0usize;
    permute(&mut indices, 0, &mut |perm| {
        if count >= max_orderings {
            return;
        }
        count += 1;
        if !is_valid_order(perm, &block) {
            return;
        }
        let cost: f64 = perm.iter().map(|&i| estimate_cost(&block[i], snapshot)).product();
        if best.as_ref().map(|(c, _)| cost < *c).unwrap_or(true) {
            best = Some((cost, perm.to_vec()));
        }
    });
    match best {
        Some((_, order)) => order.into_iter().map(|i| block[i].clone()).collect(),
        None => greedy_order(block, snapshot),
    }
}

fn factorial(n: usize) -> usize {
    (1..=n).product::<usize>().max(1)
}

fn permute(indices: &mut [usize], k: usize, visit: &mut impl FnMut(&[usize])) {
    if k == indices.len() {
        visit(indices);
        return;
    }
    for i in k..indices.len() {
        indices.swap(k, i);
        permute(indices, k + 1, visit);
        indices.swap(k, i);
    }
}

fn is_valid_order(order: &[usize], block: &[Operator]) -> bool {
    let mut bound: HashSet<String> = HashSet::new();
    for &idx in order {
        if let Some(src) = src_var_of(&block[idx]) {
            if !bound.contains(&src) {
                return false;
            }
        }
        bound.extend(bound_vars_of(&block[idx]));
        if let Operator::ScanNodes { var, .. } = &block[idx] {
            bound.insert(var.clone());
        }
    }
    true
}

fn greedy_order<S: GraphSnapshot>(mut block: Vec<Operator>, snapshot: &S) -> Vec<Operator> {
    let mut bound: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(block.len());
    while !block.is_empty() {
        let mut best_idx = None;
        let mut best_cost = f64::INFINITY;
        for (i, op) in block.iter().enumerate() {
            let ready = match src_var_of(op) {
                Some(src) => bound.contains(&src),
                None => true,
            };
            if !ready {
                continue;
            }
            let cost = estimate_cost(op, snapshot);
            if cost < best_cost {
                best_cost = cost;
                best_idx = Some(i);
            }
        }
        let idx = best_idx.unwrap_or(0);
        let op = block.remove(idx);
        if let Operator::ScanNodes { var, .. } = &op {
            bound.insert(var.clone());
        }
        bound.extend(bound_vars_of(&op));
        out.push(op);
    }
    out
}

// ---- pass 3: predicate reorder ----------------------------------------------

fn selectivity_rank(expr: &Expression) -> u8 {
    match expr {
        Expression::BinaryOp { op: BinaryOperator::Eq, .. } => 0,
        Expression::BinaryOp { op: BinaryOperator::In, .. } => 1,
        Expression::BinaryOp { op: BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge, .. } => 2,
        Expression::BinaryOp { op: BinaryOperator::StartsWith | BinaryOperator::EndsWith | BinaryOperator::Contains, .. } => 3,
        _ => 4,
    }
}

fn reorder_predicate(expr: Expression) -> Expression {
    let mut conjuncts = split_conjuncts(&expr);
    if conjuncts.len() < 2 {
        return expr;
    }
    conjuncts.sort_by_key(selectivity_rank);
    conjoin(conjuncts).expect("non-empty conjunct list")
}

fn predicate_reorder(ops: Vec<Operator>) -> Vec<Operator> {
    ops.into_iter()
        .map(|op| match op {
            Operator::Filter(p) => Operator::Filter(reorder_predicate(p)),
            Operator::ScanNodes { var, labels, predicate, path_var } => Operator::ScanNodes {
                var,
                labels,
                predicate: predicate.map(reorder_predicate),
                path_var,
            },
            Operator::ExpandEdges { src_var, edge_var, dst_var, types, direction, predicate, path_var, agg_hint } => {
                Operator::ExpandEdges {
                    src_var,
                    edge_var,
                    dst_var,
                    types,
                    direction,
                    predicate: predicate.map(reorder_predicate),
                    path_var,
                    agg_hint,
                }
            }
            other => other,
        })
        .collect()
}

// ---- pass 4: redundant-traversal elimination -------------------------------

fn signature(op: &Operator) -> Option<String> {
    match op {
        Operator::ScanNodes { var, labels, predicate, .. } => {
            Some(format!("scan:{var}:{labels:?}:{predicate:?}"))
        }
        Operator::ExpandEdges { src_var, dst_var, types, direction, predicate, .. } => {
            Some(format!("expand:{src_var}:{dst_var}:{types:?}:{direction:?}:{predicate:?}"))
        }
        Operator::ExpandVariableLength { src, dst, types, direction, min, max, predicate, .. } => Some(format!(
            "varlen:{src}:{dst}:{types:?}:{direction:?}:{min}:{max}:{predicate:?}"
        )),
        _ => None,
    }
}

fn eliminate_redundant_traversals(ops: Vec<Operator>) -> Vec<Operator> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        if is_boundary(&op) {
            seen.clear();
            out.push(op);
            continue;
        }
        if let Some(sig) = signature(&op) {
            if !seen.insert(sig) {
                continue;
            }
        }
        out.push(op);
    }
    out
}

// ---- pass 5: aggregate pushdown ---------------------------------------------

fn aggregate_pushdown(ops: Vec<Operator>) -> Vec<Operator> {
    let mut out: Vec<Operator> = Vec::with_capacity(ops.len());
    let mut iter = ops.into_iter().peekable();
    while let Some(op) = iter.next() {
        if let Operator::ExpandEdges { src_var, edge_var, dst_var, types, direction, predicate, path_var, agg_hint: None } = &op {
            if let Some(Operator::Aggregate { grouping, aggregates, return_items }) = iter.peek() {
                let eligible = aggregates.len() == 1
                    && !aggregates[0].distinct
                    && matches!(
                        aggregates[0].func,
                        AggregateFunc::Count | AggregateFunc::Sum | AggregateFunc::Min | AggregateFunc::Max
                    )
                    && grouping.len() == 1
                    && grouping[0] == Expression::Variable(src_var.clone());
                // The grouping value must come out under whatever alias the
                // WITH/RETURN item declared for it, not the raw pattern
                // variable name, so results match the non-pushdown path
                // (`fill_aggregate_output`) regardless of optimizer config.
                let group_by_alias = eligible.then(|| {
                    return_items.iter().enumerate().find_map(|(i, item)| match item {
                        ReturnItem::Item { expr, alias } if !expression_contains_aggregate(expr) && *expr == grouping[0] => {
                            Some(alias.clone().or_else(|| expr.default_column_name()).unwrap_or_else(|| format!("col_{i}")))
                        }
                        _ => None,
                    })
                }).flatten();
                if let Some(group_by_alias) = group_by_alias {
                    let agg = aggregates[0].clone();
                    let hint = AggregationHint {
                        func: agg.func,
                        expr: agg.arg.clone(),
                        group_by_var: src_var.clone(),
                        group_by_alias,
                        result_alias: agg.alias.clone(),
                    };
                    out.push(Operator::ExpandEdges {
                        src_var: src_var.clone(),
                        edge_var: edge_var.clone(),
                        dst_var: dst_var.clone(),
                        types: types.clone(),
                        direction: *direction,
                        predicate: predicate.clone(),
                        path_var: path_var.clone(),
                        agg_hint: Some(hint),
                    });
                    iter.next();
                    continue;
                }
            }
        }
        out.push(op);
    }
    out
}
