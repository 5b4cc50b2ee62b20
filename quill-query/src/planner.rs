//! Lowers a consumed AST (§4.3) into an ordered operator pipeline (§4.4),
//! tracking variable kinds and raising the compile-time errors spec.md §7
//! calls out. The planner never looks at [`quill_api::GraphStatistics`] —
//! that is the optimizer's job (§9 "Planner/Optimizer separation").

use crate::ast::*;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Node,
    Relationship,
    Path,
    Scalar,
}

impl VarKind {
    fn name(self) -> &'static str {
        match self {
            VarKind::Node => "Node",
            VarKind::Relationship => "Relationship",
            VarKind::Path => "Path",
            VarKind::Scalar => "Scalar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
}

impl AggregateFunc {
    fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "COUNT" => AggregateFunc::Count,
            "SUM" => AggregateFunc::Sum,
            "AVG" => AggregateFunc::Avg,
            "MIN" => AggregateFunc::Min,
            "MAX" => AggregateFunc::Max,
            "COLLECT" => AggregateFunc::Collect,
            _ => return None,
        })
    }
}

/// An aggregate function applied to an optional argument (`COUNT(*)` has
/// none) and projected as `alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    pub arg: Option<Expression>,
    pub distinct: bool,
    pub alias: String,
}

/// Attached to an `ExpandEdges` by the optimizer's aggregate-pushdown pass
/// (spec.md §4.5 pass 5); the executor folds during traversal instead of
/// materializing a separate `Aggregate` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationHint {
    pub func: AggregateFunc,
    pub expr: Option<Expression>,
    /// The pattern variable to group by — read from each input row, not
    /// rebound under this name (see `group_by_alias`).
    pub group_by_var: String,
    /// The output column name the WITH/RETURN item declared for the
    /// grouping variable (its alias, or the variable name itself if bare).
    pub group_by_alias: String,
    pub result_alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopSpec {
    pub edge_var: Option<String>,
    pub dst_var: String,
    pub types: Vec<String>,
    pub direction: PatternDirection,
    pub predicate: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    ScanNodes { var: String, labels: Vec<String>, predicate: Option<Expression>, path_var: Option<String> },
    OptionalScanNodes { var: String, labels: Vec<String>, predicate: Option<Expression>, path_var: Option<String> },
    ExpandEdges {
        src_var: String,
        edge_var: Option<String>,
        dst_var: String,
        types: Vec<String>,
        direction: PatternDirection,
        predicate: Option<Expression>,
        path_var: Option<String>,
        agg_hint: Option<AggregationHint>,
    },
    OptionalExpandEdges {
        src_var: String,
        edge_var: Option<String>,
        dst_var: String,
        types: Vec<String>,
        direction: PatternDirection,
        predicate: Option<Expression>,
        path_var: Option<String>,
    },
    ExpandVariableLength {
        src: String,
        edge_var: Option<String>,
        dst: String,
        types: Vec<String>,
        direction: PatternDirection,
        min: u32,
        max: u32,
        predicate: Option<Expression>,
        path_var: Option<String>,
    },
    ExpandMultiHop { src: String, hops: Vec<HopSpec>, path_var: Option<String> },
    Filter(Expression),
    Project(Vec<ReturnItem>),
    With {
        items: Vec<ReturnItem>,
        distinct: bool,
        where_: Option<Expression>,
        sort: Vec<(Expression, SortDirection)>,
        skip: Option<Expression>,
        limit: Option<Expression>,
    },
    Sort { items: Vec<(Expression, SortDirection)>, return_items: Option<Vec<ReturnItem>> },
    Skip(Expression),
    Limit(Expression),
    Distinct,
    Aggregate { grouping: Vec<Expression>, aggregates: Vec<AggregateExpr>, return_items: Vec<ReturnItem> },
    Unwind { expr: Expression, var: String },
    Create { patterns: Vec<PatternPart> },
    Merge { patterns: Vec<PatternPart>, on_create: Vec<SetItem>, on_match: Vec<SetItem> },
    Set { items: Vec<SetItem> },
    Remove { items: Vec<RemoveItem> },
    Delete { vars: Vec<String>, detach: bool },
    Union { branches: Vec<Vec<Operator>>, all: bool },
    Subquery { pipeline: Vec<Operator>, expression_type: SubqueryKind },
}

pub struct Planner {
    next_anon: u32,
    pub var_kinds: HashMap<String, VarKind>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    pub fn new() -> Self {
        Planner { next_anon: 0, var_kinds: HashMap::new() }
    }

    fn fresh_anon(&mut self) -> String {
        let name = format!("__anon_{}", self.next_anon);
        self.next_anon += 1;
        name
    }

    fn bind(&mut self, var: &str, kind: VarKind) -> Result<()> {
        match self.var_kinds.get(var) {
            Some(&existing) if existing != kind => Err(Error::IncompatibleVariableKind {
                var: var.to_string(),
                expected: existing.name().to_string(),
                found: kind.name().to_string(),
            }),
            _ => {
                self.var_kinds.insert(var.to_string(), kind);
                Ok(())
            }
        }
    }

    pub fn plan(&mut self, query: &Query) -> Result<Vec<Operator>> {
        match query {
            Query::Single(clauses) => self.plan_single(clauses),
            Query::Union { branches, all } => {
                let mut planned = Vec::with_capacity(branches.len());
                for branch in branches {
                    planned.push(self.plan_single(branch)?);
                }
                Ok(vec![Operator::Union { branches: planned, all: *all }])
            }
        }
    }

    fn plan_single(&mut self, clauses: &[Clause]) -> Result<Vec<Operator>> {
        let mut ops = Vec::new();
        let mut segment_start = 0;
        for (i, clause) in clauses.iter().enumerate() {
if let Clause::With(with) = clause {
                ops.extend(self.plan_segment(&clauses[segment_start..i])?);
                validate_with_items(&with.items)?;
                ops.extend(self.lower_with(with)?);
                segment_start = i + 1;
            }
        }
        ops.extend(self.plan_segment(&clauses[segment_start..])?);
        Ok(ops)
    }

    /// Lowers one With-delimited segment following the fixed bucket order
    /// from spec.md §4.4.1.
    fn plan_segment(&mut self, clauses: &[Clause]) -> Result<Vec<Operator>> {
        let mut reading = Vec::new();
        let mut create: Vec<&[PatternPart]> = Vec::new();
        let mut merge: Vec<&Clause> = Vec::new();
        let mut wheres = Vec::new();
        let mut set_items = Vec::new();
        let mut remove_items = Vec::new();
        let mut delete: Option<(Vec<String>, bool)> = None;
        let mut order_by = Vec::new();
        let mut return_clause: Option<(&Vec<ReturnItem>, bool)> = None;
        let mut skip = None;
        let mut limit = None;

        for clause in clauses {
            match clause {
                Clause::Match { pattern, where_ } => {
                    reading.extend(self.lower_pattern(pattern, false)?);
        if let Some(w) = where_ {
                        wheres.push(w.clone());
                    }
                }
                Clause::OptionalMatch { pattern, where_ } => {
                    reading.extend(self.lower_pattern(pattern, true)?);
                    if let Some(w) = where_ {
                        wheres.push(w.clone());
                    }
                }
                Clause::Unwind { expr, var } => {
                    self.bind(var, VarKind::Scalar)?;
                    reading.push(Operator::Unwind { expr: expr.clone(), var: var.clone() });
                }
                Clause::Create { pattern } => create.push(pattern.as_slice()),
                Clause::Merge { .. } => merge.push(clause),
                Clause::Set { items } => set_items.extend(items.clone()),
                Clause::Remove { items } => remove_items.extend(items.clone()),
                Clause::Delete { vars, detach } => delete = Some((vars.clone(), *detach)),
                Clause::OrderBy { items } => order_by = items.clone(),
                Clause::Return { items, distinct } => return_clause = Some((items, *distinct)),
                Clause::Skip(e) => skip = Some(e.clone()),
                Clause::Limit(e) => limit = Some(e.clone()),
                Clause::With(_) => unreachable!("With boundaries are split before plan_segment"),
            }
        }

        let mut ops = reading;
        for pattern in create {
            check_create_duplicates(pattern)?;
            for part in pattern {
                for node in &part.nodes {
                    if let Some(v) = &node.var {
                        self.bind(v, VarKind::Node)?;
                    }
                }
                for rel in &part.relationships {
                    if let Some(v) = &rel.var {
                        self.bind(v, VarKind::Relationship)?;
                    }
                }
            }
            ops.push(Operator::Create { patterns: pattern.to_vec() });
        }
        for clause in merge {
            let Clause::Merge { pattern, on_create, on_match } = clause else { unreachable!() };
            for part in pattern {
                for node in &part.nodes {
                    if let Some(v) = &node.var {
                        self.bind(v, VarKind::Node)?;
                    }
                }
                for rel in &part.relationships {
                    if let Some(v) = &rel.var {
                        self.bind(v, VarKind::Relationship)?;
                    }
                }
            }
            ops.push(Operator::Merge {
                patterns: pattern.clone(),
                on_create: on_create.clone(),
                on_match: on_match.clone(),
            });
        }
        if let Some(predicate) = conjoin(wheres) {
            ops.push(Operator::Filter(predicate));
        }
        if !set_items.is_empty() {
            ops.push(Operator::Set { items: set_items });
        }
        if !remove_items.is_empty() {
            ops.push(Operator::Remove { items: remove_items });
        }
        if let Some((vars, detach)) = delete {
            ops.push(Operator::Delete { vars, detach });
        }
        if !order_by.is_empty() {
            ops.push(Operator::Sort { items: order_by, return_items: return_clause.map(|(i, _)| i.clone()) });
        }
        if let Some((items, distinct)) = return_clause {
            validate_with_items(items)?;
            ops.push(self.lower_projection(items)?);
            if distinct {
                ops.push(Operator::Distinct);
            }
        }
        if let Some(e) = skip {
            ops.push(Operator::Skip(e));
        }
        if let Some(e) = limit {
            ops.push(Operator::Limit(e));
        }
        Ok(ops)
    }

    fn lower_with(&mut self, with: &WithClause) -> Result<Vec<Operator>> {
        for item in &with.items {
            match item {
                ReturnItem::Item { expr, alias } => {
                    let name = alias.clone().or_else(|| expr.default_column_name());
                    if let Some(name) = name {
                        self.bind(&name, infer_kind(expr, &self.var_kinds))?;
                    }
                }
                ReturnItem::Star => {}
            }
        }
        if with.items.iter().any(item_has_aggregate) {
            // `With` only gets its own operator kind when it has no
            // aggregation (spec.md §4.4.1); an aggregating With lowers to
            // an `Aggregate` plus the same Filter/Sort/Skip/Limit bucket
            // order a trailing Return would get.
            let mut ops = vec![build_aggregate(&with.items)?];
            if let Some(w) = &with.where_ {
                ops.push(Operator::Filter(w.clone()));
            }
            if !with.order_by.is_empty() {
                ops.push(Operator::Sort { items: with.order_by.clone(), return_items: Some(with.items.clone()) });
            }
            if with.distinct {
                ops.push(Operator::Distinct);
            }
            if let Some(e) = &with.skip {
                ops.push(Operator::Skip(e.clone()));
            }
            if let Some(e) = &with.limit {
                ops.push(Operator::Limit(e.clone()));
            }
            return Ok(ops);
        }
        Ok(vec![Operator::With {
            items: with.items.clone(),
            distinct: with.distinct,
            where_: with.where_.clone(),
            sort: with.order_by.clone(),
            skip: with.skip.clone(),
            limit: with.limit.clone(),
        }])
    }

    fn lower_projection(&mut self, items: &[ReturnItem]) -> Result<Operator> {
        if items.iter().any(item_has_aggregate) {
            build_aggregate(items)
        } else {
            Ok(Operator::Project(items.to_vec()))
        }
    }

    /// Exposed `pub(crate)` so `MERGE`'s existence check (executor.rs) can
    /// lower a single pattern part the same way `MATCH` does.
    pub(crate) fn lower_pattern(&mut self, pattern: &[PatternPart], optional: bool) -> Result<Vec<Operator>> {
        let mut ops = Vec::new();
        for part in pattern {
            ops.extend(self.lower_pattern_part(part, optional)?);
        }
        Ok(ops)
    }

    fn lower_pattern_part(&mut self, part: &PatternPart, optional: bool) -> Result<Vec<Operator>> {
        let mut ops = Vec::new();
        let first = &part.nodes[0];
        let scan_var = first.var.clone().unwrap_or_else(|| self.fresh_anon());
        self.bind(&scan_var, VarKind::Node)?;
        if let Some(pv) = &part.path_var {
            self.bind(pv, VarKind::Path)?;
        }
        let scan_predicate = property_predicate(&first.properties, &scan_var);
        let single_node_path = if part.nodes.len() == 1 { part.path_var.clone() } else { None };
        ops.push(if optional {
            Operator::OptionalScanNodes {
                var: scan_var.clone(),
                labels: first.labels.clone(),
                predicate: scan_predicate,
                path_var: single_node_path,
            }
        } else {
            Operator::ScanNodes {
                var: scan_var.clone(),
                labels: first.labels.clone(),
                predicate: scan_predicate,
                path_var: single_node_path,
            }
        });

        if part.relationships.is_empty() {
            return Ok(ops);
        }

        let fuse = !part.has_variable_length() && part.path_var.is_some() && part.relationships.len() > 1;
        if fuse {
            let mut hops = Vec::with_capacity(part.relationships.len());
            for (i, rel) in part.relationships.iter().enumerate() {
                let dst_node = &part.nodes[i + 1];
                let dst_var = dst_node.var.clone().unwrap_or_else(|| self.fresh_anon());
                self.bind(&dst_var, VarKind::Node)?;
                if let Some(v) = &rel.var {
                    self.bind(v, VarKind::Relationship)?;
                }
                let predicate = and_opt(
                    property_predicate(&dst_node.properties, &dst_var),
                    rel.var.as_deref().map(|v| property_predicate(&rel.properties, v)).flatten(),
                );
                hops.push(HopSpec {
                    edge_var: rel.var.clone(),
                    dst_var,
                    types: rel.types.clone(),
                    direction: rel.direction,
                    predicate,
                });
            }
            ops.push(Operator::ExpandMultiHop { src: scan_var, hops, path_var: part.path_var.clone() });
            return Ok(ops);
        }

        let mut src = scan_var;
        for (i, rel) in part.relationships.iter().enumerate() {
            let dst_node = &part.nodes[i + 1];
            let dst_var = dst_node.var.clone().unwrap_or_else(|| self.fresh_anon());
            self.bind(&dst_var, VarKind::Node)?;
            if let Some(v) = &rel.var {
                self.bind(v, VarKind::Relationship)?;
            }
            let predicate = and_opt(
                property_predicate(&dst_node.properties, &dst_var),
                rel.var.as_deref().map(|v| property_predicate(&rel.properties, v)).flatten(),
            );
            let path_var = if i + 1 == part.relationships.len() { part.path_var.clone() } else { None };
            if rel.min_hops.is_some() || rel.max_hops.is_some() {
                let min = rel.min_hops.unwrap_or(1);
                let max = rel.max_hops.unwrap_or(min.max(1));
                ops.push(Operator::ExpandVariableLength {
                    src: src.clone(),
                    edge_var: rel.var.clone(),
                    dst: dst_var.clone(),
                    types: rel.types.clone(),
                    direction: rel.direction,
                    min,
                    max,
                    predicate,
                    path_var,
                });
            } else if optional {
                ops.push(Operator::OptionalExpandEdges {
                    src_var: src.clone(),
                    edge_var: rel.var.clone(),
                    dst_var: dst_var.clone(),
                    types: rel.types.clone(),
                    direction: rel.direction,
                    predicate,
                    path_var,
                });
            } else {
                ops.push(Operator::ExpandEdges {
                    src_var: src.clone(),
                    edge_var: rel.var.clone(),
                    dst_var: dst_var.clone(),
                    types: rel.types.clone(),
                    direction: rel.direction,
                    predicate,
                    path_var,
                    agg_hint: None,
                });
            }
            src = dst_var;
        }
        Ok(ops)
    }
}

pub(crate) fn and_opt(a: Option<Expression>, b: Option<Expression>) -> Option<Expression> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Expression::BinaryOp {
            op: BinaryOperator::And,
            lhs: Box::new(a),
            rhs: Box::new(b),
        }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

pub(crate) fn conjoin(exprs: Vec<Expression>) -> Option<Expression> {
    exprs.into_iter().fold(None, |acc, e| and_opt(acc, Some(e)))
}

/// Splits an AND-chain into its conjuncts, flattening nested ANDs
/// (the inverse of [`conjoin`]). Used by the optimizer's filter pushdown
/// and predicate reorder passes (spec.md §4.5).
pub(crate) fn split_conjuncts(expr: &Expression) -> Vec<Expression> {
    match expr {
        Expression::BinaryOp { op: BinaryOperator::And, lhs, rhs } => {
            let mut out = split_conjuncts(lhs);
            out.extend(split_conjuncts(rhs));
            out
        }
        other => vec![other.clone()],
    }
}

/// The set of variable names an expression reads, excluding names bound
/// locally by a list comprehension or quantifier's own iteration variable.
pub(crate) fn free_vars(expr: &Expression) -> HashSet<String> {
    let mut out = HashSet::new();
    collect_free_vars(expr, &mut out);
    out
}

fn collect_free_vars(expr: &Expression, out: &mut HashSet<String>) {
    match expr {
        Expression::Variable(v) => {
            out.insert(v.clone());
        }
        Expression::Parameter(_) | Expression::Literal(_) => {}
        Expression::PropertyAccess { base, .. } => collect_free_vars(base, out),
        Expression::BinaryOp { lhs, rhs, .. } => {
            collect_free_vars(lhs, out);
            collect_free_vars(rhs, out);
        }
        Expression::UnaryOp { expr, .. } => collect_free_vars(expr, out),
        Expression::FunctionCall { args, .. } => {
            for a in args {
                collect_free_vars(a, out);
            }
        }
        Expression::List(items) => {
            for i in items {
                collect_free_vars(i, out);
            }
        }
        Expression::Map(entries) => {
            for (_, v) in entries {
                collect_free_vars(v, out);
            }
        }
        Expression::CaseExpression { subject, whens, else_ } => {
            if let Some(s) = subject {
                collect_free_vars(s, out);
            }
            for (w, t) in whens {
                collect_free_vars(w, out);
                collect_free_vars(t, out);
            }
            if let Some(e) = else_ {
                collect_free_vars(e, out);
            }
        }
        Expression::ListComprehension { var, list, predicate, project } => {
            collect_free_vars(list, out);
            let mut inner = HashSet::new();
            if let Some(p) = predicate {
                collect_free_vars(p, &mut inner);
            }
            if let Some(p) = project {
                collect_free_vars(p, &mut inner);
            }
            inner.remove(var);
            out.extend(inner);
        }
        Expression::QuantifierExpression { var, list, predicate, .. } => {
            collect_free_vars(list, out);
            let mut inner = HashSet::new();
            collect_free_vars(predicate, &mut inner);
            inner.remove(var);
            out.extend(inner);
        }
        Expression::SubqueryExpression { .. } => {}
    }
}

fn property_predicate(properties: &[(String, Expression)], var: &str) -> Option<Expression> {
    properties
        .iter()
        .map(|(key, value)| Expression::BinaryOp {
            op: BinaryOperator::Eq,
            lhs: Box::new(Expression::PropertyAccess {
                base: Box::new(Expression::Variable(var.to_string())),
                key: key.clone(),
            }),
            rhs: Box::new(value.clone()),
        })
        .fold(None, |acc, e| and_opt(acc, Some(e)))
}

fn check_create_duplicates(pattern: &[PatternPart]) -> Result<()> {
    let mut seen_rel = HashSet::new();
    for part in pattern {
        for rel in &part.relationships {
            if let Some(v) = &rel.var {
                if !seen_rel.insert(v.clone()) {
                    return Err(Error::DuplicateRelationshipVariable(v.clone()));
                }
            }
        }
    }
    Ok(())
}

fn validate_with_items(items: &[ReturnItem]) -> Result<()> {
    let mut seen = HashSet::new();
    for item in items {
        match item {
            ReturnItem::Star => {}
            ReturnItem::Item { expr, alias } => {
                let name = match alias {
                    Some(a) => a.clone(),
                    None => match expr.default_column_name() {
                        Some(n) if matches!(expr, Expression::Variable(_)) => n,
                        _ => return Err(Error::NoExpressionAlias(format!("{expr:?}"))),
                    },
                };
                if !seen.insert(name.clone()) {
                    return Err(Error::ColumnNameConflict(name));
                }
            }
        }
    }
    Ok(())
}

fn item_has_aggregate(item: &ReturnItem) -> bool {
    match item {
        ReturnItem::Star => false,
        ReturnItem::Item { expr, .. } => expression_contains_aggregate(expr),
    }
}

/// `pub(crate)` so the executor's aggregate output can tell a grouping key
/// column from an aggregate result column the same way `build_aggregate` did.
pub(crate) fn expression_contains_aggregate(expr: &Expression) -> bool {
    match expr {
        Expression::FunctionCall { name, args, .. } => {
            AggregateFunc::parse(name).is_some() || args.iter().any(expression_contains_aggregate)
        }
        Expression::BinaryOp { lhs, rhs, .. } => {
            expression_contains_aggregate(lhs) || expression_contains_aggregate(rhs)
        }
        Expression::UnaryOp { expr, .. } => expression_contains_aggregate(expr),
        Expression::List(items) => items.iter().any(expression_contains_aggregate),
        Expression::Map(entries) => entries.iter().any(|(_, v)| expression_contains_aggregate(v)),
        Expression::PropertyAccess { base, .. } => expression_contains_aggregate(base),
        Expression::CaseExpression { subject, whens, else_ } => {
            subject.as_deref().is_some_and(expression_contains_aggregate)
                || whens.iter().any(|(w, t)| expression_contains_aggregate(w) || expression_contains_aggregate(t))
                || else_.as_deref().is_some_and(expression_contains_aggregate)
        }
        _ => false,
    }
}

fn build_aggregate(items: &[ReturnItem]) -> Result<Operator> {
    let mut grouping = Vec::new();
    let mut aggregates = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let ReturnItem::Item { expr, alias } = item else { continue };
        if expression_contains_aggregate(expr) {
            let Expression::FunctionCall { name, args, distinct } = expr else {
                return Err(Error::MalformedAst(
                    "aggregate expression must be a bare function call".to_string(),
                ));
            };
            let func = AggregateFunc::parse(name)
                .ok_or_else(|| Error::MalformedAst(format!("not an aggregate function: {name}")))?;
            let alias = alias
                .clone()
                .or_else(|| expr.default_column_name())
                .unwrap_or_else(|| format!("col_{i}"));
            aggregates.push(AggregateExpr { func, arg: args.first().cloned(), distinct: *distinct, alias });
        } else {
            grouping.push(expr.clone());
        }
    }
    Ok(Operator::Aggregate { grouping, aggregates, return_items: items.to_vec() })
}

fn infer_kind(expr: &Expression, kinds: &HashMap<String, VarKind>) -> VarKind {
    match expr {
        Expression::Variable(v) => kinds.get(v).copied().unwrap_or(VarKind::Scalar),
        _ => VarKind::Scalar,
    }
}
