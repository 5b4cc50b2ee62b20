//! The AST contract the core consumes (spec.md §4.3). The Cypher
//! text-to-AST parser is an external collaborator — nothing here produces
//! these types from source text; the planner only consumes them. Shaped
//! after the teacher's `ast.rs`, extended to the full clause/expression
//! vocabulary spec.md names.

use quill_api::Value;
use serde::{Deserialize, Serialize};

/// A top-level query: either a single list of clauses, or a `UNION` of
/// several such lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Single(Vec<Clause>),
    Union { branches: Vec<Vec<Clause>>, all: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Match { pattern: Vec<PatternPart>, where_: Option<Expression> },
    OptionalMatch { pattern: Vec<PatternPart>, where_: Option<Expression> },
    Create { pattern: Vec<PatternPart> },
    Merge { pattern: Vec<PatternPart>, on_create: Vec<SetItem>, on_match: Vec<SetItem> },
    Set { items: Vec<SetItem> },
    Remove { items: Vec<RemoveItem> },
    Delete { vars: Vec<String>, detach: bool },
    With(WithClause),
    Return { items: Vec<ReturnItem>, distinct: bool },
    OrderBy { items: Vec<(Expression, SortDirection)> },
    Skip(Expression),
    Limit(Expression),
    Unwind { expr: Expression, var: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithClause {
    pub items: Vec<ReturnItem>,
    pub distinct: bool,
    pub where_: Option<Expression>,
    pub order_by: Vec<(Expression, SortDirection)>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
}

/// One projected column: `expr [AS alias]`. `alias` is `None` only when
/// `expr` is a bare `Variable` or the `*` wildcard is represented
/// separately by [`ReturnItem::Star`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnItem {
    Star,
    Item { expr: Expression, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetItem {
    pub target: SetTarget,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetTarget {
    Property { var: String, key: String },
    /// `n = {...}` / `n += {...}`: entire property map replaced or merged.
    AllProperties { var: String, additive: bool },
    Label { var: String, label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoveItem {
    Property { var: String, key: String },
    Label { var: String, label: String },
}

/// A relationship direction as written in the pattern text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternDirection {
    Out,
    In,
    Undirected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePattern {
    pub var: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expression)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPattern {
    pub var: Option<String>,
    pub types: Vec<String>,
    pub direction: PatternDirection,
    pub min_hops: Option<u32>,
    pub max_hops: Option<u32>,
    pub properties: Vec<(String, Expression)>,
}

/// One alternating node/rel/node/... segment, optionally named as a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPart {
    pub path_var: Option<String>,
    pub nodes: Vec<NodePattern>,
    pub relationships: Vec<RelationshipPattern>,
}

impl PatternPart {
    /// `true` when any relationship segment has a hop range, i.e. this part
    /// contains a variable-length pattern (spec.md §4.4.1).
    pub fn has_variable_length(&self) -> bool {
        self.relationships.iter().any(|r| r.min_hops.is_some() || r.max_hops.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    In,
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Neg,
    Not,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    All,
    Any,
    None,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubqueryKind {
    Exists,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Value),
    Variable(String),
    Parameter(String),
    PropertyAccess { base: Box<Expression>, key: String },
    BinaryOp { op: BinaryOperator, lhs: Box<Expression>, rhs: Box<Expression> },
    UnaryOp { op: UnaryOperator, expr: Box<Expression> },
    FunctionCall { name: String, args: Vec<Expression>, distinct: bool },
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),
    CaseExpression {
        subject: Option<Box<Expression>>,
        whens: Vec<(Expression, Expression)>,
        else_: Option<Box<Expression>>,
    },
    ListComprehension {
        var: String,
        list: Box<Expression>,
        predicate: Option<Box<Expression>>,
        project: Option<Box<Expression>>,
    },
    QuantifierExpression {
        quantifier: Quantifier,
        var: String,
        list: Box<Expression>,
        predicate: Box<Expression>,
    },
    SubqueryExpression { kind: SubqueryKind, pipeline: Vec<Clause> },
}

impl Expression {
    /// The output column name Project assigns a bare (unaliased) item:
    /// variable name, `var.prop` for a bare property access, else `None`
    /// (caller must synthesize a name; spec.md §4.7 Project).
    pub fn default_column_name(&self) -> Option<String> {
        match self {
            Expression::Variable(name) => Some(name.clone()),
            Expression::PropertyAccess { base, key } => match base.as_ref() {
                Expression::Variable(name) => Some(format!("{name}.{key}")),
                _ => None,
            },
            _ => None,
        }
    }
}
