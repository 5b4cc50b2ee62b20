//! Error type shared by the planner, optimizer, evaluator, and executor
//! (spec.md §7). Variants are grouped by the behavioural kind spec.md uses,
//! not by which stage raised them, since the same shape of mistake (e.g. a
//! type error) can surface during planning validation or during evaluation.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    // ---- compile-time (planning) errors --------------------------------
    /// A `With` item that is not a bare variable or `*` has no alias.
    NoExpressionAlias(String),
    /// Two `With`/`Return` items share an output alias.
    ColumnNameConflict(String),
    /// A variable was already bound to an incompatible kind.
    IncompatibleVariableKind { var: String, expected: String, found: String },
    /// `Create` used the same relationship variable twice in one clause.
    DuplicateRelationshipVariable(String),
    /// The AST shape itself was not a structure the planner understands.
    MalformedAst(String),

    // ---- runtime type errors --------------------------------------------
    UnsupportedPropertyType(String),
    FunctionArgumentType { function: String, detail: String },
    NonNumericOperand(String),
    PropertyAccessOnScalar(String),
    NonBooleanOperand(String),

    // ---- runtime domain errors -------------------------------------------
    RangeStepZero,
    InvalidTemporalUnit(String),
    ConstraintViolation(String),
    TimezoneResolution(String),
    PointCoordinatesOutOfRange(String),

    // ---- dispatch / lookup errors -----------------------------------------
    UnknownFunction(String),
    UnboundVariable(String),
    AlreadyInTransaction,
    NoActiveTransaction,

    Storage(quill_storage::Error),
    Api(quill_api::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoExpressionAlias(item) => {
                write!(f, "WITH/RETURN item `{item}` must be aliased")
            }
            Error::ColumnNameConflict(alias) => write!(f, "column name conflict: {alias}"),
            Error::IncompatibleVariableKind { var, expected, found } => write!(
                f,
                "variable `{var}` already bound as {expected}, cannot rebind as {found}"
            ),
            Error::DuplicateRelationshipVariable(var) => {
                write!(f, "relationship variable `{var}` used twice in CREATE")
            }
            Error::MalformedAst(detail) => write!(f, "malformed AST: {detail}"),
            Error::UnsupportedPropertyType(detail) => {
                write!(f, "unsupported property value type: {detail}")
            }
            Error::FunctionArgumentType { function, detail } => {
                write!(f, "{function}: argument type mismatch: {detail}")
            }
            Error::NonNumericOperand(op) => write!(f, "{op} requires numeric operands"),
            Error::PropertyAccessOnScalar(detail) => {
                write!(f, "property access on a non-node/non-edge value: {detail}")
            }
            Error::NonBooleanOperand(op) => write!(f, "{op} requires a boolean operand"),
            Error::RangeStepZero => write!(f, "range() step must not be zero"),
            Error::InvalidTemporalUnit(unit) => write!(f, "invalid temporal unit: {unit}"),
            Error::ConstraintViolation(detail) => write!(f, "constraint violation: {detail}"),
            Error::TimezoneResolution(detail) => write!(f, "timezone resolution failed: {detail}"),
            Error::PointCoordinatesOutOfRange(detail) => {
                write!(f, "point coordinates out of range: {detail}")
            }
            Error::UnknownFunction(name) => write!(f, "unknown function: {name}"),
            Error::UnboundVariable(name) => write!(f, "unbound variable: {name}"),
            Error::AlreadyInTransaction => write!(f, "a transaction is already active"),
            Error::NoActiveTransaction => write!(f, "no active transaction"),
            Error::Storage(e) => write!(f, "{e}"),
            Error::Api(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<quill_storage::Error> for Error {
    fn from(e: quill_storage::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<quill_api::Error> for Error {
    fn from(e: quill_api::Error) -> Self {
        Error::Api(e)
    }
}

impl From<quill_api::value::ValueTypeError> for Error {
    fn from(e: quill_api::value::ValueTypeError) -> Self {
        Error::NonNumericOperand(e.0)
    }
}
