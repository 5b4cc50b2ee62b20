//! Recursive expression evaluation against a row context and a graph
//! (spec.md §4.6). Used by the executor's `Filter`/`Project`/`Sort`/`With`
//! and every write operator that evaluates property expressions.

use crate::ast::{BinaryOperator, Expression, Quantifier, SubqueryKind, UnaryOperator};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use quill_api::value::{Duration, Point};
use quill_api::{GraphSnapshot, Value};
use std::collections::{BTreeMap, HashMap};

/// A variable→value binding map, the unit the executor streams between
/// operators (spec.md §3.4, §5 glossary "Context").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub bindings: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn get(&self, var: &str) -> Option<&Value> {
        self.bindings.get(var)
    }

    pub fn bind(&mut self, var: impl Into<String>, value: Value) {
        self.bindings.insert(var.into(), value);
    }

    pub fn with(mut self, var: impl Into<String>, value: Value) -> Self {
        self.bind(var, value);
        self
    }
}

/// Runs a nested clause pipeline once per input row, used by
/// `SubqueryExpression` (EXISTS/COUNT). The executor supplies this so the
/// evaluator never needs its own copy of the operator-execution loop.
pub trait SubqueryRunner {
    fn run(&self, pipeline: &[crate::ast::Clause], row: &Row) -> Result<Vec<Row>>;
}

pub struct Evaluator<'a, S: GraphSnapshot> {
    pub graph: &'a S,
    pub params: &'a BTreeMap<String, Value>,
    pub subqueries: Option<&'a dyn SubqueryRunner>,
}

impl<'a, S: GraphSnapshot> Evaluator<'a, S> {
    pub fn new(graph: &'a S, params: &'a BTreeMap<String, Value>) -> Self {
        Evaluator { graph, params, subqueries: None }
    }

    pub fn with_subqueries(mut self, runner: &'a dyn SubqueryRunner) -> Self {
        self.subqueries = Some(runner);
        self
    }

    pub fn eval(&self, expr: &Expression, row: &Row) -> Result<Value> {
        match expr {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Variable(name) => {
                row.get(name).cloned().ok_or_else(|| Error::UnboundVariable(name.clone()))
            }
            Expression::Parameter(name) => {
                Ok(self.params.get(name).cloned().unwrap_or(Value::Null))
            }
            Expression::PropertyAccess { base, key } => self.eval_property_access(base, key, row),
            Expression::BinaryOp { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, row),
            Expression::UnaryOp { op, expr } => self.eval_unary(*op, expr, row),
            Expression::FunctionCall { name, args, distinct } => {
                let values = args.iter().map(|a| self.eval(a, row)).collect::<Result<Vec<_>>>()?;
                crate::functions::call(self.graph, name, &values, *distinct)
            }
            Expression::List(items) => {
                Ok(Value::List(items.iter().map(|i| self.eval(i, row)).collect::<Result<Vec<_>>>()?))
            }
            Expression::Map(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    out.insert(k.clone(), self.eval(v, row)?);
                }
                Ok(Value::Map(out))
            }
            Expression::CaseExpression { subject, whens, else_ } => {
                self.eval_case(subject.as_deref(), whens, else_.as_deref(), row)
            }
            Expression::ListComprehension { var, list, predicate, project } => {
                self.eval_list_comprehension(var, list, predicate.as_deref(), project.as_deref(), row)
            }
            Expression::QuantifierExpression { quantifier, var, list, predicate } => {
                self.eval_quantifier(*quantifier, var, list, predicate, row)
            }
            Expression::SubqueryExpression { kind, pipeline } => self.eval_subquery(*kind, pipeline, row),
        }
    }

    fn eval_property_access(&self, base: &Expression, key: &str, row: &Row) -> Result<Value> {
        let base_val = self.eval(base, row)?;
        match base_val {
            Value::Null => Ok(Value::Null),
            Value::Node(id) => Ok(self.graph.node_property(id, key).unwrap_or(Value::Null)),
            Value::Edge(e) => Ok(self.graph.edge_property(e.id, key).unwrap_or(Value::Null)),
            Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
            other => Err(Error::PropertyAccessOnScalar(format!(
                "cannot access property `{key}` on {}",
                other.type_name()
            ))),
        }
    }

    fn eval_binary(&self, op: BinaryOperator, lhs: &Expression, rhs: &Expression, row: &Row) -> Result<Value> {
        let l = self.eval(lhs, row)?;
        let r = self.eval(rhs, row)?;
        Ok(match op {
            BinaryOperator::Add => l.plus(&r)?,
            BinaryOperator::Sub => l.minus(&r)?,
            BinaryOperator::Mul => l.times(&r)?,
            BinaryOperator::Div => l.div(&r)?,
            BinaryOperator::Mod => l.modulo(&r)?,
            BinaryOperator::Pow => l.power(&r)?,
            BinaryOperator::Eq => l.equals(&r),
            BinaryOperator::Ne => negate_three_valued(l.equals(&r)),
            BinaryOperator::Lt => l.less_than(&r),
            BinaryOperator::Gt => r.less_than(&l),
            BinaryOperator::Le => or3(l.less_than(&r), l.equals(&r))?,
            BinaryOperator::Ge => or3(r.less_than(&l), l.equals(&r))?,
            BinaryOperator::And => l.and(&r)?,
            BinaryOperator::Or => l.or(&r)?,
            BinaryOperator::Xor => xor3(&l, &r)?,
            BinaryOperator::In => in_list(&l, &r),
            BinaryOperator::StartsWith => string_predicate(&l, &r, |a, b| a.starts_with(b))?,
            BinaryOperator::EndsWith => string_predicate(&l, &r, |a, b| a.ends_with(b))?,
            BinaryOperator::Contains => string_predicate(&l, &r, |a, b| a.contains(b))?,
        })
    }

    fn eval_unary(&self, op: UnaryOperator, expr: &Expression, row: &Row) -> Result<Value> {
        let v = self.eval(expr, row)?;
        Ok(match op {
            UnaryOperator::Neg => v.negate()?,
            UnaryOperator::Not => v.not()?,
            UnaryOperator::IsNull => Value::Bool(v.is_null()),
            UnaryOperator::IsNotNull => Value::Bool(!v.is_null()),
        })
    }

    fn eval_case(
        &self,
        subject: Option<&Expression>,
        whens: &[(Expression, Expression)],
        else_: Option<&Expression>,
        row: &Row,
    ) -> Result<Value> {
        if let Some(subject) = subject {
            let subject_val = self.eval(subject, row)?;
            for (when, then) in whens {
                let when_val = self.eval(when, row)?;
                if subject_val.equals(&when_val) == Value::Bool(true) {
                    return self.eval(then, row);
                }
            }
        } else {
            for (when, then) in whens {
                let when_val = self.eval(when, row)?;
                if when_val.is_truthy() {
                    return self.eval(then, row);
                }
            }
        }
        match else_ {
            Some(e) => self.eval(e, row),
            None => Ok(Value::Null),
        }
    }

    fn eval_list_comprehension(
        &self,
        var: &str,
        list: &Expression,
        predicate: Option<&Expression>,
        project: Option<&Expression>,
        row: &Row,
    ) -> Result<Value> {
        let items = as_list(self.eval(list, row)?);
        let saved = row.get(var).cloned();
        let mut row = row.clone();
        let mut out = Vec::new();
        for item in items {
            row.bind(var, item);
            let keep = match predicate {
                Some(p) => self.eval(p, &row)?.is_truthy(),
                None => true,
            };
            if keep {
                out.push(match project {
                    Some(p) => self.eval(p, &row)?,
                    None => row.get(var).cloned().unwrap_or(Value::Null),
                });
            }
        }
        match saved {
            Some(v) => row.bind(var, v),
            None => {
                row.bindings.remove(var);
            }
        };
        Ok(Value::List(out))
    }

    fn eval_quantifier(
        &self,
        quantifier: Quantifier,
        var: &str,
        list: &Expression,
        predicate: &Expression,
        row: &Row,
    ) -> Result<Value> {
        let items = as_list(self.eval(list, row)?);
        let saved = row.get(var).cloned();
        let mut row = row.clone();
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            row.bind(var, item);
            results.push(self.eval(predicate, &row)?);
        }
        match saved {
            Some(v) => row.bind(var, v),
            None => {
                row.bindings.remove(var);
            }
        };
        let any_true = results.iter().any(|v| v.is_truthy());
        let any_null = results.iter().any(|v| v.is_null());
        let all_true = results.iter().all(|v| v.is_truthy());
        let true_count = results.iter().filter(|v| v.is_truthy()).count();
        Ok(match quantifier {
            Quantifier::All => {
                if all_true {
                    Value::Bool(true)
                } else if results.iter().any(|v| matches!(v, Value::Bool(false))) {
                    Value::Bool(false)
                } else {
                    Value::Null
                }
            }
            Quantifier::Any => {
                if any_true {
                    Value::Bool(true)
                } else if any_null {
                    Value::Null
                } else {
                    Value::Bool(false)
                }
            }
            Quantifier::None => {
                if any_true {
                    Value::Bool(false)
                } else if any_null {
                    Value::Null
                } else {
                    Value::Bool(true)
                }
            }
            Quantifier::Single => Value::Bool(true_count == 1),
        })
    }

    fn eval_subquery(&self, kind: SubqueryKind, pipeline: &[crate::ast::Clause], row: &Row) -> Result<Value> {
        let Some(runner) = self.subqueries else {
            return Err(Error::MalformedAst("subquery expression without a subquery runner".to_string()));
        };
        let rows = runner.run(pipeline, row)?;
        Ok(match kind {
            SubqueryKind::Exists => Value::Bool(!rows.is_empty()),
            SubqueryKind::Count => Value::Int(rows.len() as i64),
        })
    }
}

fn as_list(v: Value) -> Vec<Value> {
    match v {
        Value::List(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn negate_three_valued(v: Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(!b),
        other => other,
    }
}

fn or3(a: Value, b: Value) -> Result<Value> {
    Ok(a.or(&b)?)
}

fn xor3(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(x ^ y)),
        _ => Err(Error::NonBooleanOperand("XOR".to_string())),
    }
}

fn in_list(needle: &Value, haystack: &Value) -> Value {
    let Value::List(items) = haystack else { return Value::Null };
    let mut saw_null = false;
    for item in items {
        match needle.equals(item) {
            Value::Bool(true) => return Value::Bool(true),
            Value::Null => saw_null = true,
            _ => {}
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::Bool(false)
    }
}

fn string_predicate(a: &Value, b: &Value, f: impl Fn(&str, &str) -> bool) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(Value::Bool(f(x, y))),
        _ => Err(Error::NonNumericOperand("string predicate requires STRING operands".to_string())),
    }
}

// ---- temporal construction helpers shared with the function library -------

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| Error::InvalidTemporalUnit(format!("invalid date: {s}")))
}

pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| Error::InvalidTemporalUnit(format!("invalid time: {s}")))
}

pub fn parse_datetime(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map_err(|_| Error::TimezoneResolution(format!("cannot resolve timezone for: {s}")))
}

pub fn naive_date_from_map(m: &BTreeMap<String, Value>) -> Result<NaiveDate> {
    let year = int_field(m, "year", 1970)?;
    let month = int_field(m, "month", 1)? as u32;
    let day = int_field(m, "day", 1)? as u32;
    NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| Error::InvalidTemporalUnit(format!("invalid date: {year}-{month}-{day}")))
}

pub fn naive_time_from_map(m: &BTreeMap<String, Value>) -> Result<NaiveTime> {
    let hour = int_field(m, "hour", 0)? as u32;
    let minute = int_field(m, "minute", 0)? as u32;
    let second = int_field(m, "second", 0)? as u32;
    NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| Error::InvalidTemporalUnit(format!("invalid time: {hour}:{minute}:{second}")))
}

pub fn datetime_from_map(m: &BTreeMap<String, Value>) -> Result<DateTime<FixedOffset>> {
    let date = naive_date_from_map(m)?;
    let time = naive_time_from_map(m)?;
    let offset_seconds = int_field(m, "timezone_offset_seconds", 0)? as i32;
    let offset = FixedOffset::east_opt(offset_seconds)
        .ok_or_else(|| Error::TimezoneResolution(format!("invalid offset: {offset_seconds}")))?;
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| Error::TimezoneResolution("ambiguous local time".to_string()))
}

fn int_field(m: &BTreeMap<String, Value>, key: &str, default: i64) -> Result<i64> {
    match m.get(key) {
        None => Ok(default),
        Some(Value::Int(i)) => Ok(*i),
        Some(Value::Float(f)) => Ok(*f as i64),
        Some(other) => Err(Error::FunctionArgumentType {
            function: key.to_string(),
            detail: format!("expected integer, got {}", other.type_name()),
        }),
    }
}

/// Parses a (subset of) ISO-8601 duration: `P[nY][nM][nD][T[nH][nM][nS]]`.
pub fn parse_iso_duration(s: &str) -> Result<Duration> {
    let err = || Error::InvalidTemporalUnit(format!("invalid duration: {s}"));
    let s = s.strip_prefix('P').ok_or_else(err)?;
    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (s, None),
    };
    let mut months = 0i64;
    let mut days = 0i64;
    let mut num = String::new();
    for c in date_part.chars() {
        if c.is_ascii_digit() || c == '-' {
            num.push(c);
            continue;
        }
        let n: i64 = num.parse().map_err(|_| err())?;
        num.clear();
        match c {
            'Y' => months += n * 12,
            'M' => months += n,
            'W' => days += n * 7,
            'D' => days += n,
            _ => return Err(err()),
        }
    }
    let mut seconds = 0i64;
    if let Some(time_part) = time_part {
        for c in time_part.chars() {
            if c.is_ascii_digit() || c == '-' || c == '.' {
                num.push(c);
                continue;
            }
            let n: f64 = num.parse().map_err(|_| err())?;
            num.clear();
            match c {
                'H' => seconds += (n * 3600.0) as i64,
                'M' => seconds += (n * 60.0) as i64,
                'S' => seconds += n as i64,
                _ => return Err(err()),
            }
        }
    }
    Ok(Duration { months, days, seconds, nanos: 0 })
}

pub fn duration_from_map(m: &BTreeMap<String, Value>) -> Result<Duration> {
    let years = int_field(m, "years", 0)?;
    let months = int_field(m, "months", 0)? + years * 12;
    let days = int_field(m, "days", 0)? + int_field(m, "weeks", 0)? * 7;
    let hours = int_field(m, "hours", 0)?;
    let minutes = int_field(m, "minutes", 0)?;
    let seconds = int_field(m, "seconds", 0)? + hours * 3600 + minutes * 60;
    Ok(Duration { months, days, seconds, nanos: 0 })
}

pub fn point_from_map(m: &BTreeMap<String, Value>) -> Result<Point> {
    if m.contains_key("latitude") || m.contains_key("longitude") {
        let lat = float_field(m, "latitude", 0.0)?;
        let lon = float_field(m, "longitude", 0.0)?;
        return Point::wgs84(lat, lon).map_err(|e| Error::PointCoordinatesOutOfRange(e.to_string()));
    }
    let x = float_field(m, "x", 0.0)?;
    let y = float_field(m, "y", 0.0)?;
    match m.get("z") {
        Some(Value::Int(_)) | Some(Value::Float(_)) => Ok(Point::cartesian_3d(x, y, float_field(m, "z", 0.0)?)),
        _ => Ok(Point::cartesian(x, y)),
    }
}

fn float_field(m: &BTreeMap<String, Value>, key: &str, default: f64) -> Result<f64> {
    match m.get(key) {
        None => Ok(default),
        Some(Value::Int(i)) => Ok(*i as f64),
        Some(Value::Float(f)) => Ok(*f),
        Some(other) => Err(Error::FunctionArgumentType {
            function: key.to_string(),
            detail: format!("expected number, got {}", other.type_name()),
        }),
    }
}

pub fn current_timestamp_date() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn current_timestamp_time() -> NaiveTime {
    Utc::now().time()
}

pub fn current_timestamp_datetime() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap())
}
