//! The Cypher value algebra (spec.md §3.2, §4.2).
//!
//! `Value` is the tagged union every expression evaluates to. Arithmetic and
//! comparison methods here are the single source of truth the evaluator
//! dispatches to; they must never panic on well-typed input and must return
//! `Value::Null` (never an error) for the "numeric escape" cases spec.md §7
//! names: division/modulo by zero and float overflow-to-infinity.

use crate::{EdgeKey, InternalNodeId};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Coordinate reference system tag for a [`Point`] (spec.md §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PointCrs {
    Cartesian,
    Cartesian3D,
    Wgs84,
}

impl fmt::Display for PointCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointCrs::Cartesian => write!(f, "cartesian"),
            PointCrs::Cartesian3D => write!(f, "cartesian-3d"),
            PointCrs::Wgs84 => write!(f, "wgs-84"),
        }
    }
}

/// A spatial point. For `Wgs84`, `x` is longitude and `y` is latitude,
/// matching the Python original's `{longitude, latitude}` convention.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub crs: PointCrs,
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Point {
    pub fn cartesian(x: f64, y: f64) -> Self {
        Point { crs: PointCrs::Cartesian, x, y, z: None }
    }

    pub fn cartesian_3d(x: f64, y: f64, z: f64) -> Self {
        Point { crs: PointCrs::Cartesian3D, x, y, z: Some(z) }
    }

    /// Constructs a geographic point, range-checking latitude/longitude per
    /// spec.md §3.2/§6.3. `lat` ∈ [-90, 90], `lon` ∈ [-180, 180].
    pub fn wgs84(lat: f64, lon: f64) -> Result<Self, crate::Error> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(crate::Error::InvalidPointCoordinates(format!(
                "latitude must be between -90 and 90, got {lat}"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(crate::Error::InvalidPointCoordinates(format!(
                "longitude must be between -180 and 180, got {lon}"
            )));
        }
        Ok(Point { crs: PointCrs::Wgs84, x: lon, y: lat, z: None })
    }

    /// Euclidean distance for cartesian points, great-circle (Haversine)
    /// distance in meters for `wgs-84` points.
    pub fn distance_to(&self, other: &Point) -> Option<f64> {
        if self.crs != other.crs {
            return None;
        }
        match self.crs {
            PointCrs::Cartesian => Some(((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()),
            PointCrs::Cartesian3D => {
                let dz = self.z.unwrap_or(0.0) - other.z.unwrap_or(0.0);
                Some(((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + dz.powi(2)).sqrt())
            }
            PointCrs::Wgs84 => {
                const EARTH_RADIUS_M: f64 = 6_371_000.0;
                let lat1 = self.y.to_radians();
                let lat2 = other.y.to_radians();
                let dlat = (other.y - self.y).to_radians();
                let dlon = (other.x - self.x).to_radians();
                let a = (dlat / 2.0).sin().powi(2)
                    + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
                let c = 2.0 * a.sqrt().asin();
                Some(EARTH_RADIUS_M * c)
            }
        }
    }
}

/// A nominal duration: calendar `months` (years folded in as `years*12`),
/// a day count, and a sub-day part kept in whole seconds plus nanoseconds.
///
/// Kept as three independent components rather than collapsed to a total
/// number of seconds, per spec.md §3.2: "Durations with year/month
/// components are kept as a nominal form ... and collapsed only when added
/// to a concrete date."
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Duration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanos: i32,
}

impl Duration {
    pub const ZERO: Duration = Duration { months: 0, days: 0, seconds: 0, nanos: 0 };

    pub fn from_seconds(seconds: i64) -> Self {
        Duration { months: 0, days: 0, seconds, nanos: 0 }
    }

    pub fn from_months(months: i64) -> Self {
        Duration { months, days: 0, seconds: 0, nanos: 0 }
    }

    pub fn negate(&self) -> Duration {
        Duration {
            months: -self.months,
            days: -self.days,
            seconds: -self.seconds,
            nanos: -self.nanos,
        }
    }

    pub fn add(&self, other: &Duration) -> Duration {
        Duration {
            months: self.months + other.months,
            days: self.days + other.days,
            seconds: self.seconds + other.seconds,
            nanos: self.nanos + other.nanos,
        }
    }

    /// Total whole days implied by the nominal `months` component, assuming
    /// 30-day months — used only by `inDays`/`inSeconds` on a duration that
    /// still carries calendar components (the result is necessarily
    /// approximate; openCypher documents this as implementation-defined).
    pub fn total_seconds_approx(&self) -> f64 {
        let month_seconds = self.months as f64 * 30.0 * 86_400.0;
        let day_seconds = self.days as f64 * 86_400.0;
        month_seconds + day_seconds + self.seconds as f64 + self.nanos as f64 / 1e9
    }
}

/// A traversed path: `nodes.len() == edges.len() + 1`, and `edges[i]`
/// connects `nodes[i]` and `nodes[i+1]` in either orientation (spec.md §3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathValue {
    pub nodes: Vec<InternalNodeId>,
    pub edges: Vec<EdgeKey>,
}

impl PathValue {
    pub fn single_node(node: InternalNodeId) -> Self {
        PathValue { nodes: vec![node], edges: Vec::new() }
    }

    pub fn length(&self) -> usize {
        self.edges.len()
    }
}

/// The Cypher runtime value algebra.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Time(NaiveTime),
    Duration(Duration),
    Point(Point),
    Distance(f64),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Path(PathValue),
    Node(InternalNodeId),
    Edge(EdgeKey),
}

/// A failure from a `Value` arithmetic/property operation — one of
/// spec.md §7's "runtime type errors". Division by zero and overflow are
/// *not* represented here; they resolve to `Value::Null` directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTypeError(pub String);

impl fmt::Display for ValueTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValueTypeError {}

type VResult = Result<Value, ValueTypeError>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// `TRUE`/`FALSE`/`NULL` truthiness used by `WHERE`, `CASE` guards, and
    /// quantifier expressions: only `Value::Bool(true)` is truthy.
    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Three-valued-logic aware "is this definitely not true" check used by
    /// `Filter`: NULL and FALSE both drop the row.
    pub fn is_false_or_null(&self) -> bool {
        !matches!(self, Value::Bool(true))
    }

    /// Structural equality with NULL propagation (spec.md §4.2).
    pub fn equals(&self, other: &Value) -> Value {
        if self.is_null() || other.is_null() {
            return Value::Null;
        }
        if self.is_numeric() && other.is_numeric() {
            return Value::Bool(self.as_f64() == other.as_f64());
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a == b),
            (Value::String(a), Value::String(b)) => Value::Bool(a == b),
            (Value::Date(a), Value::Date(b)) => Value::Bool(a == b),
            (Value::DateTime(a), Value::DateTime(b)) => Value::Bool(a == b),
            (Value::Time(a), Value::Time(b)) => Value::Bool(a == b),
            (Value::Duration(a), Value::Duration(b)) => Value::Bool(a == b),
            (Value::Point(a), Value::Point(b)) => Value::Bool(a == b),
            (Value::Distance(a), Value::Distance(b)) => Value::Bool(a == b),
            (Value::Node(a), Value::Node(b)) => Value::Bool(a == b),
            (Value::Edge(a), Value::Edge(b)) => Value::Bool(a == b),
            (Value::List(a), Value::List(b)) => Self::list_equals(a, b),
            (Value::Map(a), Value::Map(b)) => Self::map_equals(a, b),
            (Value::Path(a), Value::Path(b)) => Value::Bool(a == b),
            _ => Value::Bool(false),
        }
    }

    fn list_equals(a: &[Value], b: &[Value]) -> Value {
        if a.len() != b.len() {
            return Value::Bool(false);
        }
        let mut saw_null = false;
        for (x, y) in a.iter().zip(b.iter()) {
            match x.equals(y) {
                Value::Bool(true) => {}
                Value::Bool(false) => return Value::Bool(false),
                _ => saw_null = true,
            }
        }
        if saw_null { Value::Null } else { Value::Bool(true) }
    }

    fn map_equals(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Value {
        let a_keys: std::collections::BTreeSet<_> = a.keys().collect();
        let b_keys: std::collections::BTreeSet<_> = b.keys().collect();
        if a_keys != b_keys {
            return Value::Bool(false);
        }
        let mut saw_null = false;
        for key in a_keys {
            match a[key].equals(&b[key]) {
                Value::Bool(true) => {}
                Value::Bool(false) => return Value::Bool(false),
                _ => saw_null = true,
            }
        }
        if saw_null { Value::Null } else { Value::Bool(true) }
    }

    /// Cypher `<`: NULL propagates; lists compare lexicographically; maps
    /// are not ordered and return NULL as "incomparable".
    pub fn less_than(&self, other: &Value) -> Value {
        if self.is_null() || other.is_null() {
            return Value::Null;
        }
        if self.is_numeric() && other.is_numeric() {
            return Value::Bool(self.as_f64() < other.as_f64());
        }
        match (self, other) {
            (Value::String(a), Value::String(b)) => Value::Bool(a < b),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(!a & b),
            (Value::Date(a), Value::Date(b)) => Value::Bool(a < b),
            (Value::DateTime(a), Value::DateTime(b)) => Value::Bool(a < b),
            (Value::Time(a), Value::Time(b)) => Value::Bool(a < b),
            (Value::Duration(a), Value::Duration(b)) => Value::Bool(a < b),
            (Value::List(a), Value::List(b)) => Self::list_less_than(a, b),
            _ => Value::Null,
        }
    }

    fn list_less_than(a: &[Value], b: &[Value]) -> Value {
        for (x, y) in a.iter().zip(b.iter()) {
            match x.less_than(y) {
                Value::Null => return Value::Null,
                Value::Bool(true) => return Value::Bool(true),
                _ => {}
            }
            match y.less_than(x) {
                Value::Null => return Value::Null,
                Value::Bool(true) => return Value::Bool(false),
                _ => {}
            }
        }
        Value::Bool(a.len() < b.len())
    }

    /// Total order used for `ORDER BY` and hashable-normalization grouping;
    /// NULLs sort according to `nulls_last`.
    pub fn order_cmp(&self, other: &Value, nulls_last: bool) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return if nulls_last { Ordering::Greater } else { Ordering::Less },
            (false, true) => return if nulls_last { Ordering::Less } else { Ordering::Greater },
            (false, false) => {}
        }
        match self.less_than(other) {
            Value::Bool(true) => Ordering::Less,
            _ => match other.less_than(self) {
                Value::Bool(true) => Ordering::Greater,
                _ => Ordering::Equal,
            },
        }
    }

    /// `+`. Numeric addition (mixed Int/Float promotes to Float), string
    /// concatenation (stringifying the non-string side), and list
    /// concatenation/append per spec.md §4.2/§4.6.
    pub fn plus(&self, other: &Value) -> VResult {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        if self.is_numeric() && other.is_numeric() {
            return Ok(Self::numeric_add(self, other));
        }
        match (self, other) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", self.display_string(), other.display_string())))
            }
            (Value::List(a), Value::List(b)) => {
                let mut out = a.clone();
                out.extend(b.clone());
                Ok(Value::List(out))
            }
            (Value::List(a), other) => {
                let mut out = a.clone();
                out.push(other.clone());
                Ok(Value::List(out))
            }
            (other, Value::List(b)) => {
                let mut out = vec![other.clone()];
                out.extend(b.clone());
                Ok(Value::List(out))
            }
            (Value::Date(d), Value::Duration(dur)) | (Value::Duration(dur), Value::Date(d)) => {
                Ok(crate::temporal::add_duration_to_date(*d, dur))
            }
            (Value::DateTime(d), Value::Duration(dur)) | (Value::Duration(dur), Value::DateTime(d)) => {
                Ok(crate::temporal::add_duration_to_datetime(*d, dur))
            }
            (Value::Time(t), Value::Duration(dur)) | (Value::Duration(dur), Value::Time(t)) => {
                Ok(crate::temporal::add_duration_to_time(*t, dur))
            }
            (Value::Duration(a), Value::Duration(b)) => Ok(Value::Duration(a.add(b))),
            _ => Err(ValueTypeError(format!(
                "cannot add {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    fn numeric_add(a: &Value, b: &Value) -> Value {
        if let (Value::Int(x), Value::Int(y)) = (a, b) {
            return match x.checked_add(*y) {
                Some(sum) => Value::Int(sum),
                None => checked_float(*x as f64 + *y as f64),
            };
        }
        checked_float(a.as_f64().unwrap() + b.as_f64().unwrap())
    }

    pub fn minus(&self, other: &Value) -> VResult {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        if self.is_numeric() && other.is_numeric() {
            return Ok(match (self, other) {
                (Value::Int(x), Value::Int(y)) => match x.checked_sub(*y) {
                    Some(d) => Value::Int(d),
                    None => checked_float(*x as f64 - *y as f64),
                },
                _ => checked_float(self.as_f64().unwrap() - other.as_f64().unwrap()),
            });
        }
        match (self, other) {
            (Value::Date(a), Value::Date(b)) => {
                Ok(Value::Duration(Duration { months: 0, days: (*a - *b).num_days(), seconds: 0, nanos: 0 }))
            }
            (Value::DateTime(a), Value::DateTime(b)) => {
                let d = *a - *b;
                Ok(Value::Duration(Duration {
                    months: 0,
                    days: 0,
                    seconds: d.num_seconds(),
                    nanos: (d.num_nanoseconds().unwrap_or(0) % 1_000_000_000) as i32,
                }))
            }
            (Value::Date(d), Value::Duration(dur)) => Ok(crate::temporal::add_duration_to_date(*d, &dur.negate())),
            (Value::DateTime(d), Value::Duration(dur)) => {
                Ok(crate::temporal::add_duration_to_datetime(*d, &dur.negate()))
            }
            (Value::Time(t), Value::Duration(dur)) => Ok(crate::temporal::add_duration_to_time(*t, &dur.negate())),
            (Value::Duration(a), Value::Duration(b)) => Ok(Value::Duration(a.add(&b.negate()))),
            _ => Err(ValueTypeError(format!(
                "cannot subtract {} from {}",
                other.type_name(),
                self.type_name()
            ))),
        }
    }

    pub fn times(&self, other: &Value) -> VResult {
        self.numeric_binop(other, |a, b| a * b, "multiply")
    }

    pub fn div(&self, other: &Value) -> VResult {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        if !self.is_numeric() || !other.is_numeric() {
            return Err(ValueTypeError(format!(
                "cannot divide {} by {}",
                self.type_name(),
                other.type_name()
            )));
        }
        if other.as_f64() == Some(0.0) {
            return Ok(Value::Null);
        }
        if let (Value::Int(x), Value::Int(y)) = (self, other) {
            if x % y == 0 {
                return Ok(Value::Int(x / y));
            }
            return Ok(checked_float(*x as f64 / *y as f64));
        }
        Ok(checked_float(self.as_f64().unwrap() / other.as_f64().unwrap()))
    }

    pub fn modulo(&self, other: &Value) -> VResult {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        if !self.is_numeric() || !other.is_numeric() {
            return Err(ValueTypeError(format!(
                "cannot compute {} mod {}",
                self.type_name(),
                other.type_name()
            )));
        }
        if other.as_f64() == Some(0.0) {
            return Ok(Value::Null);
        }
        if let (Value::Int(x), Value::Int(y)) = (self, other) {
            return Ok(Value::Int(x % y));
        }
        Ok(checked_float(self.as_f64().unwrap() % other.as_f64().unwrap()))
    }

    /// `^`. Integer power with a non-negative integer exponent stays `Int`;
    /// a negative exponent (or a `Float` operand) promotes to `Float`, per
    /// spec.md §4.2.
    pub fn power(&self, other: &Value) -> VResult {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        if !self.is_numeric() || !other.is_numeric() {
            return Err(ValueTypeError(format!(
                "cannot raise {} to the power of {}",
                self.type_name(),
                other.type_name()
            )));
        }
        if let (Value::Int(base), Value::Int(exp)) = (self, other) {
            if *exp >= 0 {
                if let Ok(exp_u32) = u32::try_from(*exp) {
                    if let Some(result) = base.checked_pow(exp_u32) {
                        return Ok(Value::Int(result));
                    }
                }
                return Ok(checked_float((*base as f64).powf(*exp as f64)));
            }
            return Ok(checked_float((*base as f64).powf(*exp as f64)));
        }
        Ok(checked_float(self.as_f64().unwrap().powf(other.as_f64().unwrap())))
    }

    fn numeric_binop(&self, other: &Value, f: impl Fn(f64, f64) -> f64, verb: &str) -> VResult {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        if !self.is_numeric() || !other.is_numeric() {
            return Err(ValueTypeError(format!(
                "cannot {verb} {} and {}",
                self.type_name(),
                other.type_name()
            )));
        }
        if let (Value::Int(x), Value::Int(y)) = (self, other) {
            let xr = *x as f64;
            let yr = *y as f64;
            let r = f(xr, yr);
            if r.fract() == 0.0 && r.is_finite() && r.abs() < i64::MAX as f64 {
                if verb == "multiply" {
                    if let Some(product) = x.checked_mul(*y) {
                        return Ok(Value::Int(product));
                    }
                }
            }
            return Ok(checked_float(r));
        }
        Ok(checked_float(f(self.as_f64().unwrap(), other.as_f64().unwrap())))
    }

    pub fn negate(&self) -> VResult {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => Ok(i.checked_neg().map(Value::Int).unwrap_or(Value::Float(-(*i as f64)))),
            Value::Float(f) => Ok(checked_float(-f)),
            _ => Err(ValueTypeError(format!("cannot negate {}", self.type_name()))),
        }
    }

    pub fn not(&self) -> Result<Value, ValueTypeError> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(ValueTypeError(format!("NOT applied to non-boolean {}", other.type_name()))),
        }
    }

    /// Three-valued `AND`: FALSE if either branch is FALSE, else NULL if
    /// either branch is NULL, else TRUE (spec.md §3.2).
    pub fn and(&self, other: &Value) -> Result<Value, ValueTypeError> {
        match (self.as_bool_or_null()?, other.as_bool_or_null()?) {
            (Some(false), _) | (_, Some(false)) => Ok(Value::Bool(false)),
            (None, _) | (_, None) => Ok(Value::Null),
            (Some(true), Some(true)) => Ok(Value::Bool(true)),
        }
    }

    /// Three-valued `OR`: TRUE if either branch is TRUE, else NULL if either
    /// branch is NULL, else FALSE.
    pub fn or(&self, other: &Value) -> Result<Value, ValueTypeError> {
        match (self.as_bool_or_null()?, other.as_bool_or_null()?) {
            (Some(true), _) | (_, Some(true)) => Ok(Value::Bool(true)),
            (None, _) | (_, None) => Ok(Value::Null),
            (Some(false), Some(false)) => Ok(Value::Bool(false)),
        }
    }

    fn as_bool_or_null(&self) -> Result<Option<bool>, ValueTypeError> {
        match self {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(ValueTypeError(format!("boolean operator applied to non-boolean {}", other.type_name()))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Date(_) => "DATE",
            Value::DateTime(_) => "DATETIME",
            Value::Time(_) => "TIME",
            Value::Duration(_) => "DURATION",
            Value::Point(_) => "POINT",
            Value::Distance(_) => "DISTANCE",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Path(_) => "PATH",
            Value::Node(_) => "NODE",
            Value::Edge(_) => "EDGE",
        }
    }

    /// Renders a value for string concatenation / `toString` purposes.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.to_rfc3339(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Value::Duration(dur) => format!(
                "P{}M{}DT{}.{:09}S",
                dur.months, dur.days, dur.seconds, dur.nanos
            ),
            Value::Point(p) => format!("point({{x: {}, y: {}, crs: '{}'}})", p.x, p.y, p.crs),
            Value::Distance(d) => d.to_string(),
            Value::List(items) => {
                let parts: Vec<_> = items.iter().map(Value::display_string).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(m) => {
                let parts: Vec<_> = m.iter().map(|(k, v)| format!("{k}: {}", v.display_string())).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Path(p) => format!("<path of length {}>", p.length()),
            Value::Node(id) => format!("(node:{id})"),
            Value::Edge(e) => format!("[edge:{}]", e.id),
        }
    }

    /// Converts to [`NativeValue`] for the `to_python`/`from_python`
    /// round-trip contract (spec.md §8, property 4). Returns `None` for
    /// graph-identity values (`Node`/`Edge`/`Path`), which do not survive.
    pub fn to_native(&self) -> Option<crate::value::NativeValue> {
        Some(match self {
            Value::Null => NativeValue::Null,
            Value::Bool(b) => NativeValue::Bool(*b),
            Value::Int(i) => NativeValue::Int(*i),
            Value::Float(f) => NativeValue::Float(*f),
            Value::String(s) => NativeValue::String(s.clone()),
            Value::Date(d) => NativeValue::Date(*d),
            Value::DateTime(dt) => NativeValue::DateTime(*dt),
            Value::Time(t) => NativeValue::Time(*t),
            Value::Duration(d) => NativeValue::Duration(*d),
            Value::Point(p) => NativeValue::Point(*p),
            Value::Distance(d) => NativeValue::Distance(*d),
            Value::List(items) => {
                NativeValue::List(items.iter().map(|v| v.to_native()).collect::<Option<Vec<_>>>()?)
            }
            Value::Map(m) => {
                let mut out = BTreeMap::new();
                for (k, v) in m {
                    out.insert(k.clone(), v.to_native()?);
                }
                NativeValue::Map(out)
            }
            Value::Path(_) | Value::Node(_) | Value::Edge(_) => return None,
        })
    }

    pub fn from_native(native: NativeValue) -> Value {
        match native {
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Bool(b),
            NativeValue::Int(i) => Value::Int(i),
            NativeValue::Float(f) => Value::Float(f),
            NativeValue::String(s) => Value::String(s),
            NativeValue::Date(d) => Value::Date(d),
            NativeValue::DateTime(dt) => Value::DateTime(dt),
            NativeValue::Time(t) => Value::Time(t),
            NativeValue::Duration(d) => Value::Duration(d),
            NativeValue::Point(p) => Value::Point(p),
            NativeValue::Distance(d) => Value::Distance(d),
            NativeValue::List(items) => Value::List(items.into_iter().map(Value::from_native).collect()),
            NativeValue::Map(m) => {
                Value::Map(m.into_iter().map(|(k, v)| (k, Value::from_native(v))).collect())
            }
        }
    }
}

fn checked_float(f: f64) -> Value {
    if f.is_finite() { Value::Float(f) } else { Value::Null }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.equals(other), Value::Bool(true))
    }
}

/// A value guaranteed free of graph identities — the shape that crosses the
/// embedding boundary (`create_node`/`create_relationship` properties,
/// `to_python`/`from_python`).
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Time(NaiveTime),
    Duration(Duration),
    Point(Point),
    Distance(f64),
    List(Vec<NativeValue>),
    Map(BTreeMap<String, NativeValue>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_propagates_through_arithmetic_and_comparison() {
        assert!(matches!(Value::Null.plus(&Value::Int(1)).unwrap(), Value::Null));
        assert!(matches!(Value::Int(1).equals(&Value::Null), Value::Null));
        assert!(matches!(Value::Int(1).less_than(&Value::Null), Value::Null));
    }

    #[test]
    fn three_valued_logic_matches_spec_table() {
        let null = Value::Null;
        let t = Value::Bool(true);
        let f = Value::Bool(false);
        assert_eq!(null.and(&t).unwrap(), Value::Null);
        assert_eq!(null.or(&t).unwrap(), Value::Bool(true));
        assert_eq!(null.and(&f).unwrap(), Value::Bool(false));
        assert_eq!(null.or(&f).unwrap(), Value::Null);
    }

    #[test]
    fn mixed_int_float_sum_is_float() {
        let sum = Value::Int(1).plus(&Value::Float(2.5)).unwrap();
        assert!(matches!(sum, Value::Float(f) if f == 3.5));
    }

    #[test]
    fn division_by_zero_yields_null_not_error() {
        assert!(matches!(Value::Int(1).div(&Value::Int(0)).unwrap(), Value::Null));
        assert!(matches!(Value::Int(1).modulo(&Value::Int(0)).unwrap(), Value::Null));
    }

    #[test]
    fn power_right_associativity_2_3_2_is_512() {
        // 2^(3^2) = 2^9 = 512
        let inner = Value::Int(3).power(&Value::Int(2)).unwrap();
        let outer = Value::Int(2).power(&inner).unwrap();
        assert!(matches!(outer, Value::Int(512)));
    }

    #[test]
    fn negative_integer_exponent_promotes_to_float() {
        let r = Value::Int(2).power(&Value::Int(-1)).unwrap();
        assert!(matches!(r, Value::Float(f) if (f - 0.5).abs() < 1e-9));
    }

    #[test]
    fn list_equality_is_lexicographic_and_length_sensitive() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let c = Value::List(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.equals(&b), Value::Bool(true));
        assert_eq!(a.equals(&c), Value::Bool(false));
    }

    #[test]
    fn map_equality_is_key_set_then_per_key_value() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), Value::Int(1));
        let mut b = BTreeMap::new();
        b.insert("x".to_string(), Value::Int(1));
        assert_eq!(Value::Map(a.clone()).equals(&Value::Map(b)), Value::Bool(true));
        let mut c = BTreeMap::new();
        c.insert("y".to_string(), Value::Int(1));
        assert_eq!(Value::Map(a).equals(&Value::Map(c)), Value::Bool(false));
    }

    #[test]
    fn wgs84_point_rejects_out_of_range_coordinates() {
        assert!(Point::wgs84(100.0, 0.0).is_err());
        assert!(Point::wgs84(0.0, 200.0).is_err());
        assert!(Point::wgs84(45.0, 45.0).is_ok());
    }

    #[test]
    fn native_round_trip_preserves_scalars_lists_and_maps() {
        let mut m = BTreeMap::new();
        m.insert("k".to_string(), Value::List(vec![Value::Int(1), Value::Bool(true), Value::Null]));
        let v = Value::Map(m);
        let native = v.to_native().expect("survives conversion");
        let back = Value::from_native(native);
        assert_eq!(v.equals(&back), Value::Bool(true));
    }

    #[test]
    fn node_and_edge_values_do_not_survive_native_conversion() {
        assert!(Value::Node(0).to_native().is_none());
    }
}
