//! The built-in scalar function library the evaluator dispatches
//! `FunctionCall` expressions to (spec.md §4.6). Dispatch is on the
//! uppercased function name; `FILTER`/`EXTRACT`/`REDUCE` are deliberately
//! not implemented as call forms here since the AST already exposes their
//! replacement, `ListComprehension`/`QuantifierExpression`, as first-class
//! expression nodes (see DESIGN.md).

mod strings;
mod temporal;

use crate::error::{Error, Result};
use quill_api::value::Point;
use quill_api::{GraphSnapshot, Value};

pub fn call<S: GraphSnapshot>(graph: &S, name: &str, args: &[Value], distinct: bool) -> Result<Value> {
    let _ = distinct;
    match name.to_ascii_uppercase().as_str() {
        "COALESCE" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        "SIZE" | "LENGTH" => size_of(arg(args, 0, name)?),
        "HEAD" => list_op(args, name, |items| Ok(items.first().cloned().unwrap_or(Value::Null))),
        "LAST" => list_op(args, name, |items| Ok(items.last().cloned().unwrap_or(Value::Null))),
        "TAIL" => list_op(args, name, |items| {
            Ok(Value::List(if items.is_empty() { Vec::new() } else { items[1..].to_vec() }))
        }),
        "REVERSE" => reverse(arg(args, 0, name)?),
        "RANGE" => range_fn(args),
        "TYPE" => rel_type(graph, arg(args, 0, name)?),
        "LABELS" => node_labels(graph, arg(args, 0, name)?),
        "KEYS" => keys_of(graph, arg(args, 0, name)?),
        "TOSTRING" => Ok(match arg(args, 0, name)? {
            Value::Null => Value::Null,
            v => Value::String(v.display_string()),
        }),
        "TOINTEGER" => to_integer(arg(args, 0, name)?),
        "TOFLOAT" => to_float(arg(args, 0, name)?),
        "TOBOOLEAN" => to_boolean(arg(args, 0, name)?),
        "SUBSTRING" | "SPLIT" | "REPLACE" | "LEFT" | "RIGHT" | "LTRIM" | "RTRIM" | "TRIM" | "UPPER" | "LOWER"
        | "TRIMSTART" | "TRIMEND" => strings::call(name, args),
        "POINT" => point_fn(arg(args, 0, name)?),
        "DISTANCE" => distance_fn(args),
        "DATE" | "DATETIME" | "TIME" | "LOCALDATETIME" | "LOCALTIME" | "DURATION" | "DATE.TRUNCATE"
        | "DATETIME.TRUNCATE" | "DURATION.BETWEEN" | "DURATION.INMONTHS" | "DURATION.INDAYS"
        | "DURATION.INSECONDS" | "TRUNCATE" => temporal::call(name, args),
        other => Err(Error::UnknownFunction(other.to_string())),
    }
}

fn arg<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a Value> {
    args.get(index).ok_or_else(|| Error::FunctionArgumentType {
        function: function.to_string(),
        detail: format!("expected at least {} argument(s)", index + 1),
    })
}

fn size_of(v: &Value) -> Result<Value> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::List(items) => Value::Int(items.len() as i64),
        Value::String(s) => Value::Int(s.chars().count() as i64),
        Value::Map(m) => Value::Int(m.len() as i64),
        Value::Path(p) => Value::Int(p.length() as i64),
        other => {
            return Err(Error::FunctionArgumentType {
                function: "size".to_string(),
                detail: format!("cannot take the size of a {}", other.type_name()),
            })
        }
    })
}

fn list_op(args: &[Value], name: &str, f: impl Fn(&[Value]) -> Result<Value>) -> Result<Value> {
    match arg(args, 0, name)? {
        Value::Null => Ok(Value::Null),
        Value::List(items) => f(items),
        other => Err(Error::FunctionArgumentType {
            function: name.to_lowercase(),
            detail: format!("expected a list, got {}", other.type_name()),
        }),
    }
}

fn reverse(v: &Value) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        other => Err(Error::FunctionArgumentType {
            function: "reverse".to_string(),
            detail: format!("expected a list or string, got {}", other.type_name()),
        }),
    }
}

fn range_fn(args: &[Value]) -> Result<Value> {
    let start = as_int(arg(args, 0, "range")?, "range")?;
    let end = as_int(arg(args, 1, "range")?, "range")?;
    let step = match args.get(2) {
        Some(v) => as_int(v, "range")?,
        None => 1,
    };
    if step == 0 {
        return Err(Error::RangeStepZero);
    }
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i <= end {
            out.push(Value::Int(i));
            i += step;
        }
    } else {
        while i >= end {
            out.push(Value::Int(i));
            i += step;
        }
    }
    Ok(Value::List(out))
}

fn as_int(v: &Value, function: &str) -> Result<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(Error::FunctionArgumentType {
            function: function.to_string(),
            detail: format!("expected an integer, got {}", other.type_name()),
        }),
    }
}

fn rel_type<S: GraphSnapshot>(graph: &S, v: &Value) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Edge(e) => Ok(graph
            .rel_type_name(e.rel_type)
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null)),
        other => Err(Error::FunctionArgumentType {
            function: "type".to_string(),
            detail: format!("expected a relationship, got {}", other.type_name()),
        }),
    }
}

fn node_labels<S: GraphSnapshot>(graph: &S, v: &Value) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Node(id) => Ok(Value::List(
            graph
                .node_labels(*id)
                .into_iter()
                .filter_map(|label_id| graph.label_name(label_id).map(|s| Value::String(s.to_string())))
                .collect(),
        )),
        other => Err(Error::FunctionArgumentType {
            function: "labels".to_string(),
            detail: format!("expected a node, got {}", other.type_name()),
        }),
    }
}

fn keys_of<S: GraphSnapshot>(graph: &S, v: &Value) -> Result<Value> {
    let keys = match v {
        Value::Null => return Ok(Value::Null),
        Value::Node(id) => graph.node_properties(*id).into_iter().map(|(k, _)| k).collect(),
        Value::Edge(e) => graph.edge_properties(e.id).into_iter().map(|(k, _)| k).collect(),
        Value::Map(m) => m.keys().cloned().collect(),
        other => {
            return Err(Error::FunctionArgumentType {
                function: "keys".to_string(),
                detail: format!("expected a node, relationship, or map, got {}", other.type_name()),
            })
        }
    };
    Ok(Value::List(keys.into_iter().map(Value::String).collect()))
}

fn to_integer(v: &Value) -> Result<Value> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::Int(i) => Value::Int(*i),
        Value::Float(f) => Value::Int(*f as i64),
        Value::String(s) => s.trim().parse::<i64>().map(Value::Int).unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn to_float(v: &Value) -> Result<Value> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::Int(i) => Value::Float(*i as f64),
        Value::Float(f) => Value::Float(*f),
        Value::String(s) => s.trim().parse::<f64>().map(Value::Float).unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn to_boolean(v: &Value) -> Result<Value> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => Value::Null,
    })
}

fn point_fn(v: &Value) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Map(m) => crate::evaluator::point_from_map(m).map(Value::Point),
        other => Err(Error::FunctionArgumentType {
            function: "point".to_string(),
            detail: format!("expected a map, got {}", other.type_name()),
        }),
    }
}

fn distance_fn(args: &[Value]) -> Result<Value> {
    let a = arg(args, 0, "distance")?;
    let b = arg(args, 1, "distance")?;
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Point(p1), Value::Point(p2)) => {
            Ok(points_distance(p1, p2).map(Value::Distance).unwrap_or(Value::Null))
        }
        _ => Err(Error::FunctionArgumentType {
            function: "distance".to_string(),
            detail: "expected two points".to_string(),
        }),
    }
}

fn points_distance(a: &Point, b: &Point) -> Option<f64> {
    a.distance_to(b)
}
