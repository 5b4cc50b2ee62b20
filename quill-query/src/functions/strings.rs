//! String-manipulation builtins (spec.md §4.6). All propagate `NULL` on a
//! `NULL` first argument, matching the rest of the function library.

use crate::error::{Error, Result};
use quill_api::Value;

pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    let subject = args.first().unwrap_or(&Value::Null);
    if subject.is_null() {
        return Ok(Value::Null);
    }
    let s = as_str(subject, name)?;
    Ok(match name.to_ascii_uppercase().as_str() {
        "SUBSTRING" => {
            let start = as_usize(args.get(1), name)?;
            let chars: Vec<char> = s.chars().collect();
            let start = start.min(chars.len());
            let end = match args.get(2) {
                Some(v) if !v.is_null() => (start + as_usize(Some(v), name)?).min(chars.len()),
                _ => chars.len(),
            };
            Value::String(chars[start..end].iter().collect())
        }
        "SPLIT" => {
            let delim = as_str(args.get(1).unwrap_or(&Value::Null), name)?;
            Value::List(s.split(delim.as_str()).map(|p| Value::String(p.to_string())).collect())
        }
        "REPLACE" => {
            let search = as_str(args.get(1).unwrap_or(&Value::Null), name)?;
            let replacement = as_str(args.get(2).unwrap_or(&Value::Null), name)?;
            Value::String(s.replace(search.as_str(), &replacement))
        }
        "LEFT" => {
            let n = as_usize(args.get(1), name)?;
            Value::String(s.chars().take(n).collect())
        }
        "RIGHT" => {
            let chars: Vec<char> = s.chars().collect();
            let n = as_usize(args.get(1), name)?.min(chars.len());
            Value::String(chars[chars.len() - n..].iter().collect())
        }
        "LTRIM" | "TRIMSTART" => Value::String(s.trim_start().to_string()),
        "RTRIM" | "TRIMEND" => Value::String(s.trim_end().to_string()),
        "TRIM" => Value::String(s.trim().to_string()),
        "UPPER" => Value::String(s.to_uppercase()),
        "LOWER" => Value::String(s.to_lowercase()),
        other => return Err(Error::UnknownFunction(other.to_string())),
    })
}

fn as_str<'a>(v: &'a Value, function: &str) -> Result<&'a str> {
    match v {
        Value::String(s) => Ok(s.as_str()),
        other => Err(Error::FunctionArgumentType {
            function: function.to_string(),
            detail: format!("expected a string, got {}", other.type_name()),
        }),
    }
}

fn as_usize(v: Option<&Value>, function: &str) -> Result<usize> {
    match v {
        Some(Value::Int(i)) if *i >= 0 => Ok(*i as usize),
        Some(other) => Err(Error::FunctionArgumentType {
            function: function.to_string(),
            detail: format!("expected a non-negative integer, got {}", other.type_name()),
        }),
        None => Err(Error::FunctionArgumentType {
            function: function.to_string(),
            detail: "missing argument".to_string(),
        }),
    }
}
